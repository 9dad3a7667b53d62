//! Segmentation state machine.
//!
//! Two states: `Idle` (buffering lookback only) and `Recording` (actively
//! accumulating an utterance). Per classified chunk:
//!
//! ```text
//! Idle      + non-speech → append to lookback FIFO
//! Idle      + speech     → write to main, SpeechStart → Recording
//! Recording + speech     → write to main, clear silence counter
//! Recording + non-speech → write to main anyway, count silence;
//!                          once the gap expires: discard (too short)
//!                          or finalize → SegmentReady + SpeechEnd → Idle
//! ```
//!
//! Buffer overflow short-circuits everything: the segment is finalized
//! immediately with the unwritten tail carried into the fresh buffer, and
//! recording continues (the overflow is treated as ongoing speech).
//!
//! The machine is pure buffer arithmetic — it cannot fail. Scorer failures
//! are handled upstream by treating the chunk as non-speech.

use tracing::debug;

use crate::buffering::segment::{SegmentBuffer, SpeechSegment};
use crate::engine::config::EngineConfig;

/// Ordered outcome of one [`SegmentationStateMachine::process`] step.
#[derive(Debug, Clone)]
pub enum StepEvent {
    /// Speech onset: a new utterance started recording.
    SpeechStart,
    /// The utterance closed after the silence gap expired.
    SpeechEnd,
    /// A finalized segment, ready for transcription dispatch.
    SegmentReady(SpeechSegment),
    /// The utterance was shorter than the minimum and was dropped.
    Discarded,
}

pub struct SegmentationStateMachine {
    buffer: SegmentBuffer,
    recording: bool,
    min_silence_samples: usize,
    min_speech_samples: usize,
    max_speech_samples: Option<usize>,
    next_segment_id: u64,
}

impl SegmentationStateMachine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            buffer: SegmentBuffer::new(config),
            recording: false,
            min_silence_samples: config.min_silence_duration_samples(),
            min_speech_samples: config.min_speech_duration_samples(),
            max_speech_samples: config.max_speech_duration_samples(),
            next_segment_id: 0,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn buffer(&self) -> &SegmentBuffer {
        &self.buffer
    }

    /// Apply a new configuration. `reallocate` forces a main-buffer rebuild
    /// (sample rate or capacity changed); any in-progress segment is lost.
    /// Threshold-only changes keep the buffered audio.
    pub fn reconfigure(&mut self, config: &EngineConfig, reallocate: bool) {
        self.min_silence_samples = config.min_silence_duration_samples();
        self.min_speech_samples = config.min_speech_duration_samples();
        self.max_speech_samples = config.max_speech_duration_samples();
        if reallocate {
            self.buffer.reconfigure(config);
            self.recording = false;
        } else {
            self.buffer.update_derived(config);
        }
    }

    /// Advance by one classified chunk, in stream order.
    pub fn process(&mut self, chunk: &[f32], is_speech: bool) -> Vec<StepEvent> {
        let was_recording = self.recording;
        let mut events = Vec::new();

        // Not in an utterance and nothing detected: keep the chunk around as
        // potential pre-speech context.
        if !was_recording && !is_speech {
            self.buffer.append_lookback(chunk);
            return events;
        }

        // The chunk belongs to the active (or starting) utterance.
        if let Some(overflow) = self.buffer.write_main(chunk) {
            // Buffer full — finalize regardless of silence counters. The
            // tail seeds the fresh buffer and recording continues.
            debug!(
                overflow_len = overflow.len(),
                "segment buffer overflow — forced finalize"
            );
            if !was_recording {
                events.push(StepEvent::SpeechStart);
            }
            let segment = self.finalize_segment(Some(&overflow));
            events.push(StepEvent::SegmentReady(segment));
            self.recording = true;
            return events;
        }

        if is_speech {
            if !was_recording {
                events.push(StepEvent::SpeechStart);
            }
            self.recording = true;
            self.buffer.reset_post_speech();
        } else {
            // Still counts as buffered audio; it may be the inside of a
            // short pause rather than the end of the utterance.
            self.buffer.add_post_speech(chunk.len());

            if self.buffer.post_speech_samples() >= self.min_silence_samples {
                if self.buffer.speech_samples() < self.min_speech_samples {
                    debug!(
                        speech_samples = self.buffer.speech_samples(),
                        min = self.min_speech_samples,
                        "utterance too short — discarding"
                    );
                    self.buffer.discard();
                    self.recording = false;
                    events.push(StepEvent::Discarded);
                } else {
                    let segment = self.finalize_segment(None);
                    events.push(StepEvent::SegmentReady(segment));
                    events.push(StepEvent::SpeechEnd);
                    self.recording = false;
                }
                return events;
            }
        }

        // Safety valve: bound worst-case segment length independent of
        // silence detection.
        if self.recording {
            if let Some(max) = self.max_speech_samples {
                if self.buffer.write_pointer() >= max {
                    debug!(max_samples = max, "max speech duration reached — splitting");
                    let segment = self.finalize_segment(None);
                    events.push(StepEvent::SegmentReady(segment));
                    // Stay in Recording: the next chunk seeds the new segment.
                }
            }
        }

        events
    }

    fn finalize_segment(&mut self, overflow: Option<&[f32]>) -> SpeechSegment {
        let id = format!("seg-{}", self.next_segment_id);
        self.next_segment_id += 1;
        let segment = self.buffer.finalize(overflow, id);
        debug!(
            segment_id = %segment.id,
            samples = segment.len(),
            duration_ms = segment.duration_ms,
            "segment finalized"
        );
        segment
    }
}
