//! In-progress utterance buffer with pre-speech lookback.
//!
//! The buffer is allocated once per engine instance
//! (`max_buffer_duration_secs * sample_rate` samples) and logically reset
//! after every finalized or discarded segment. It is only reallocated when a
//! reconfiguration changes the sample rate or the maximum duration.
//!
//! Overflow contract: `write_main` never silently truncates — whatever does
//! not fit is returned to the caller, which must finalize the segment and
//! seed the next one with the returned tail.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::engine::config::EngineConfig;

/// A finalized utterance: lookback context + recorded speech + trailing pad.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechSegment {
    /// Monotonic per-engine id (`seg-N`), stable across the
    /// `speech-ready` → `transcript` event pair.
    pub id: String,
    /// Mono f32 samples at the engine sample rate.
    pub samples: Vec<f32>,
    /// Duration of the detected speech portion — excludes lookback, the
    /// trailing silence run, and padding.
    pub duration_ms: f32,
}

impl SpeechSegment {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Bounded main buffer + lookback FIFO + silence counter.
#[derive(Debug)]
pub struct SegmentBuffer {
    /// Fixed-capacity sample storage; `write_pointer` marks the valid-data
    /// boundary. `write_pointer <= main.len()` always.
    main: Vec<f32>,
    write_pointer: usize,
    /// Most recent pre-speech chunks, oldest first.
    lookback: VecDeque<Vec<f32>>,
    max_lookback_chunks: usize,
    speech_pad_samples: usize,
    sample_rate: u32,
    /// Consecutive non-speech samples observed while recording.
    post_speech_samples: usize,
}

impl SegmentBuffer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            main: vec![0.0; config.main_capacity()],
            write_pointer: 0,
            lookback: VecDeque::new(),
            max_lookback_chunks: config.max_lookback_chunks(),
            speech_pad_samples: config.speech_pad_samples(),
            sample_rate: config.sample_rate,
            post_speech_samples: 0,
        }
    }

    /// Reallocate for a new configuration. Any in-progress segment is lost;
    /// that is the documented reconfiguration contract.
    pub fn reconfigure(&mut self, config: &EngineConfig) {
        self.main = vec![0.0; config.main_capacity()];
        self.write_pointer = 0;
        self.lookback.clear();
        self.max_lookback_chunks = config.max_lookback_chunks();
        self.speech_pad_samples = config.speech_pad_samples();
        self.sample_rate = config.sample_rate;
        self.post_speech_samples = 0;
    }

    pub fn capacity(&self) -> usize {
        self.main.len()
    }

    pub fn write_pointer(&self) -> usize {
        self.write_pointer
    }

    pub fn post_speech_samples(&self) -> usize {
        self.post_speech_samples
    }

    pub fn add_post_speech(&mut self, samples: usize) {
        self.post_speech_samples += samples;
    }

    pub fn reset_post_speech(&mut self) {
        self.post_speech_samples = 0;
    }

    /// Buffered samples that belong to detected speech: everything written
    /// minus the trailing silence run. Silence chunks are written too (they
    /// may turn out to be a mid-utterance pause), so the raw pointer alone
    /// overstates the utterance length.
    pub fn speech_samples(&self) -> usize {
        self.write_pointer.saturating_sub(self.post_speech_samples)
    }

    /// Update pad/lookback-derived parameters without touching the main
    /// buffer. Used for threshold-only reconfiguration.
    pub fn update_derived(&mut self, config: &EngineConfig) {
        self.max_lookback_chunks = config.max_lookback_chunks();
        self.speech_pad_samples = config.speech_pad_samples();
        while self.lookback.len() > self.max_lookback_chunks {
            self.lookback.pop_front();
        }
    }

    /// Store a pre-speech chunk for lookback padding, evicting the oldest
    /// beyond the configured depth.
    pub fn append_lookback(&mut self, chunk: &[f32]) {
        self.lookback.push_back(chunk.to_vec());
        while self.lookback.len() > self.max_lookback_chunks {
            self.lookback.pop_front();
        }
    }

    /// Write a chunk at the current pointer.
    ///
    /// Returns the unwritten suffix when the chunk does not fit; the caller
    /// must finalize and carry the overflow into the freshly reset buffer.
    pub fn write_main(&mut self, chunk: &[f32]) -> Option<Vec<f32>> {
        let remaining = self.main.len() - self.write_pointer;
        if chunk.len() > remaining {
            self.main[self.write_pointer..].copy_from_slice(&chunk[..remaining]);
            self.write_pointer = self.main.len();
            Some(chunk[remaining..].to_vec())
        } else {
            self.main[self.write_pointer..self.write_pointer + chunk.len()].copy_from_slice(chunk);
            self.write_pointer += chunk.len();
            None
        }
    }

    /// Produce the finalized segment and reset, optionally seeding the fresh
    /// buffer with an overflow tail.
    ///
    /// Final samples are `lookback ++ main[0 .. write_pointer + pad]` with
    /// the pad clamped to capacity; the pad region holds the silence chunks
    /// written while the gap countdown ran.
    pub fn finalize(&mut self, overflow: Option<&[f32]>, id: String) -> SpeechSegment {
        let duration_ms = (self.speech_samples() as f32 / self.sample_rate as f32) * 1000.0;
        let padded_end = (self.write_pointer + self.speech_pad_samples).min(self.main.len());

        let lookback_len: usize = self.lookback.iter().map(Vec::len).sum();
        let mut samples = Vec::with_capacity(lookback_len + padded_end);
        for prev in &self.lookback {
            samples.extend_from_slice(prev);
        }
        samples.extend_from_slice(&self.main[..padded_end]);

        self.reset(overflow);

        SpeechSegment {
            id,
            samples,
            duration_ms,
        }
    }

    /// Reset without producing a segment — the utterance was too short.
    pub fn discard(&mut self) {
        self.reset(None);
    }

    fn reset(&mut self, overflow: Option<&[f32]>) {
        let seed = overflow.unwrap_or(&[]);
        // An overflow tail is at most one chunk and always fits, but clamp
        // anyway so reset can never panic.
        let seed_len = seed.len().min(self.main.len());
        self.main[..seed_len].copy_from_slice(&seed[..seed_len]);
        self.main[seed_len..].fill(0.0);
        self.write_pointer = seed_len;
        self.post_speech_samples = 0;
        self.lookback.clear();
    }
}
