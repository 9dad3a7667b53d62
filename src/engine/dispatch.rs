//! Transcription dispatch.
//!
//! Finalized segments go onto a FIFO drained by exactly one blocking worker
//! that owns the transcriber. That single ownership *is* the serialization
//! guarantee: at most one `transcribe` call is ever in flight, and segments
//! are transcribed in the order they were finalized. Segmentation keeps
//! accepting audio while old segments wait here — a slow transcription stage
//! never stalls classification.

use crossbeam_channel::{unbounded, Sender};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::buffering::segment::SpeechSegment;
use crate::engine::EngineDiagnostics;
use crate::error::{EngineError, Result};
use crate::events::{EngineEvent, StatusKind};
use crate::inference::Transcriber;

use std::sync::Arc;

/// Handle to the transcription worker.
pub struct DispatchQueue {
    segment_tx: Sender<SpeechSegment>,
}

impl DispatchQueue {
    /// Spawn the drain worker. It exits when every `DispatchQueue` handle
    /// has been dropped and the queue is empty.
    pub fn spawn(
        mut transcriber: Box<dyn Transcriber>,
        events_tx: broadcast::Sender<EngineEvent>,
        diagnostics: Arc<EngineDiagnostics>,
    ) -> Self {
        let (segment_tx, segment_rx) = unbounded::<SpeechSegment>();

        tokio::task::spawn_blocking(move || {
            for segment in segment_rx.iter() {
                let segment_id = segment.id.clone();
                match transcriber.transcribe(&segment) {
                    Ok(text) => {
                        diagnostics.inc_transcripts();
                        info!(
                            segment_id = %segment_id,
                            chars = text.len(),
                            "transcription completed"
                        );
                        let _ = events_tx.send(EngineEvent::Transcript { segment_id, text });
                    }
                    Err(e) => {
                        // One bad segment never blocks the rest of the queue.
                        diagnostics.inc_transcription_errors();
                        let err = EngineError::TranscriptionFailed {
                            segment_id: segment_id.clone(),
                            reason: e.to_string(),
                        };
                        warn!(segment_id = %segment_id, error = %err, "dropping segment result");
                        let _ = events_tx.send(EngineEvent::Status {
                            kind: StatusKind::Error,
                            message: err.to_string(),
                        });
                    }
                }
            }
        });

        Self { segment_tx }
    }

    /// Queue a finalized segment for transcription (FIFO).
    pub fn enqueue(&self, segment: SpeechSegment) -> Result<()> {
        self.segment_tx
            .send(segment)
            .map_err(|_| EngineError::NotRunning)
    }
}
