//! # speechseg
//!
//! Streaming voice-activity segmentation and transcription dispatch.
//!
//! ## Architecture
//!
//! ```text
//! push_chunk() → bounded chunk queue → classification worker (spawn_blocking)
//!                                          SpeechScorer → hysteresis → segmentation
//!                                               │
//!                                      finalized SpeechSegment
//!                                               │
//!                               segment FIFO → dispatch worker (spawn_blocking)
//!                                               │         Transcriber
//!                               broadcast::Sender<EngineEvent> ◄┘
//! ```
//!
//! The caller's push path does no heap-heavy work; scoring and transcription
//! each run in their own single-owner worker, which is what makes them
//! serialized without any locking around the backends.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod buffering;
pub mod engine;
pub mod error;
pub mod events;
pub mod inference;
pub mod vad;

// Convenience re-exports for downstream crates
pub use buffering::{ChunkAccumulator, SpeechSegment};
pub use engine::config::{ConfigPatch, EngineConfig};
pub use engine::{DiagnosticsSnapshot, SegmentationEngine};
pub use error::EngineError;
pub use events::{EngineEvent, StatusKind};
pub use inference::{StubTranscriber, Transcriber};
pub use vad::{
    ClassificationResult, HysteresisClassifier, RecurrentState, ScoreOutcome, SpeechScorer,
    RECURRENT_STATE_LEN,
};
