//! Speech scoring abstraction.
//!
//! The `SpeechScorer` trait is the primary extensibility point: the same
//! segmentation engine runs against a local ONNX model, a native plugin call,
//! or a remote service — the backends only differ in how they produce a
//! speech probability for a fixed-size chunk.
//!
//! `&mut self` on `score` intentionally expresses that scorer backends are
//! stateful (session handles, I/O buffers). The *model* recurrent state is
//! threaded externally through [`RecurrentState`] so the engine controls its
//! lifecycle: exactly one instance is live, replaced wholesale by
//! `ScoreOutcome::next_state` after every call. The engine calls `score` from
//! a single worker loop, so no two calls are ever in flight and the state is
//! never read and written concurrently.

pub mod hysteresis;

pub use hysteresis::{ClassificationResult, HysteresisClassifier};

use crate::error::Result;

/// Flattened recurrent tensor size for Silero v5 GRU models: 2 × 1 × 128.
pub const RECURRENT_STATE_LEN: usize = 2 * 128;

/// Opaque recurrent memory carried between consecutive scorer calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RecurrentState(Vec<f32>);

impl RecurrentState {
    pub fn from_vec(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for RecurrentState {
    /// Zeroed state, the value expected before the first chunk of a session.
    fn default() -> Self {
        Self(vec![0.0; RECURRENT_STATE_LEN])
    }
}

/// Result of scoring one chunk.
#[derive(Debug, Clone)]
pub struct ScoreOutcome {
    /// Speech probability in [0, 1].
    pub probability: f32,
    /// Replaces the engine's live state before the next call.
    pub next_state: RecurrentState,
}

/// Contract for speech-probability backends.
pub trait SpeechScorer: Send + 'static {
    /// Score one fixed-size chunk.
    ///
    /// The engine guarantees calls arrive in stream order, one at a time,
    /// with `state` being exactly the `next_state` of the previous call
    /// (zeroed at session start).
    ///
    /// # Errors
    /// A failure here is surfaced as `ScorerUnavailable`: the engine logs it,
    /// emits an error status event, treats the chunk as non-speech and keeps
    /// the stream moving.
    fn score(
        &mut self,
        chunk: &[f32],
        sample_rate: u32,
        state: &RecurrentState,
    ) -> Result<ScoreOutcome>;
}
