//! Dual-threshold speech/non-speech decision.
//!
//! ## Algorithm
//!
//! 1. `probability > speech_threshold` → speech, always.
//! 2. `probability >= exit_threshold` while already recording → still speech.
//! 3. Otherwise → non-speech.
//!
//! The gap between the two thresholds prevents rapid flapping across a
//! single threshold at the boundary of speech: once recording, the model
//! needs a much lower probability to be re-classified as silence.

/// Per-chunk decision alongside the probability that produced it.
#[derive(Debug, Clone, Copy)]
pub struct ClassificationResult {
    pub probability: f32,
    pub is_speech: bool,
}

/// Converts raw probabilities into binary decisions with hysteresis.
#[derive(Debug, Clone)]
pub struct HysteresisClassifier {
    /// Enter threshold: probabilities above this start speech.
    speech_threshold: f32,
    /// Exit threshold: while recording, probabilities at or above this
    /// continue speech. Below `speech_threshold` by config validation.
    exit_threshold: f32,
}

impl HysteresisClassifier {
    pub fn new(speech_threshold: f32, exit_threshold: f32) -> Self {
        Self {
            speech_threshold,
            exit_threshold,
        }
    }

    pub fn classify(&self, probability: f32, is_recording: bool) -> ClassificationResult {
        let is_speech = probability > self.speech_threshold
            || (is_recording && probability >= self.exit_threshold);
        ClassificationResult {
            probability,
            is_speech,
        }
    }
}
