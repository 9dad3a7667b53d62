use thiserror::Error;

/// All errors produced by speechseg.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The caller violated the fixed-size chunk precondition. This is a
    /// programmer error in the caller and is returned loudly; engine state is
    /// untouched.
    #[error("invalid chunk size: expected {expected} samples, got {actual}")]
    InvalidChunkSize { expected: usize, actual: usize },

    /// The bounded inbound chunk queue is full — classification cannot keep
    /// up with the audio source. The chunk was not enqueued.
    #[error("chunk queue overrun — classification cannot keep up")]
    ChunkQueueOverrun,

    #[error("speech scorer unavailable: {0}")]
    ScorerUnavailable(String),

    #[error("transcription failed for segment {segment_id}: {reason}")]
    TranscriptionFailed { segment_id: String, reason: String },

    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),

    #[error("engine is not running")]
    NotRunning,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
