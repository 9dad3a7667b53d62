//! Transcription abstraction.
//!
//! The `Transcriber` trait decouples the dispatch queue from any specific
//! speech-to-text backend (local model, native plugin, remote API).
//!
//! `&mut self` on `transcribe` intentionally expresses that decoders are
//! stateful. Serialization is structural: the dispatch worker is the sole
//! owner of the boxed transcriber, so at most one call is ever in flight.

pub mod stub;

pub use stub::StubTranscriber;

use crate::buffering::segment::SpeechSegment;
use crate::error::Result;

/// Contract for transcription backends.
pub trait Transcriber: Send + 'static {
    /// Transcribe one finalized speech segment.
    ///
    /// May be arbitrarily slow; the engine keeps classifying new audio while
    /// this runs. A failure is logged and reported as an error status event
    /// for this segment only — the queue keeps draining.
    fn transcribe(&mut self, segment: &SpeechSegment) -> Result<String>;
}
