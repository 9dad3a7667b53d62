//! `StubTranscriber` — placeholder backend that echoes metadata without real
//! inference. Lets the full push → segment → transcript path be exercised
//! end-to-end before a real backend is wired in.

use tracing::debug;

use crate::buffering::segment::SpeechSegment;
use crate::error::Result;
use crate::inference::Transcriber;

/// Echo-style stub transcriber.
///
/// Produces `"[stub: <N> samples, <D> ms]"` for every segment.
#[derive(Debug, Default)]
pub struct StubTranscriber;

impl Transcriber for StubTranscriber {
    fn transcribe(&mut self, segment: &SpeechSegment) -> Result<String> {
        debug!(
            segment_id = %segment.id,
            samples = segment.len(),
            "StubTranscriber::transcribe"
        );
        Ok(format!(
            "[stub: {} samples, {:.0} ms]",
            segment.len(),
            segment.duration_ms
        ))
    }
}
