//! Events emitted by the engine over its broadcast channel.
//!
//! One tagged union covers the whole session lifecycle instead of per-topic
//! listener lists: subscribers match on the variant they care about.
//!
//! | Variant | When |
//! |---------|------|
//! | `SpeechStart` | first speech chunk of an utterance |
//! | `SpeechEnd` | utterance closed by silence |
//! | `SpeechReady` | finalized segment handed to transcription |
//! | `Transcript` | transcription completed for a segment |
//! | `Status` | info/error status updates |
//! | `Debug` | per-chunk speech probability |

use serde::{Deserialize, Serialize};

use crate::buffering::segment::SpeechSegment;

/// Everything the engine broadcasts, in emission order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum EngineEvent {
    /// Speech onset detected — a new utterance is being recorded.
    SpeechStart,
    /// The current utterance ended (silence exceeded the configured gap).
    SpeechEnd,
    /// A complete speech segment, including lookback and trailing padding.
    SpeechReady { segment: SpeechSegment },
    /// Transcription result for a previously emitted segment.
    Transcript { segment_id: String, text: String },
    /// Human-readable status update.
    Status { kind: StatusKind, message: String },
    /// Raw per-chunk scorer output, for tuning thresholds.
    Debug { probability: f32 },
}

/// Severity of a [`EngineEvent::Status`] message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Info,
    Error,
}
