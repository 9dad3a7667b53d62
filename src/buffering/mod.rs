//! Buffer management for the segmentation engine.
//!
//! Two pieces live here:
//! - [`chunk`]: the fixed-size inference chunk and the accumulator that
//!   enforces the chunk-aligned push precondition.
//! - [`segment`]: the bounded in-progress utterance buffer with pre-speech
//!   lookback, and the finalized [`segment::SpeechSegment`] artifact.

pub mod chunk;
pub mod segment;

pub use chunk::{ChunkAccumulator, FixedChunk};
pub use segment::{SegmentBuffer, SpeechSegment};
