//! Fixed-size inference chunks.
//!
//! The scorer model consumes windows of exactly `chunk_size` samples
//! (512 at 16 kHz for Silero-style models). Callers must already be
//! chunk-aligned; arbitrary-length pushes are rejected rather than sliced
//! internally, which keeps duration accounting deterministic.

use crate::error::{EngineError, Result};

/// A window of exactly `chunk_size` mono f32 samples. Immutable once formed.
#[derive(Debug, Clone)]
pub struct FixedChunk {
    samples: Vec<f32>,
}

impl FixedChunk {
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Validates incoming pushes against the configured chunk size.
///
/// Precondition on callers: every push is exactly `chunk_size` samples.
/// Misaligned input fails with [`EngineError::InvalidChunkSize`] and does not
/// mutate any engine state.
#[derive(Debug, Clone)]
pub struct ChunkAccumulator {
    chunk_size: usize,
}

impl ChunkAccumulator {
    pub fn new(chunk_size: usize) -> Self {
        Self { chunk_size }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Called on reconfiguration. No buffered state to migrate since pushes
    /// are chunk-aligned by contract.
    pub fn set_chunk_size(&mut self, chunk_size: usize) {
        self.chunk_size = chunk_size;
    }

    /// Form a [`FixedChunk`] from a chunk-aligned push.
    pub fn accept(&self, samples: &[f32]) -> Result<FixedChunk> {
        if samples.len() != self.chunk_size {
            return Err(EngineError::InvalidChunkSize {
                expected: self.chunk_size,
                actual: samples.len(),
            });
        }
        Ok(FixedChunk {
            samples: samples.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_exactly_sized_push() {
        let acc = ChunkAccumulator::new(512);
        let chunk = acc.accept(&vec![0.1; 512]).expect("aligned push");
        assert_eq!(chunk.len(), 512);
        assert_eq!(chunk.samples()[0], 0.1);
    }

    #[test]
    fn rejects_short_and_long_pushes() {
        let acc = ChunkAccumulator::new(512);

        let err = acc.accept(&vec![0.0; 511]).unwrap_err();
        match err {
            EngineError::InvalidChunkSize { expected, actual } => {
                assert_eq!(expected, 512);
                assert_eq!(actual, 511);
            }
            other => panic!("expected InvalidChunkSize, got {other}"),
        }

        assert!(acc.accept(&vec![0.0; 1024]).is_err());
        assert!(acc.accept(&[]).is_err());
    }

    #[test]
    fn reconfigured_size_applies_to_subsequent_pushes() {
        let mut acc = ChunkAccumulator::new(512);
        acc.set_chunk_size(256);
        assert!(acc.accept(&vec![0.0; 512]).is_err());
        assert!(acc.accept(&vec![0.0; 256]).is_ok());
    }
}
