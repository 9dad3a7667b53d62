//! Engine configuration and reconfiguration.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Configuration for [`SegmentationEngine`](crate::engine::SegmentationEngine).
///
/// Immutable per session except via
/// [`update_config`](crate::engine::SegmentationEngine::update_config);
/// changing `sample_rate` or `max_buffer_duration_secs` reallocates the main
/// buffer and discards any in-progress segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Sample rate of the incoming mono stream (Hz). Default: 16000.
    pub sample_rate: u32,
    /// Probabilities above this value start/continue speech. Default: 0.3.
    pub speech_threshold: f32,
    /// Once recording, probabilities at or above this value still count as
    /// speech (hysteresis). Must be below `speech_threshold`. Default: 0.1.
    pub exit_threshold: f32,
    /// Silence required to close an utterance (ms). Default: 400.
    pub min_silence_duration_ms: u32,
    /// Pre/post padding around a segment (ms). Default: 80.
    pub speech_pad_ms: u32,
    /// Utterances shorter than this are discarded (ms). Default: 250.
    pub min_speech_duration_ms: u32,
    /// Main buffer capacity in seconds of audio. Default: 30.
    pub max_buffer_duration_secs: u32,
    /// Samples per scorer window. Default: 512.
    pub chunk_size: usize,
    /// Safety valve: force-split a segment once this much audio is buffered,
    /// independent of silence detection. `None` disables the split.
    /// Default: 30000 ms.
    pub max_speech_duration_ms: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            speech_threshold: 0.3,
            exit_threshold: 0.1,
            min_silence_duration_ms: 400,
            speech_pad_ms: 80,
            min_speech_duration_ms: 250,
            max_buffer_duration_secs: 30,
            chunk_size: 512,
            max_speech_duration_ms: Some(30_000),
        }
    }
}

impl EngineConfig {
    fn samples_per_ms(&self) -> f32 {
        self.sample_rate as f32 / 1000.0
    }

    pub fn min_silence_duration_samples(&self) -> usize {
        (self.min_silence_duration_ms as f32 * self.samples_per_ms()) as usize
    }

    pub fn speech_pad_samples(&self) -> usize {
        (self.speech_pad_ms as f32 * self.samples_per_ms()) as usize
    }

    pub fn min_speech_duration_samples(&self) -> usize {
        (self.min_speech_duration_ms as f32 * self.samples_per_ms()) as usize
    }

    pub fn max_speech_duration_samples(&self) -> Option<usize> {
        self.max_speech_duration_ms
            .map(|ms| (ms as f32 * self.samples_per_ms()) as usize)
    }

    /// Main buffer capacity in samples.
    pub fn main_capacity(&self) -> usize {
        self.max_buffer_duration_secs as usize * self.sample_rate as usize
    }

    /// Lookback FIFO depth: enough chunks to cover the pre-speech pad.
    pub fn max_lookback_chunks(&self) -> usize {
        self.speech_pad_samples().div_ceil(self.chunk_size)
    }

    /// Reject configurations the engine cannot run with. The checks are
    /// deliberately loud: a bad config is a caller bug, not a runtime event.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(EngineError::ConfigurationInvalid(
                "sample_rate must be positive".into(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(EngineError::ConfigurationInvalid(
                "chunk_size must be positive".into(),
            ));
        }
        if self.max_buffer_duration_secs == 0 {
            return Err(EngineError::ConfigurationInvalid(
                "max_buffer_duration_secs must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.speech_threshold)
            || !(0.0..=1.0).contains(&self.exit_threshold)
        {
            return Err(EngineError::ConfigurationInvalid(
                "thresholds must lie in [0, 1]".into(),
            ));
        }
        if self.exit_threshold >= self.speech_threshold {
            return Err(EngineError::ConfigurationInvalid(format!(
                "exit_threshold ({}) must be below speech_threshold ({})",
                self.exit_threshold, self.speech_threshold
            )));
        }
        if self.chunk_size > self.main_capacity() {
            return Err(EngineError::ConfigurationInvalid(
                "chunk_size exceeds the main buffer capacity".into(),
            ));
        }
        Ok(())
    }
}

/// Partial update for [`EngineConfig`]. `None` fields keep their prior value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPatch {
    pub sample_rate: Option<u32>,
    pub speech_threshold: Option<f32>,
    pub exit_threshold: Option<f32>,
    pub min_silence_duration_ms: Option<u32>,
    pub speech_pad_ms: Option<u32>,
    pub min_speech_duration_ms: Option<u32>,
    pub max_buffer_duration_secs: Option<u32>,
    pub chunk_size: Option<usize>,
    /// `Some(None)` disables the max-duration split; outer `None` keeps the
    /// current setting.
    pub max_speech_duration_ms: Option<Option<u32>>,
}

impl ConfigPatch {
    /// Apply onto `base`, returning the merged config (unvalidated).
    pub fn apply(&self, base: &EngineConfig) -> EngineConfig {
        let mut next = base.clone();
        if let Some(v) = self.sample_rate {
            next.sample_rate = v;
        }
        if let Some(v) = self.speech_threshold {
            next.speech_threshold = v;
        }
        if let Some(v) = self.exit_threshold {
            next.exit_threshold = v;
        }
        if let Some(v) = self.min_silence_duration_ms {
            next.min_silence_duration_ms = v;
        }
        if let Some(v) = self.speech_pad_ms {
            next.speech_pad_ms = v;
        }
        if let Some(v) = self.min_speech_duration_ms {
            next.min_speech_duration_ms = v;
        }
        if let Some(v) = self.max_buffer_duration_secs {
            next.max_buffer_duration_secs = v;
        }
        if let Some(v) = self.chunk_size {
            next.chunk_size = v;
        }
        if let Some(v) = self.max_speech_duration_ms {
            next.max_speech_duration_ms = v;
        }
        next
    }

    /// Whether applying this patch forces a main-buffer reallocation.
    pub fn requires_reallocation(&self) -> bool {
        self.sample_rate.is_some() || self.max_buffer_duration_secs.is_some()
    }
}
