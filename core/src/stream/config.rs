//! stream/config.rs
//! Engine configuration: sizes, backpressure, codec and pool selection.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::compression::{codec_ids, create_factory, CompressorFactory};
use crate::constants::{
    DEFAULT_BLOCK_SIZE, DEFAULT_BUFFER_SIZE, INFLIGHT_MEMORY_FRACTION, MAX_BLOCK_SIZE, MAX_DEFAULT_INFLIGHT,
};
use crate::stream::parallelism::{ParallelismProfile, PoolHandle};
use crate::types::EngineError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Bytes the writer facade buffers before handing them to the engine.
    pub buffer_size: usize,

    /// Raw bytes per compression block.
    pub block_size: usize,

    /// Max blocks dispatched but not yet released.
    /// - `None` → derived from pool parallelism and available memory.
    pub backpressure_limit: Option<usize>,

    /// Codec id from `compression::codec_ids`.
    pub codec: u16,

    /// Codec level; `None` → codec default.
    pub level: Option<i32>,

    /// `Some(n)` → a dedicated pool of n workers; `None` → the shared pool.
    pub workers: Option<usize>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            block_size: DEFAULT_BLOCK_SIZE,
            backpressure_limit: None,
            codec: codec_ids::DEFLATE,
            level: None,
            workers: None,
        }
    }
}

impl StreamConfig {
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_backpressure_limit(mut self, limit: usize) -> Self {
        self.backpressure_limit = Some(limit);
        self
    }

    pub fn with_codec(mut self, codec: u16, level: Option<i32>) -> Self {
        self.codec = codec;
        self.level = level;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Checks everything, including that the codec exists and accepts `level`.
    pub fn validate(&self) -> Result<(), EngineError> {
        self.validate_sizes()?;
        self.build_factory()?;
        Ok(())
    }

    /// Size, limit and worker checks. Engines built from an explicit factory
    /// and pool run only these.
    pub fn validate_sizes(&self) -> Result<(), EngineError> {
        if self.buffer_size == 0 {
            return Err(EngineError::Configuration("buffer size must be > 0".into()));
        }
        if self.block_size == 0 || self.block_size > MAX_BLOCK_SIZE {
            return Err(EngineError::Configuration(format!(
                "invalid block size: {}, must be in 1..={MAX_BLOCK_SIZE}",
                self.block_size
            )));
        }
        if self.backpressure_limit == Some(0) {
            return Err(EngineError::Configuration("backpressure limit must be > 0".into()));
        }
        if self.workers == Some(0) {
            return Err(EngineError::Configuration("worker count must be > 0".into()));
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| EngineError::Configuration(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Configured limit, or one derived for a pool of `parallelism` workers.
    pub fn resolve_backpressure_limit(&self, parallelism: usize) -> usize {
        match self.backpressure_limit {
            Some(limit) => limit,
            None => {
                ParallelismProfile::dynamic(self.block_size, parallelism, INFLIGHT_MEMORY_FRACTION, MAX_DEFAULT_INFLIGHT)
                    .inflight_blocks
            }
        }
    }

    pub fn build_factory(&self) -> Result<Arc<dyn CompressorFactory>, EngineError> {
        create_factory(self.codec, self.level).map_err(|e| EngineError::Configuration(e.to_string()))
    }

    pub fn build_pool(&self) -> Result<PoolHandle, EngineError> {
        match self.workers {
            Some(n) => Ok(PoolHandle::with_workers(n)?),
            None => Ok(PoolHandle::shared()?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::resolve;

    #[test]
    fn defaults_are_valid() {
        let cfg = StreamConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.block_size, 1 << 17);
        assert_eq!(cfg.buffer_size, 1 << 17);
    }

    #[test]
    fn rejects_zero_sizes() {
        assert!(StreamConfig::default().with_block_size(0).validate().is_err());
        assert!(StreamConfig::default().with_buffer_size(0).validate().is_err());
        assert!(StreamConfig::default().with_backpressure_limit(0).validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg = StreamConfig::from_json(r#"{"block_size": 4096, "workers": 2}"#).unwrap();
        assert_eq!(cfg.block_size, 4096);
        assert_eq!(cfg.workers, Some(2));
        assert_eq!(cfg.codec, codec_ids::DEFLATE);
    }

    #[test]
    fn unknown_codec_is_a_configuration_error() {
        let err = StreamConfig::default().with_codec(0x7777, None).validate().unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
    }

    #[test]
    fn out_of_range_level_is_a_configuration_error() {
        let err = StreamConfig::default().with_codec(codec_ids::DEFLATE, Some(42)).validate().unwrap_err();
        assert!(matches!(err, EngineError::Configuration(ref msg) if msg.contains("42")));

        let err = StreamConfig::from_json(r#"{"level": -7}"#).unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));

        let max = *resolve(codec_ids::DEFLATE).unwrap().levels.end();
        StreamConfig::default().with_codec(codec_ids::DEFLATE, Some(max)).validate().unwrap();
        assert!(StreamConfig::default().with_codec(codec_ids::ZSTD, Some(10_000)).validate().is_err());
    }

    #[test]
    fn oversized_block_is_rejected_by_size_checks() {
        let cfg = StreamConfig::default().with_block_size(MAX_BLOCK_SIZE + 1);
        assert!(matches!(cfg.validate_sizes(), Err(EngineError::Configuration(_))));
        assert!(StreamConfig::default().with_workers(0).validate_sizes().is_err());
    }

    #[test]
    fn explicit_limit_wins() {
        let cfg = StreamConfig::default().with_backpressure_limit(3);
        assert_eq!(cfg.resolve_backpressure_limit(64), 3);
        assert!(StreamConfig::default().resolve_backpressure_limit(4) >= 1);
    }
}
