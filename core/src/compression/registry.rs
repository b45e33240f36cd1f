//! compression/registry.rs
//! Codec registry and factory construction.

use std::ops::RangeInclusive;
use std::sync::Arc;

use crate::compression::codecs::{GzipFactory, ZstdFactory};
use crate::compression::constants::{DEFAULT_LEVEL_DEFLATE, DEFAULT_LEVEL_ZSTD};
use crate::compression::types::{CompressionCodec, CompressionError, CompressorFactory};

pub struct CodecInfo {
    pub default_level: i32,
    pub levels: RangeInclusive<i32>,
}

pub fn resolve(codec_id: u16) -> Result<CodecInfo, CompressionError> {
    match CompressionCodec::verify(codec_id)? {
        CompressionCodec::Deflate => Ok(CodecInfo { default_level: DEFAULT_LEVEL_DEFLATE, levels: 0..=9 }),
        CompressionCodec::Zstd => Ok(CodecInfo {
            default_level: DEFAULT_LEVEL_ZSTD,
            levels: zstd::compression_level_range(),
        }),
    }
}

/// Reject `level` when the codec does not support it.
pub fn check_level(codec_id: u16, level: i32) -> Result<(), CompressionError> {
    let levels = resolve(codec_id)?.levels;
    if levels.contains(&level) {
        return Ok(());
    }
    Err(CompressionError::InvalidLevel { codec_id, level, min: *levels.start(), max: *levels.end() })
}

/// Build the compressor factory for `codec_id`, using the codec's default
/// level when `level` is `None`.
pub fn create_factory(codec_id: u16, level: Option<i32>) -> Result<Arc<dyn CompressorFactory>, CompressionError> {
    let level = level.unwrap_or(resolve(codec_id)?.default_level);
    match CompressionCodec::verify(codec_id)? {
        CompressionCodec::Deflate => Ok(Arc::new(GzipFactory::new(level)?)),
        CompressionCodec::Zstd => Ok(Arc::new(ZstdFactory::new(level)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::constants::codec_ids;

    #[test]
    fn resolves_known_codecs() {
        assert_eq!(create_factory(codec_ids::DEFLATE, None).unwrap().name(), "gzip");
        assert_eq!(create_factory(codec_ids::ZSTD, Some(5)).unwrap().name(), "zstd");
    }

    #[test]
    fn unknown_codec_is_rejected() {
        let err = create_factory(0x7777, None).err().unwrap();
        assert!(matches!(err, CompressionError::UnsupportedCodec { codec_id: 0x7777 }));
        assert!(err.to_string().contains("0x7777"));
    }

    #[test]
    fn out_of_range_level_is_rejected() {
        let err = create_factory(codec_ids::DEFLATE, Some(42)).err().unwrap();
        assert!(matches!(err, CompressionError::InvalidLevel { level: 42, min: 0, max: 9, .. }));
        assert!(err.to_string().contains("Deflate"));
        assert!(create_factory(codec_ids::ZSTD, Some(10_000)).is_err());
    }
}
