//! src/compression/codecs/zstd.rs
//!
//! Zstd block compressor.
//!
//! Design notes:
//! - Each block becomes one standalone zstd frame (`zstd::bulk` API).
//! - Concatenated frames are a valid multi-frame zstd stream, so the factory
//!   needs no container header or trailer.
//! - Frames carry their own content checksum.

use crate::compression::constants::{codec_ids, DEFAULT_LEVEL_ZSTD};
use crate::compression::registry::check_level;
use crate::compression::types::{BlockCompressor, CompressionError, CompressorFactory};

pub struct ZstdCompressor {
    level: i32,
    total_in: u64,
    total_out: u64,
}

impl ZstdCompressor {
    pub fn new(level: i32) -> Self {
        Self { level, total_in: 0, total_out: 0 }
    }
}

impl BlockCompressor for ZstdCompressor {
    fn compress(&mut self, input: &[u8], _is_final: bool, out: &mut Vec<u8>) -> Result<(), CompressionError> {
        let mut encoder = zstd::bulk::Compressor::new(self.level)
            .map_err(|e| CompressionError::CodecInitFailed { codec: "zstd".into(), msg: e.to_string() })?;
        encoder
            .include_checksum(true)
            .map_err(|e| CompressionError::CodecInitFailed { codec: "zstd".into(), msg: e.to_string() })?;

        let frame = encoder
            .compress(input)
            .map_err(|e| CompressionError::CodecProcessFailed { codec: "zstd".into(), msg: e.to_string() })?;

        self.total_in += input.len() as u64;
        self.total_out += frame.len() as u64;
        out.extend_from_slice(&frame);
        Ok(())
    }

    fn total_in(&self) -> u64 {
        self.total_in
    }

    fn total_out(&self) -> u64 {
        self.total_out
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ZstdFactory {
    level: i32,
}

impl ZstdFactory {
    /// Fails with `InvalidLevel` outside `zstd::compression_level_range()`.
    pub fn new(level: i32) -> Result<Self, CompressionError> {
        check_level(codec_ids::ZSTD, level)?;
        Ok(Self { level })
    }
}

impl Default for ZstdFactory {
    fn default() -> Self {
        Self { level: DEFAULT_LEVEL_ZSTD }
    }
}

impl CompressorFactory for ZstdFactory {
    fn name(&self) -> &'static str {
        "zstd"
    }

    fn new_compressor(&self) -> Result<Box<dyn BlockCompressor>, CompressionError> {
        Ok(Box::new(ZstdCompressor::new(self.level)))
    }
}
