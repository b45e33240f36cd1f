//! compression/types.rs
//! Codec identifiers, compressor traits and the compression error type.
use num_enum::TryFromPrimitive;
use thiserror::Error;

use crate::compression::constants::codec_ids;
use crate::stream::sequencer::StreamTotals;
use crate::utils::enum_name_or_hex;

/// FFI-safe enum for compression codec identifiers.
#[repr(u16)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, TryFromPrimitive)]
pub enum CompressionCodec {
    Zstd    = codec_ids::ZSTD,
    Deflate = codec_ids::DEFLATE,
}

impl CompressionCodec {
    pub fn verify(raw: u16) -> Result<Self, CompressionError> {
        Self::try_from_primitive(raw).map_err(|_| CompressionError::UnsupportedCodec { codec_id: raw })
    }
}

#[derive(Debug, Clone, Error)]
pub enum CompressionError {
    #[error("unsupported compression codec: {}", codec_name(.codec_id))]
    UnsupportedCodec { codec_id: u16 },

    #[error("invalid level {level} for codec {}, must be in {min}..={max}", codec_name(.codec_id))]
    InvalidLevel { codec_id: u16, level: i32, min: i32, max: i32 },

    #[error("codec {codec} init failed: {msg}")]
    CodecInitFailed { codec: String, msg: String },

    #[error("codec {codec} process failed: {msg}")]
    CodecProcessFailed { codec: String, msg: String },

    #[error("compression state error: {0}")]
    StateError(String),
}

fn codec_name(raw: &u16) -> String {
    enum_name_or_hex::<CompressionCodec>(*raw)
}

impl From<std::io::Error> for CompressionError {
    fn from(e: std::io::Error) -> Self {
        CompressionError::StateError(e.to_string())
    }
}

/// A single-use, stateful block compressor.
///
/// One instance is created per block by a [`CompressorFactory`] and moved
/// into the worker that compresses that block, so implementations never see
/// concurrent calls.
pub trait BlockCompressor: Send {
    /// Compress one block into `out`.
    ///
    /// `is_final` is set only for the last block of the stream; backends that
    /// produce one continuous encoded stream use it to terminate that stream.
    fn compress(&mut self, input: &[u8], is_final: bool, out: &mut Vec<u8>) -> Result<(), CompressionError>;

    /// Raw bytes consumed so far.
    fn total_in(&self) -> u64;

    /// Encoded bytes produced so far.
    fn total_out(&self) -> u64;
}

/// Builds compressor instances and owns the container framing around the
/// concatenated blocks.
pub trait CompressorFactory: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn new_compressor(&self) -> Result<Box<dyn BlockCompressor>, CompressionError>;

    /// Bytes written to the sink before the first block.
    fn stream_header(&self) -> Vec<u8> {
        Vec::new()
    }

    /// Bytes written to the sink after the final block has been released.
    fn stream_trailer(&self, _totals: &StreamTotals) -> Vec<u8> {
        Vec::new()
    }
}
