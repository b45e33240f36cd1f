//! codecs/deflate.rs
//! gzip output built from independently compressed raw DEFLATE blocks.
//!
//! Every block gets a fresh `flate2::Compress` (no shared window). Non-final
//! blocks end with a sync flush, which leaves the bit stream byte aligned and
//! the last DEFLATE block non-final, so the per-block outputs concatenate into
//! one continuous raw DEFLATE stream. The final block finishes that stream.
//! The factory wraps it in a single gzip member (RFC 1952).

use byteorder::{ByteOrder, LittleEndian};
use flate2::{Compress, Compression, FlushCompress, Status};

use crate::compression::constants::{codec_ids, DEFAULT_LEVEL_DEFLATE};
use crate::compression::registry::check_level;
use crate::compression::types::{BlockCompressor, CompressionError, CompressorFactory};
use crate::constants::gzip;
use crate::stream::sequencer::StreamTotals;

/// Slack kept in the output vector so a flush can always make progress.
const OUTPUT_SLACK: usize = 64;

pub struct DeflateCompressor {
    inner: Compress,
}

impl DeflateCompressor {
    pub fn new(level: Compression) -> Self {
        Self { inner: Compress::new(level, false) }
    }

    fn process_failed(msg: impl ToString) -> CompressionError {
        CompressionError::CodecProcessFailed { codec: "deflate".into(), msg: msg.to_string() }
    }
}

impl BlockCompressor for DeflateCompressor {
    fn compress(&mut self, input: &[u8], is_final: bool, out: &mut Vec<u8>) -> Result<(), CompressionError> {
        let flush = if is_final { FlushCompress::Finish } else { FlushCompress::Sync };
        let mut consumed = 0usize;

        loop {
            let remaining = input.len() - consumed;
            out.reserve(remaining / 2 + OUTPUT_SLACK);

            let before = self.inner.total_in();
            let status = self
                .inner
                .compress_vec(&input[consumed..], out, flush)
                .map_err(Self::process_failed)?;
            consumed += (self.inner.total_in() - before) as usize;

            match status {
                Status::StreamEnd => return Ok(()),
                Status::Ok | Status::BufError => {
                    // A sync flush is complete once all input is taken and the
                    // encoder stopped short of filling the output.
                    if !is_final && consumed == input.len() && out.len() < out.capacity() {
                        return Ok(());
                    }
                }
            }
        }
    }

    fn total_in(&self) -> u64 {
        self.inner.total_in()
    }

    fn total_out(&self) -> u64 {
        self.inner.total_out()
    }
}

/// Factory for gzip streams (single member, CRC-32 + ISIZE trailer).
#[derive(Debug, Clone, Copy)]
pub struct GzipFactory {
    level: Compression,
}

impl GzipFactory {
    /// Fails with `InvalidLevel` unless `level` is in `0..=9`.
    pub fn new(level: i32) -> Result<Self, CompressionError> {
        check_level(codec_ids::DEFLATE, level)?;
        Ok(Self { level: Compression::new(level as u32) })
    }

    pub fn level(&self) -> u32 {
        self.level.level()
    }

    fn extra_flags(&self) -> u8 {
        match self.level.level() {
            9 => gzip::XFL_BEST,
            1 => gzip::XFL_FASTEST,
            _ => 0,
        }
    }
}

impl Default for GzipFactory {
    fn default() -> Self {
        Self { level: Compression::new(DEFAULT_LEVEL_DEFLATE as u32) }
    }
}

impl CompressorFactory for GzipFactory {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn new_compressor(&self) -> Result<Box<dyn BlockCompressor>, CompressionError> {
        Ok(Box::new(DeflateCompressor::new(self.level)))
    }

    fn stream_header(&self) -> Vec<u8> {
        let mut header = Vec::with_capacity(gzip::HEADER_LEN);
        header.extend_from_slice(&[gzip::ID1, gzip::ID2, gzip::CM_DEFLATE, 0]);
        header.extend_from_slice(&[0u8; 4]); // MTIME unknown
        header.push(self.extra_flags());
        header.push(gzip::OS_UNKNOWN);
        header
    }

    fn stream_trailer(&self, totals: &StreamTotals) -> Vec<u8> {
        let mut trailer = [0u8; gzip::TRAILER_LEN];
        LittleEndian::write_u32(&mut trailer[..4], totals.crc32());
        LittleEndian::write_u32(&mut trailer[4..], totals.bytes_in as u32);
        trailer.to_vec()
    }
}
