//! stream/task.rs
//! One unit of pool work: compress a single raw block.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crc32fast::Hasher;
use tracing::trace;

use crate::compression::{BlockCompressor, CompressionError};
use crate::stream::splitter::{BlockFlags, RawBlock};
use crate::utils::block_checksum;

/// Compressed output of one block plus its contribution to the stream totals.
#[derive(Debug, Clone)]
pub struct CompressedBlock {
    pub sequence: u64,
    pub payload: Vec<u8>,
    /// Length of the raw input this block covers.
    pub raw_len: usize,
    /// CRC-32 state over the raw input only, combined later in sequence order.
    pub checksum: Hasher,
    pub flags: BlockFlags,
}

impl CompressedBlock {
    pub fn is_final(&self) -> bool {
        self.flags.contains(BlockFlags::FINAL)
    }
}

/// What a task reports back to the engine. Failures travel as values.
#[derive(Debug)]
pub enum TaskResult {
    Completed(CompressedBlock),
    Failed { sequence: u64, error: CompressionError },
}

impl TaskResult {
    pub fn sequence(&self) -> u64 {
        match self {
            TaskResult::Completed(block) => block.sequence,
            TaskResult::Failed { sequence, .. } => *sequence,
        }
    }
}

pub struct CompressionTask {
    block: RawBlock,
    compressor: Box<dyn BlockCompressor>,
}

impl CompressionTask {
    pub fn new(block: RawBlock, compressor: Box<dyn BlockCompressor>) -> Self {
        Self { block, compressor }
    }

    pub fn sequence(&self) -> u64 {
        self.block.sequence
    }

    /// Compress the block. Never panics: a panicking compressor is reported
    /// as a failed block.
    pub fn run(self) -> TaskResult {
        let CompressionTask { block, mut compressor } = self;
        let sequence = block.sequence;

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let mut payload = Vec::with_capacity(block.len() / 2 + 64);
            compressor.compress(&block.payload, block.is_final(), &mut payload)?;
            trace!(
                sequence,
                total_in = compressor.total_in(),
                total_out = compressor.total_out(),
                "[TASK] block compressed"
            );
            Ok::<_, CompressionError>(payload)
        }));

        match outcome {
            Ok(Ok(payload)) => TaskResult::Completed(CompressedBlock {
                sequence,
                payload,
                raw_len: block.len(),
                checksum: block_checksum(&block.payload),
                flags: block.flags,
            }),
            Ok(Err(error)) => TaskResult::Failed { sequence, error },
            Err(_) => TaskResult::Failed {
                sequence,
                error: CompressionError::StateError("compressor panicked".into()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    use crate::compression::{CompressorFactory, GzipFactory};

    struct Exploding;

    impl BlockCompressor for Exploding {
        fn compress(&mut self, _: &[u8], _: bool, _: &mut Vec<u8>) -> Result<(), CompressionError> {
            panic!("exploding compressor")
        }
        fn total_in(&self) -> u64 {
            0
        }
        fn total_out(&self) -> u64 {
            0
        }
    }

    fn raw(sequence: u64, data: &'static [u8], flags: BlockFlags) -> RawBlock {
        RawBlock { sequence, payload: Bytes::from_static(data), flags }
    }

    #[test]
    fn completed_block_carries_raw_len_and_checksum() {
        let compressor = GzipFactory::default().new_compressor().unwrap();
        let result = CompressionTask::new(raw(3, b"abcdabcd", BlockFlags::FINAL), compressor).run();
        match result {
            TaskResult::Completed(block) => {
                assert_eq!(block.sequence, 3);
                assert_eq!(block.raw_len, 8);
                assert!(block.is_final());
                assert_eq!(block.checksum.finalize(), crate::utils::compute_checksum(b"abcdabcd"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn panic_becomes_failed_result() {
        let result = CompressionTask::new(raw(1, b"x", BlockFlags::empty()), Box::new(Exploding)).run();
        assert!(matches!(result, TaskResult::Failed { sequence: 1, .. }));
    }
}
