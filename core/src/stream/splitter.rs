//! stream/splitter.rs
//! Cuts producer writes into fixed-size, sequence-numbered raw blocks.

use bytes::{Bytes, BytesMut};

use crate::types::EngineError;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct BlockFlags: u8 {
        /// Last block of the stream
        const FINAL = 0b0000_0001;
    }
}

/// One block of producer bytes, owned by its compression task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock {
    /// Monotonic block number starting at 0
    pub sequence: u64,
    pub payload: Bytes,
    pub flags: BlockFlags,
}

impl RawBlock {
    pub fn is_final(&self) -> bool {
        self.flags.contains(BlockFlags::FINAL)
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

#[derive(Debug)]
pub struct BlockSplitter {
    block_size: usize,
    buf: BytesMut,
    next_sequence: u64,
    final_emitted: bool,
}

impl BlockSplitter {
    pub fn new(block_size: usize) -> Result<Self, EngineError> {
        if block_size == 0 {
            return Err(EngineError::Configuration("block size must be > 0".into()));
        }
        Ok(Self {
            block_size,
            buf: BytesMut::with_capacity(block_size),
            next_sequence: 0,
            final_emitted: false,
        })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Bytes accepted but not yet emitted.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Sequence number the next emitted block will carry.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    pub fn is_final_emitted(&self) -> bool {
        self.final_emitted
    }

    /// Append `data`, returning every block that became full.
    pub fn accept(&mut self, mut data: &[u8]) -> Vec<RawBlock> {
        let mut blocks = Vec::new();
        while !data.is_empty() {
            let room = self.block_size - self.buf.len();
            let take = room.min(data.len());
            self.buf.extend_from_slice(&data[..take]);
            data = &data[take..];

            if self.buf.len() == self.block_size {
                blocks.push(self.emit(BlockFlags::empty()));
            }
        }
        blocks
    }

    /// Emit whatever is buffered (possibly nothing) as the FINAL block.
    /// Returns `None` once the final block has been emitted.
    pub fn flush_partial(&mut self) -> Option<RawBlock> {
        if self.final_emitted {
            return None;
        }
        self.final_emitted = true;
        Some(self.emit(BlockFlags::FINAL))
    }

    fn emit(&mut self, flags: BlockFlags) -> RawBlock {
        let payload = self.buf.split().freeze();
        self.buf.reserve(self.block_size);
        let block = RawBlock { sequence: self.next_sequence, payload, flags };
        self.next_sequence += 1;
        block
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_block_size_is_a_configuration_error() {
        assert!(matches!(BlockSplitter::new(0), Err(EngineError::Configuration(_))));
    }

    #[test]
    fn emits_full_blocks_across_write_boundaries() {
        let mut s = BlockSplitter::new(4).unwrap();
        assert!(s.accept(&[1, 2, 3]).is_empty());
        let blocks = s.accept(&[4, 5, 6, 7, 8, 9]);
        assert_eq!(blocks.len(), 2);
        assert_eq!(&blocks[0].payload[..], &[1, 2, 3, 4]);
        assert_eq!(&blocks[1].payload[..], &[5, 6, 7, 8]);
        assert_eq!(blocks[1].sequence, 1);
        assert_eq!(s.buffered(), 1);
    }

    #[test]
    fn final_block_is_emitted_once() {
        let mut s = BlockSplitter::new(8).unwrap();
        s.accept(b"abc");
        let last = s.flush_partial().unwrap();
        assert!(last.is_final());
        assert_eq!(&last.payload[..], b"abc");
        assert!(s.flush_partial().is_none());
    }
}
