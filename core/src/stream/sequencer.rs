//! stream/sequencer.rs
//! Ordered reassembly of completed blocks.
//!
//! Results arrive in completion order. They are parked in a BTreeMap keyed by
//! sequence and released to the sink strictly in sequence order; the running
//! totals are updated only on release.

use std::collections::BTreeMap;
use std::io::Write;

use crc32fast::Hasher;
use tracing::{debug, trace};

use crate::stream::task::TaskResult;
use crate::telemetry::TelemetryCounters;
use crate::types::EngineError;
use crate::utils::combine_checksum;

/// Running totals over released blocks.
#[derive(Debug, Clone, Default)]
pub struct StreamTotals {
    /// Raw bytes released.
    pub bytes_in: u64,
    /// Bytes written to the sink, container framing included.
    pub bytes_out: u64,
    /// CRC-32 state over all released raw bytes.
    pub checksum: Hasher,
}

impl StreamTotals {
    pub fn crc32(&self) -> u32 {
        self.checksum.clone().finalize()
    }
}

/// Outcome of one `submit`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Released {
    pub blocks: u64,
    pub final_released: bool,
}

#[derive(Debug, Default)]
pub struct Sequencer {
    next_expected: u64,
    pending: BTreeMap<u64, TaskResult>,
    final_released: bool,
    totals: StreamTotals,
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_expected(&self) -> u64 {
        self.next_expected
    }

    /// Completed blocks parked out of order.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn final_released(&self) -> bool {
        self.final_released
    }

    pub fn totals(&self) -> &StreamTotals {
        &self.totals
    }

    /// Write container framing (header or trailer) and account for it.
    pub fn write_framing<W: Write>(
        &mut self,
        bytes: &[u8],
        sink: &mut W,
        counters: &mut TelemetryCounters,
    ) -> Result<(), EngineError> {
        if bytes.is_empty() {
            return Ok(());
        }
        sink.write_all(bytes)?;
        self.totals.bytes_out += bytes.len() as u64;
        counters.add_overhead(bytes.len());
        Ok(())
    }

    /// Park `result`, then release every block that is now contiguous.
    ///
    /// A failed block stops the drain when its turn comes and surfaces as
    /// `EngineError::Compression` for that sequence.
    pub fn submit<W: Write>(
        &mut self,
        result: TaskResult,
        sink: &mut W,
        counters: &mut TelemetryCounters,
    ) -> Result<Released, EngineError> {
        let sequence = result.sequence();
        if sequence < self.next_expected || self.pending.contains_key(&sequence) {
            return Err(EngineError::State(format!("duplicate result for block {sequence}")));
        }
        if self.final_released {
            return Err(EngineError::State(format!("block {sequence} arrived after the final block")));
        }

        self.pending.insert(sequence, result);
        counters.observe_pending(self.pending.len());
        trace!(sequence, next = self.next_expected, pending = self.pending.len(), "[SEQUENCER] parked");

        let mut released = Released::default();
        while let Some(result) = self.pending.remove(&self.next_expected) {
            let block = match result {
                TaskResult::Completed(block) => block,
                TaskResult::Failed { sequence, error } => {
                    debug!(sequence, %error, "[SEQUENCER] failed block reached the head");
                    return Err(EngineError::Compression { sequence, source: error });
                }
            };

            sink.write_all(&block.payload)?;
            self.totals.bytes_in += block.raw_len as u64;
            self.totals.bytes_out += block.payload.len() as u64;
            combine_checksum(&mut self.totals.checksum, &block.checksum);
            counters.add_release(block.raw_len, block.payload.len());

            self.next_expected += 1;
            released.blocks += 1;

            if block.is_final() {
                self.final_released = true;
                released.final_released = true;
                debug!(sequence = block.sequence, "[SEQUENCER] final block released");
                break;
            }
        }
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::CompressionError;
    use crate::stream::splitter::BlockFlags;
    use crate::stream::task::CompressedBlock;
    use crate::utils::{block_checksum, compute_checksum};

    fn done(sequence: u64, data: &[u8], last: bool) -> TaskResult {
        TaskResult::Completed(CompressedBlock {
            sequence,
            payload: data.to_vec(),
            raw_len: data.len(),
            checksum: block_checksum(data),
            flags: if last { BlockFlags::FINAL } else { BlockFlags::empty() },
        })
    }

    #[test]
    fn releases_in_sequence_order() {
        let mut seq = Sequencer::new();
        let mut sink = Vec::new();
        let mut counters = TelemetryCounters::default();

        assert_eq!(seq.submit(done(2, b"cc", true), &mut sink, &mut counters).unwrap().blocks, 0);
        assert_eq!(seq.submit(done(1, b"bb", false), &mut sink, &mut counters).unwrap().blocks, 0);
        assert!(sink.is_empty());
        assert_eq!(seq.pending(), 2);

        let r = seq.submit(done(0, b"aa", false), &mut sink, &mut counters).unwrap();
        assert_eq!(r, Released { blocks: 3, final_released: true });
        assert_eq!(sink, b"aabbcc");
        assert_eq!(seq.totals().bytes_in, 6);
        assert_eq!(seq.totals().crc32(), compute_checksum(b"aabbcc"));
        assert_eq!(counters.max_pending, 3);
    }

    #[test]
    fn duplicate_sequence_is_a_state_error() {
        let mut seq = Sequencer::new();
        let mut sink = Vec::new();
        let mut counters = TelemetryCounters::default();
        seq.submit(done(1, b"x", false), &mut sink, &mut counters).unwrap();
        assert!(matches!(
            seq.submit(done(1, b"x", false), &mut sink, &mut counters),
            Err(EngineError::State(_))
        ));
    }

    #[test]
    fn failure_surfaces_only_when_its_turn_comes() {
        let mut seq = Sequencer::new();
        let mut sink = Vec::new();
        let mut counters = TelemetryCounters::default();

        let failed = TaskResult::Failed {
            sequence: 1,
            error: CompressionError::StateError("bad".into()),
        };
        seq.submit(failed, &mut sink, &mut counters).unwrap();
        let err = seq.submit(done(0, b"ok", false), &mut sink, &mut counters).unwrap_err();
        assert!(matches!(err, EngineError::Compression { sequence: 1, .. }));
        assert_eq!(sink, b"ok");
    }

    #[test]
    fn empty_final_block_completes_stream() {
        let mut seq = Sequencer::new();
        let mut sink = Vec::new();
        let mut counters = TelemetryCounters::default();
        let r = seq.submit(done(0, b"", true), &mut sink, &mut counters).unwrap();
        assert!(r.final_released);
        assert_eq!(seq.totals().bytes_in, 0);
    }

    #[test]
    fn framing_counts_toward_bytes_out() {
        let mut seq = Sequencer::new();
        let mut sink = Vec::new();
        let mut counters = TelemetryCounters::default();
        seq.write_framing(b"HDR", &mut sink, &mut counters).unwrap();
        assert_eq!(seq.totals().bytes_out, 3);
        assert_eq!(counters.bytes_overhead, 3);
    }
}
