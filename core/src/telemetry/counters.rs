//! telemetry/counters.rs
//! Mutable counters used while an engine runs.
//!
//! Summary: collects block counts, byte counts and backpressure pressure
//! points. Converted into an immutable TelemetrySnapshot on demand.
use std::ops::AddAssign;
use serde::{Deserialize, Serialize};

/// Deterministic counters collected during stream processing
#[derive(Default, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TelemetryCounters {
    pub blocks_dispatched: u64,
    pub blocks_released: u64,
    pub bytes_in: u64,
    pub bytes_compressed: u64,
    /// Container header + trailer bytes.
    pub bytes_overhead: u64,
    /// Times the producer had to wait for an in-flight slot.
    pub backpressure_waits: u64,
    pub max_in_flight: u64,
    /// Largest number of completed blocks parked out of order.
    pub max_pending: u64,
}

impl TelemetryCounters {
    /// Record one block handed to the pool.
    pub fn add_dispatch(&mut self, in_flight: usize) {
        self.blocks_dispatched += 1;
        self.max_in_flight = self.max_in_flight.max(in_flight as u64);
    }

    /// Record one block written to the sink in order.
    pub fn add_release(&mut self, raw_len: usize, compressed_len: usize) {
        self.blocks_released += 1;
        self.bytes_in += raw_len as u64;
        self.bytes_compressed += compressed_len as u64;
    }

    pub fn add_overhead(&mut self, len: usize) {
        self.bytes_overhead += len as u64;
    }

    pub fn add_backpressure_wait(&mut self) {
        self.backpressure_waits += 1;
    }

    pub fn observe_pending(&mut self, pending: usize) {
        self.max_pending = self.max_pending.max(pending as u64);
    }

    /// Every byte that reached the sink.
    pub fn bytes_out(&self) -> u64 {
        self.bytes_compressed + self.bytes_overhead
    }

    pub fn merge(&mut self, other: &TelemetryCounters) {
        self.blocks_dispatched += other.blocks_dispatched;
        self.blocks_released += other.blocks_released;
        self.bytes_in += other.bytes_in;
        self.bytes_compressed += other.bytes_compressed;
        self.bytes_overhead += other.bytes_overhead;
        self.backpressure_waits += other.backpressure_waits;
        self.max_in_flight = self.max_in_flight.max(other.max_in_flight);
        self.max_pending = self.max_pending.max(other.max_pending);
    }
}

impl AddAssign for TelemetryCounters {
    fn add_assign(&mut self, rhs: Self) {
        self.merge(&rhs);
    }
}
