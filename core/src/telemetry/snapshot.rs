//! telemetry/snapshot.rs
//!
//! Immutable telemetry snapshot built from counters and a timer.

use std::time::Duration;
use serde::{Serialize, Deserialize};

use crate::telemetry::counters::TelemetryCounters;
use crate::telemetry::timers::{TelemetryTimer, StageTimes, Stage};
use crate::utils::ratio;

/// Captures counters, ratio, throughput, stage timings, and elapsed duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub blocks_dispatched: u64,
    pub blocks_released: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub bytes_overhead: u64,
    pub backpressure_waits: u64,
    pub max_in_flight: u64,
    pub max_pending: u64,
    /// `bytes_out / bytes_in`, 0.0 before any input was released.
    pub compression_ratio: f64,
    pub throughput_bytes_per_sec: f64,
    pub elapsed: Duration,
    pub stage_times: StageTimes,
}

impl TelemetrySnapshot {
    pub fn from(counters: &TelemetryCounters, timer: &TelemetryTimer) -> Self {
        let elapsed = timer.elapsed();

        let throughput = if elapsed.as_secs_f64() > 0.0 {
            counters.bytes_in as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        Self {
            blocks_dispatched: counters.blocks_dispatched,
            blocks_released: counters.blocks_released,
            bytes_in: counters.bytes_in,
            bytes_out: counters.bytes_out(),
            bytes_overhead: counters.bytes_overhead,
            backpressure_waits: counters.backpressure_waits,
            max_in_flight: counters.max_in_flight,
            max_pending: counters.max_pending,
            compression_ratio: ratio(counters.bytes_out(), counters.bytes_in),
            throughput_bytes_per_sec: throughput,
            elapsed,
            stage_times: timer.stage_times.clone(),
        }
    }

    pub fn total_stage_time(&self) -> Duration {
        self.stage_times.iter().map(|(_, d)| *d).sum()
    }

    pub fn has_all_stages(&self, expected: &[Stage]) -> bool {
        expected.iter().all(|s| self.stage_times.get(*s) > Duration::ZERO)
    }

    /// Internal invariants: nothing released that was not dispatched, and
    /// stage time never exceeds wall time.
    pub fn sanity_check(&self) -> bool {
        self.blocks_released <= self.blocks_dispatched
            && self.bytes_out >= self.bytes_overhead
            && self.total_stage_time() <= self.elapsed
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
