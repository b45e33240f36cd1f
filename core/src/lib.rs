//! pargz-core
//!
//! Parallel block-compression writer: producer bytes are cut into blocks,
//! compressed on a worker pool and written back in order as one stream.
//! No unsafe, no global logger; callers install their own subscriber.

#![forbid(unsafe_code)]

// Shared and top level
pub mod constants;
pub mod types;
pub mod utils;

pub mod compression;
pub mod telemetry;

// Stream layer
pub mod stream;

// -----------------------------------------------------------------------------
// Prelude (Rust users)
// -----------------------------------------------------------------------------
pub mod prelude {
    pub use crate::compression::{codec_ids, create_factory, CompressionError, CompressorFactory};
    pub use crate::stream::{BlockEngine, EngineState, ParallelWriter, PoolHandle, StreamConfig, WorkerPool};
    pub use crate::telemetry::TelemetrySnapshot;
    pub use crate::types::EngineError;
}
