//! stream/mod.rs
//! Parallel block pipeline: split → compress on a pool → reassemble in order.

pub mod config;
pub mod engine;
pub mod io;
pub mod parallelism;
pub mod sequencer;
pub mod splitter;
pub mod task;
pub mod writer;

pub use config::StreamConfig;
pub use engine::{BlockEngine, EngineState};
pub use io::SharedBufferWriter;
pub use parallelism::{Executor, Job, ParallelismProfile, PoolError, PoolHandle, PoolOwnership, WorkerPool};
pub use sequencer::{Released, Sequencer, StreamTotals};
pub use splitter::{BlockFlags, BlockSplitter, RawBlock};
pub use task::{CompressedBlock, CompressionTask, TaskResult};
pub use writer::ParallelWriter;
