use std::io;
use thiserror::Error;

use crate::compression::CompressionError;
use crate::stream::parallelism::PoolError;

/// Unified engine error covering configuration, per-block compression, sink
/// I/O, lifecycle misuse and pool failures.
/// - `From<T>` impls enable `?` across the pipeline.
/// - `Compression` is reported for the lowest failing sequence number, never
///   in completion order.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid block/buffer size or limit, raised at construction.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A worker's compressor failed on one block.
    #[error("compression failed for block {sequence}: {source}")]
    Compression {
        sequence: u64,
        #[source]
        source: CompressionError,
    },

    /// `finish` deadline elapsed with blocks still outstanding.
    #[error("timed out with {pending} block(s) outstanding")]
    Timeout { pending: u64 },

    /// The underlying sink failed.
    #[error("sink error: {0}")]
    Sink(#[from] io::Error),

    /// Operation not allowed in the current lifecycle state.
    #[error("state error: {0}")]
    State(String),

    #[error("pool error: {0}")]
    Pool(#[from] PoolError),

    /// An earlier terminal error; the engine refuses further progress.
    #[error("engine faulted: {0}")]
    Faulted(String),
}

impl EngineError {
    /// Recoverable errors leave the engine usable (retry `finish` or `close`).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, EngineError::Timeout { .. })
    }

    /// Rebuild an equivalent error so a stored fault can be reported again.
    /// I/O errors keep their kind and message.
    pub fn replay(&self) -> EngineError {
        match self {
            EngineError::Configuration(msg) => EngineError::Configuration(msg.clone()),
            EngineError::Compression { sequence, source } => {
                EngineError::Compression { sequence: *sequence, source: source.clone() }
            }
            EngineError::Timeout { pending } => EngineError::Timeout { pending: *pending },
            EngineError::Sink(e) => EngineError::Sink(io::Error::new(e.kind(), e.to_string())),
            EngineError::State(msg) => EngineError::State(msg.clone()),
            EngineError::Pool(PoolError::Shutdown) => EngineError::Pool(PoolError::Shutdown),
            EngineError::Pool(PoolError::Spawn(e)) => {
                EngineError::Pool(PoolError::Spawn(io::Error::new(e.kind(), e.to_string())))
            }
            EngineError::Pool(PoolError::Poisoned) => EngineError::Pool(PoolError::Poisoned),
            EngineError::Faulted(msg) => EngineError::Faulted(msg.clone()),
        }
    }
}

impl From<EngineError> for io::Error {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Sink(inner) => inner,
            EngineError::Timeout { .. } => io::Error::new(io::ErrorKind::TimedOut, e),
            EngineError::Configuration(_) => io::Error::new(io::ErrorKind::InvalidInput, e),
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}
