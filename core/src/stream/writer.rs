//! stream/writer.rs
//! `io::Write` facade over a `BlockEngine` with a small staging buffer.

use std::io::{self, Write};
use std::time::Duration;

use tracing::warn;

use crate::stream::config::StreamConfig;
use crate::stream::engine::{BlockEngine, EngineState};
use crate::telemetry::TelemetrySnapshot;
use crate::types::EngineError;

/// Parallel gzip (or zstd) writer.
///
/// Writes are staged in a `buffer_size` buffer and handed to the engine when
/// it fills. Dropping an unclosed writer closes it and logs any error.
pub struct ParallelWriter<W: Write> {
    engine: BlockEngine<W>,
    buf: Vec<u8>,
    buffer_size: usize,
}

impl<W: Write> ParallelWriter<W> {
    pub fn new(sink: W) -> Result<Self, EngineError> {
        Self::with_config(sink, &StreamConfig::default())
    }

    pub fn with_config(sink: W, config: &StreamConfig) -> Result<Self, EngineError> {
        let engine = BlockEngine::with_config(sink, config)?;
        Self::from_engine(engine, config.buffer_size)
    }

    pub fn from_engine(engine: BlockEngine<W>, buffer_size: usize) -> Result<Self, EngineError> {
        if buffer_size == 0 {
            return Err(EngineError::Configuration("buffer size must be > 0".into()));
        }
        Ok(Self {
            engine,
            buf: Vec::with_capacity(buffer_size),
            buffer_size,
        })
    }

    /// Bytes staged but not yet handed to the engine.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn finish(&mut self) -> Result<(), EngineError> {
        self.finish_timeout(None)
    }

    /// Staged bytes are handed to the engine first. That hand-off waits for
    /// in-flight capacity like any `write` and is not bounded by `timeout`;
    /// the deadline applies to the engine's finish only.
    pub fn finish_timeout(&mut self, timeout: Option<Duration>) -> Result<(), EngineError> {
        if self.engine.state() == EngineState::Open {
            self.drain_buffer()?;
        }
        self.engine.finish_timeout(timeout)
    }

    pub fn close(&mut self) -> Result<(), EngineError> {
        let drained = match self.engine.state() {
            EngineState::Open => self.drain_buffer(),
            _ => Ok(()),
        };
        let closed = self.engine.close();
        drained.and(closed)
    }

    pub fn close_with(&mut self, shutdown_pool: bool) -> Result<(), EngineError> {
        let drained = match self.engine.state() {
            EngineState::Open => self.drain_buffer(),
            _ => Ok(()),
        };
        let closed = self.engine.close_with(shutdown_pool);
        drained.and(closed)
    }

    pub fn total_in(&self) -> u64 {
        self.engine.total_in()
    }

    pub fn total_out(&self) -> u64 {
        self.engine.total_out()
    }

    pub fn compression_ratio(&self) -> f64 {
        self.engine.compression_ratio()
    }

    pub fn state(&self) -> EngineState {
        self.engine.state()
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.engine.telemetry()
    }

    pub fn engine(&self) -> &BlockEngine<W> {
        &self.engine
    }

    fn drain_buffer(&mut self) -> Result<(), EngineError> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let result = self.engine.write(&self.buf);
        self.buf.clear();
        result
    }
}

impl<W: Write> Write for ParallelWriter<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.engine.state() != EngineState::Open {
            return Err(EngineError::State(format!("write in state {:?}", self.engine.state())).into());
        }

        // Large writes skip the staging buffer once it is empty.
        if self.buf.is_empty() && data.len() >= self.buffer_size {
            self.engine.write(data)?;
            return Ok(data.len());
        }

        let room = self.buffer_size - self.buf.len();
        let take = room.min(data.len());
        self.buf.extend_from_slice(&data[..take]);
        if self.buf.len() == self.buffer_size {
            self.drain_buffer()?;
        }
        Ok(take)
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.engine.state() == EngineState::Open {
            self.drain_buffer()?;
        }
        self.engine.flush()?;
        Ok(())
    }
}

impl<W: Write> Drop for ParallelWriter<W> {
    fn drop(&mut self) {
        if self.engine.state() == EngineState::Closed {
            return;
        }
        if let Err(e) = self.close() {
            warn!(error = %e, "[WRITER] close on drop failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    use flate2::read::GzDecoder;

    use crate::stream::io::SharedBufferWriter;

    #[test]
    fn small_writes_are_staged() {
        let sink = SharedBufferWriter::new();
        let config = StreamConfig::default().with_buffer_size(16).with_block_size(8).with_workers(2);
        let mut w = ParallelWriter::with_config(sink.clone(), &config).unwrap();

        w.write_all(b"0123").unwrap();
        assert_eq!(w.buffered(), 4);
        w.write_all(b"456789abcdefghij").unwrap();
        w.close().unwrap();

        let mut decoded = Vec::new();
        GzDecoder::new(&sink.contents().unwrap()[..]).read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, b"0123456789abcdefghij");
        assert_eq!(w.total_in(), 20);
    }

    #[test]
    fn write_after_close_is_rejected() {
        let config = StreamConfig::default().with_workers(1);
        let mut w = ParallelWriter::with_config(Vec::new(), &config).unwrap();
        w.close().unwrap();
        assert!(w.write(b"late").is_err());
        // idempotent
        w.close().unwrap();
    }

    #[test]
    fn drop_closes_the_stream() {
        let sink = SharedBufferWriter::new();
        {
            let config = StreamConfig::default().with_workers(1);
            let mut w = ParallelWriter::with_config(sink.clone(), &config).unwrap();
            w.write_all(b"dropped but complete").unwrap();
        }
        let mut decoded = Vec::new();
        GzDecoder::new(&sink.contents().unwrap()[..]).read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, b"dropped but complete");
    }
}
