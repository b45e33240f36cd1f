//! stream/engine.rs
//! Block compression engine: split, dispatch, reassemble, frame.
//!
//! The producer thread owns the engine. Workers only hold a result sender;
//! the producer drains the result channel and is the single writer of the
//! sequencer and the sink. In-flight blocks (dispatched, not yet released)
//! never exceed the backpressure limit.

use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, trace, warn};

use crate::compression::CompressorFactory;
use crate::stream::config::StreamConfig;
use crate::stream::parallelism::{Job, PoolHandle};
use crate::stream::sequencer::Sequencer;
use crate::stream::splitter::{BlockSplitter, RawBlock};
use crate::stream::task::{CompressionTask, TaskResult};
use crate::telemetry::{Stage, TelemetryCounters, TelemetrySnapshot, TelemetryTimer};
use crate::types::EngineError;
use crate::utils::ratio;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Accepting writes.
    Open,
    /// Final block dispatched or about to be; waiting for release.
    Finishing,
    /// Trailer written and sink flushed; the sink is still attached.
    Finished,
    /// Sink flushed and dropped.
    Closed,
}

pub struct BlockEngine<W: Write> {
    sink: Option<W>,
    factory: Arc<dyn CompressorFactory>,
    pool: PoolHandle,
    splitter: BlockSplitter,
    sequencer: Sequencer,
    results_tx: Sender<TaskResult>,
    results_rx: Receiver<TaskResult>,
    limit: usize,
    dispatched: u64,
    state: EngineState,
    /// First terminal error.
    fault: Option<EngineError>,
    counters: TelemetryCounters,
    timer: TelemetryTimer,
}

impl<W: Write> BlockEngine<W> {
    /// gzip at the default level on the shared pool, default block size.
    pub fn new(sink: W) -> Result<Self, EngineError> {
        Self::with_config(sink, &StreamConfig::default())
    }

    pub fn with_config(sink: W, config: &StreamConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let factory = config.build_factory()?;
        let pool = config.build_pool()?;
        Self::from_parts(sink, factory, pool, config)
    }

    /// Build from an explicit factory and pool. Only `block_size` and
    /// `backpressure_limit` are taken from `config`, after the size checks.
    pub fn from_parts(
        sink: W,
        factory: Arc<dyn CompressorFactory>,
        pool: PoolHandle,
        config: &StreamConfig,
    ) -> Result<Self, EngineError> {
        config.validate_sizes()?;
        let splitter = BlockSplitter::new(config.block_size)?;
        let limit = config.resolve_backpressure_limit(pool.executor().parallelism());
        let (results_tx, results_rx) = unbounded();

        let mut engine = Self {
            sink: Some(sink),
            factory,
            pool,
            splitter,
            sequencer: Sequencer::new(),
            results_tx,
            results_rx,
            limit,
            dispatched: 0,
            state: EngineState::Open,
            fault: None,
            counters: TelemetryCounters::default(),
            timer: TelemetryTimer::new(),
        };

        let header = engine.factory.stream_header();
        engine.write_framing(&header)?;

        debug!(
            codec = engine.factory.name(),
            block_size = config.block_size,
            limit,
            parallelism = engine.pool.executor().parallelism(),
            dedicated = engine.pool.is_dedicated(),
            "[ENGINE] opened"
        );
        Ok(engine)
    }

    // ---- public operations ----

    /// Accept producer bytes; every block that fills up is dispatched.
    /// Blocks while the in-flight limit is reached.
    pub fn write(&mut self, data: &[u8]) -> Result<(), EngineError> {
        let result = self.write_inner(data);
        result.map_err(|e| self.record(e))
    }

    /// Release whatever has already completed, then flush the sink.
    /// Never forces a short block.
    pub fn flush(&mut self) -> Result<(), EngineError> {
        let result = self.flush_inner();
        result.map_err(|e| self.record(e))
    }

    /// Finish without a deadline.
    pub fn finish(&mut self) -> Result<(), EngineError> {
        self.finish_timeout(None)
    }

    /// Dispatch the final block, wait for every block to be released, then
    /// write the trailer and flush the sink.
    ///
    /// On `Timeout` the engine stays in `Finishing`; in-flight work keeps
    /// running and a later call resumes where this one stopped.
    pub fn finish_timeout(&mut self, timeout: Option<Duration>) -> Result<(), EngineError> {
        let result = self.finish_inner(timeout);
        result.map_err(|e| self.record(e))
    }

    /// Close, shutting the pool down only if it is dedicated to this engine.
    pub fn close(&mut self) -> Result<(), EngineError> {
        self.close_with(self.pool.is_dedicated())
    }

    /// Finish, optionally shut the pool down, then flush and drop the sink.
    ///
    /// The sink is released even when finishing fails; the first error is
    /// the one reported. On a faulted engine that is the original terminal
    /// error, not `Faulted`. A second close is a no-op.
    pub fn close_with(&mut self, shutdown_pool: bool) -> Result<(), EngineError> {
        if self.state == EngineState::Closed {
            return Ok(());
        }
        debug!(shutdown_pool, state = ?self.state, "[ENGINE] closing");

        let finished = match &self.fault {
            Some(err) => Err(err.replay()),
            None => self.finish_timeout(None),
        };

        let shutdown = if shutdown_pool {
            self.pool.executor().shutdown().map_err(EngineError::from)
        } else {
            Ok(())
        };

        let released = match self.sink.take() {
            Some(mut sink) => sink.flush().map_err(EngineError::from),
            None => Ok(()),
        };

        self.state = EngineState::Closed;
        self.timer.finish();

        finished?;
        shutdown?;
        released
    }

    /// Finish and hand the sink back. A dedicated pool is shut down.
    pub fn into_inner(mut self) -> Result<W, EngineError> {
        self.finish()?;
        if self.pool.is_dedicated() {
            self.pool.executor().shutdown()?;
        }
        self.state = EngineState::Closed;
        self.sink
            .take()
            .ok_or_else(|| EngineError::State("sink already released".into()))
    }

    // ---- accessors ----

    /// Raw bytes released to the sink so far.
    pub fn total_in(&self) -> u64 {
        self.sequencer.totals().bytes_in
    }

    /// Bytes written to the sink so far, framing included.
    pub fn total_out(&self) -> u64 {
        self.sequencer.totals().bytes_out
    }

    /// `total_out / total_in`, 0.0 before any input was released.
    pub fn compression_ratio(&self) -> f64 {
        ratio(self.total_out(), self.total_in())
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn backpressure_limit(&self) -> usize {
        self.limit
    }

    /// Blocks dispatched but not yet released.
    pub fn in_flight(&self) -> u64 {
        self.dispatched - self.sequencer.next_expected()
    }

    pub fn get_ref(&self) -> Option<&W> {
        self.sink.as_ref()
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        TelemetrySnapshot::from(&self.counters, &self.timer)
    }

    // ---- internals ----

    fn write_inner(&mut self, data: &[u8]) -> Result<(), EngineError> {
        self.ensure_healthy()?;
        if self.state != EngineState::Open {
            return Err(EngineError::State(format!("write in state {:?}", self.state)));
        }

        // One block-sized slice at a time keeps at most one new block alive
        // per backpressure check.
        for chunk in data.chunks(self.splitter.block_size()) {
            let splitter = &mut self.splitter;
            let blocks = self.timer.time(Stage::Split, || splitter.accept(chunk));
            for block in blocks {
                self.wait_for_capacity(None)?;
                self.dispatch(block)?;
            }
        }
        self.drain_ready()
    }

    fn flush_inner(&mut self) -> Result<(), EngineError> {
        self.ensure_healthy()?;
        if self.state == EngineState::Closed {
            return Err(EngineError::State("flush after close".into()));
        }
        self.drain_ready()?;
        self.sink_mut()?.flush()?;
        Ok(())
    }

    fn finish_inner(&mut self, timeout: Option<Duration>) -> Result<(), EngineError> {
        match self.state {
            EngineState::Finished => return Ok(()),
            EngineState::Closed => return Err(EngineError::State("finish after close".into())),
            EngineState::Open => {
                self.state = EngineState::Finishing;
                debug!(dispatched = self.dispatched, "[ENGINE] finishing");
            }
            EngineState::Finishing => {}
        }
        self.ensure_healthy()?;

        let deadline = timeout.and_then(|d| Instant::now().checked_add(d));

        if !self.splitter.is_final_emitted() {
            // Take the capacity first so a timeout never strands the tail.
            self.wait_for_capacity(deadline)?;
            if let Some(block) = self.splitter.flush_partial() {
                self.dispatch(block)?;
            }
        }

        while !self.sequencer.final_released() {
            self.receive_one(deadline)?;
        }

        let trailer = self.factory.stream_trailer(self.sequencer.totals());
        self.write_framing(&trailer)?;
        let start = Instant::now();
        self.sink_mut()?.flush()?;
        self.timer.add_stage_time(Stage::Finish, start.elapsed());
        self.timer.finish();

        self.state = EngineState::Finished;
        debug!(
            total_in = self.total_in(),
            total_out = self.total_out(),
            blocks = self.dispatched,
            "[ENGINE] finished"
        );
        Ok(())
    }

    /// Block until another block fits under the limit.
    fn wait_for_capacity(&mut self, deadline: Option<Instant>) -> Result<(), EngineError> {
        if self.in_flight() < self.limit as u64 {
            return Ok(());
        }
        self.counters.add_backpressure_wait();
        trace!(in_flight = self.in_flight(), limit = self.limit, "[ENGINE] backpressure");
        while self.in_flight() >= self.limit as u64 {
            self.receive_one(deadline)?;
        }
        Ok(())
    }

    fn dispatch(&mut self, block: RawBlock) -> Result<(), EngineError> {
        let sequence = block.sequence;
        let compressor = self
            .factory
            .new_compressor()
            .map_err(|source| EngineError::Compression { sequence, source })?;

        let task = CompressionTask::new(block, compressor);
        let tx = self.results_tx.clone();
        let job: Job = Box::new(move || {
            // Receiver gone means the engine was dropped; discard.
            let _ = tx.send(task.run());
        });

        let executor = self.pool.executor();
        self.timer.time(Stage::Dispatch, || executor.execute(job))?;

        self.dispatched += 1;
        self.counters.add_dispatch(self.in_flight() as usize);
        trace!(sequence, in_flight = self.in_flight(), "[ENGINE] dispatched");
        Ok(())
    }

    /// Wait for one result and hand it to the sequencer.
    fn receive_one(&mut self, deadline: Option<Instant>) -> Result<(), EngineError> {
        let start = Instant::now();
        let received = match deadline {
            None => self.results_rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            Some(deadline) => self.results_rx.recv_deadline(deadline),
        };
        self.timer.add_stage_time(Stage::Wait, start.elapsed());

        match received {
            Ok(result) => self.accept_result(result),
            Err(RecvTimeoutError::Timeout) => Err(EngineError::Timeout { pending: self.in_flight() }),
            Err(RecvTimeoutError::Disconnected) => Err(EngineError::State("result channel closed".into())),
        }
    }

    /// Release whatever has completed, without blocking.
    fn drain_ready(&mut self) -> Result<(), EngineError> {
        while let Ok(result) = self.results_rx.try_recv() {
            self.accept_result(result)?;
        }
        Ok(())
    }

    fn accept_result(&mut self, result: TaskResult) -> Result<(), EngineError> {
        let start = Instant::now();
        let sink = self
            .sink
            .as_mut()
            .ok_or_else(|| EngineError::State("sink already released".into()))?;
        let released = self.sequencer.submit(result, sink, &mut self.counters);
        self.timer.add_stage_time(Stage::Write, start.elapsed());
        released.map(|_| ())
    }

    fn write_framing(&mut self, bytes: &[u8]) -> Result<(), EngineError> {
        let start = Instant::now();
        let sink = self
            .sink
            .as_mut()
            .ok_or_else(|| EngineError::State("sink already released".into()))?;
        self.sequencer.write_framing(bytes, sink, &mut self.counters)?;
        self.timer.add_stage_time(Stage::Write, start.elapsed());
        Ok(())
    }

    fn sink_mut(&mut self) -> Result<&mut W, EngineError> {
        self.sink
            .as_mut()
            .ok_or_else(|| EngineError::State("sink already released".into()))
    }

    fn ensure_healthy(&self) -> Result<(), EngineError> {
        match &self.fault {
            Some(err) => Err(EngineError::Faulted(err.to_string())),
            None => Ok(()),
        }
    }

    /// Remember terminal errors so later calls fail fast.
    fn record(&mut self, err: EngineError) -> EngineError {
        let terminal = matches!(
            err,
            EngineError::Compression { .. } | EngineError::Sink(_) | EngineError::Pool(_)
        );
        if terminal && self.fault.is_none() {
            warn!(error = %err, "[ENGINE] terminal error");
            self.fault = Some(err.replay());
        }
        err
    }
}
