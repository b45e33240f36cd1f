//! stream/parallelism.rs
//! Worker pools that run compression tasks, plus in-flight sizing.
//!
//! - `Executor` is the "submit a job" contract the engine depends on.
//! - `WorkerPool` is the stock implementation: N named threads pulling jobs
//!   from one crossbeam queue. Queued jobs run in no particular order.
//! - `WorkerPool::shared()` is the lazily created process-wide pool; engines
//!   borrow it and never shut it down unless told to.

use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{unbounded, Receiver, Sender};
use thiserror::Error;
use tracing::{debug, warn};

use crate::constants::{DEFAULT_INFLIGHT_PER_WORKER, WORKER_NAME_PREFIX};

/// Unit of work accepted by an executor.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker pool is shut down")]
    Shutdown,

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("worker pool lock poisoned")]
    Poisoned,
}

/// Anything that can run jobs asynchronously on other threads.
pub trait Executor: Send + Sync {
    /// Queue `job`; it runs at some later point on a pool thread.
    fn execute(&self, job: Job) -> Result<(), PoolError>;

    /// Number of jobs that can run concurrently.
    fn parallelism(&self) -> usize;

    /// Stop accepting jobs, let queued jobs drain and release the threads.
    fn shutdown(&self) -> Result<(), PoolError>;

    fn is_shutdown(&self) -> bool;
}

/// Serial shared by every pool in the process, so worker names stay unique.
static WORKER_SERIAL: AtomicUsize = AtomicUsize::new(0);

static SHARED_POOL: OnceLock<Arc<WorkerPool>> = OnceLock::new();

pub struct WorkerPool {
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl WorkerPool {
    /// Spawn a pool with `size` workers (at least one).
    pub fn new(size: usize) -> Result<Self, PoolError> {
        let size = size.max(1);
        let (tx, rx) = unbounded::<Job>();

        let mut workers = Vec::with_capacity(size);
        for _ in 0..size {
            let serial = WORKER_SERIAL.fetch_add(1, Ordering::Relaxed);
            let rx = rx.clone();
            let handle = thread::Builder::new()
                .name(format!("{WORKER_NAME_PREFIX}{serial}"))
                .spawn(move || run_worker(rx))
                .map_err(PoolError::Spawn)?;
            workers.push(handle);
        }
        debug!(size, "[POOL] spawned workers");

        Ok(Self {
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            size,
        })
    }

    /// Pool sized to the available hardware parallelism.
    pub fn with_default_size() -> Result<Self, PoolError> {
        Self::new(num_cpus::get())
    }

    /// The process-wide pool, created on first use.
    pub fn shared() -> Result<Arc<WorkerPool>, PoolError> {
        if let Some(pool) = SHARED_POOL.get() {
            return Ok(pool.clone());
        }
        let pool = Arc::new(Self::with_default_size()?);
        // A racing initialiser may win; the losing pool is dropped and its
        // workers exit once their queue closes.
        Ok(SHARED_POOL.get_or_init(|| pool).clone())
    }
}

fn run_worker(rx: Receiver<Job>) {
    while let Ok(job) = rx.recv() {
        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            warn!(worker = ?thread::current().name(), "[POOL] job panicked");
        }
    }
}

impl Executor for WorkerPool {
    fn execute(&self, job: Job) -> Result<(), PoolError> {
        let guard = self.sender.lock().map_err(|_| PoolError::Poisoned)?;
        match guard.as_ref() {
            Some(tx) => tx.send(job).map_err(|_| PoolError::Shutdown),
            None => Err(PoolError::Shutdown),
        }
    }

    fn parallelism(&self) -> usize {
        self.size
    }

    fn shutdown(&self) -> Result<(), PoolError> {
        // Closing the queue lets workers drain what is left and exit.
        let sender = self.sender.lock().map_err(|_| PoolError::Poisoned)?.take();
        if sender.is_none() {
            return Ok(());
        }
        drop(sender);

        let handles: Vec<JoinHandle<()>> = {
            let mut guard = self.workers.lock().map_err(|_| PoolError::Poisoned)?;
            guard.drain(..).collect()
        };
        let me = thread::current().id();
        for handle in handles {
            // Never join ourselves.
            if handle.thread().id() == me {
                continue;
            }
            if handle.join().is_err() {
                warn!("[POOL] worker exited with a panic");
            }
        }
        debug!(size = self.size, "[POOL] shut down");
        Ok(())
    }

    fn is_shutdown(&self) -> bool {
        self.sender.lock().map(|g| g.is_none()).unwrap_or(true)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Detach: close the queue, do not wait for the workers.
        if let Ok(mut guard) = self.sender.lock() {
            guard.take();
        }
    }
}

/// Who is responsible for shutting a pool down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolOwnership {
    /// Process-wide pool; outlives every engine.
    Shared,
    /// Caller-supplied pool; the engine using it may shut it down on close.
    Dedicated,
}

/// An executor plus its ownership, as handed to an engine.
#[derive(Clone)]
pub struct PoolHandle {
    executor: Arc<dyn Executor>,
    ownership: PoolOwnership,
}

impl PoolHandle {
    pub fn shared() -> Result<Self, PoolError> {
        let pool: Arc<dyn Executor> = WorkerPool::shared()?;
        Ok(Self { executor: pool, ownership: PoolOwnership::Shared })
    }

    pub fn dedicated(executor: Arc<dyn Executor>) -> Self {
        Self { executor, ownership: PoolOwnership::Dedicated }
    }

    /// A fresh dedicated `WorkerPool` with `workers` threads.
    pub fn with_workers(workers: usize) -> Result<Self, PoolError> {
        Ok(Self::dedicated(Arc::new(WorkerPool::new(workers)?)))
    }

    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    pub fn ownership(&self) -> PoolOwnership {
        self.ownership
    }

    pub fn is_dedicated(&self) -> bool {
        self.ownership == PoolOwnership::Dedicated
    }
}

impl std::fmt::Debug for PoolHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolHandle")
            .field("ownership", &self.ownership)
            .field("parallelism", &self.executor.parallelism())
            .finish()
    }
}

/// In-flight sizing for one engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParallelismProfile {
    pub worker_count: usize,
    pub inflight_blocks: usize,
}

impl ParallelismProfile {
    /// Allow `DEFAULT_INFLIGHT_PER_WORKER` blocks per worker, capped by
    /// `hard_cap` and by what `mem_fraction` of available memory can hold.
    pub fn dynamic(block_size: usize, worker_count: usize, mem_fraction: f64, hard_cap: usize) -> Self {
        let mut sys = sysinfo::System::new();
        sys.refresh_memory();
        let avail_bytes = sys.available_memory();

        let wanted = worker_count.max(1) * DEFAULT_INFLIGHT_PER_WORKER;
        let mut inflight = wanted.min(hard_cap.max(1));

        // 0 means the platform did not report memory; skip the memory cap.
        if avail_bytes > 0 {
            let budget = (avail_bytes as f64 * mem_fraction) as u64;
            let by_memory = (budget / block_size.max(1) as u64).max(1);
            inflight = inflight.min(by_memory.min(usize::MAX as u64) as usize);
        }

        debug!(worker_count, inflight, avail_bytes, "[PROFILE] derived in-flight limit");

        Self {
            worker_count,
            inflight_blocks: inflight.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::bounded;
    use std::time::Duration;

    #[test]
    fn runs_jobs_on_named_workers() {
        let pool = WorkerPool::new(2).unwrap();
        let (tx, rx) = bounded(1);
        pool.execute(Box::new(move || {
            let name = thread::current().name().map(str::to_owned);
            tx.send(name).unwrap();
        }))
        .unwrap();

        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        assert!(name.starts_with(WORKER_NAME_PREFIX));
    }

    #[test]
    fn execute_after_shutdown_fails() {
        let pool = WorkerPool::new(1).unwrap();
        pool.shutdown().unwrap();
        assert!(pool.is_shutdown());
        assert!(matches!(pool.execute(Box::new(|| {})), Err(PoolError::Shutdown)));
        // second shutdown is a no-op
        pool.shutdown().unwrap();
    }

    #[test]
    fn panicking_job_does_not_kill_worker() {
        let pool = WorkerPool::new(1).unwrap();
        pool.execute(Box::new(|| panic!("boom"))).unwrap();
        let (tx, rx) = bounded(1);
        pool.execute(Box::new(move || tx.send(7).unwrap())).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 7);
    }

    #[test]
    fn dynamic_profile_is_at_least_one() {
        let p = ParallelismProfile::dynamic(1 << 17, 0, 0.25, 0);
        assert!(p.inflight_blocks >= 1);
    }
}
