// core/tests/test_pipeline.rs
//
// Pipeline properties under concurrency:
// * output is byte-identical to a single-worker run, whatever the timing
// * in-flight blocks never exceed the backpressure limit
// * round trip for arbitrary inputs, block sizes and worker counts

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use flate2::read::GzDecoder;
    use pargz_core::compression::GzipFactory;
    use pargz_core::stream::{BlockEngine, Executor, Job, PoolError, PoolHandle, StreamConfig, WorkerPool};
    use proptest::prelude::*;
    use rand::Rng;

    // ------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------

    /// Sleeps a random 0..max_ms before each job.
    struct JitterExecutor {
        inner: WorkerPool,
        max_ms: u64,
    }

    impl Executor for JitterExecutor {
        fn execute(&self, job: Job) -> Result<(), PoolError> {
            let delay = rand::thread_rng().gen_range(0..=self.max_ms);
            self.inner.execute(Box::new(move || {
                thread::sleep(Duration::from_millis(delay));
                job();
            }))
        }

        fn parallelism(&self) -> usize {
            self.inner.parallelism()
        }

        fn shutdown(&self) -> Result<(), PoolError> {
            self.inner.shutdown()
        }

        fn is_shutdown(&self) -> bool {
            self.inner.is_shutdown()
        }
    }

    fn jitter_pool(workers: usize, max_ms: u64) -> PoolHandle {
        PoolHandle::dedicated(Arc::new(JitterExecutor { inner: WorkerPool::new(workers).unwrap(), max_ms }))
    }

    fn compress_with(data: &[u8], pool: PoolHandle, cfg: &StreamConfig) -> (Vec<u8>, u64) {
        let mut engine = BlockEngine::from_parts(Vec::new(), Arc::new(GzipFactory::default()), pool, cfg).unwrap();
        for chunk in data.chunks(1000) {
            engine.write(chunk).unwrap();
        }
        engine.finish().unwrap();
        let max_in_flight = engine.telemetry().max_in_flight;
        (engine.into_inner().unwrap(), max_in_flight)
    }

    fn gunzip(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        GzDecoder::new(data).read_to_end(&mut out).expect("valid gzip");
        out
    }

    fn sample(len: usize) -> Vec<u8> {
        let mut rng = rand::thread_rng();
        (0..len).map(|i| if i % 7 == 0 { rng.gen() } else { (i % 17) as u8 }).collect()
    }

    // ------------------------------------------------------------
    // Determinism
    // ------------------------------------------------------------
    #[test]
    fn output_is_identical_under_random_delays() {
        let data = sample(40_000);
        let cfg = StreamConfig::default().with_block_size(512).with_backpressure_limit(16);

        let (serial, _) = compress_with(&data, PoolHandle::with_workers(1).unwrap(), &cfg);
        for _ in 0..3 {
            let (parallel, _) = compress_with(&data, jitter_pool(4, 3), &cfg);
            assert_eq!(parallel, serial);
        }
        assert_eq!(gunzip(&serial), data);
    }

    // ------------------------------------------------------------
    // Backpressure
    // ------------------------------------------------------------
    #[test]
    fn in_flight_never_exceeds_limit() {
        let data = sample(64 * 256);
        for limit in [1usize, 2, 5] {
            let cfg = StreamConfig::default().with_block_size(256).with_backpressure_limit(limit);
            let mut engine =
                BlockEngine::from_parts(Vec::new(), Arc::new(GzipFactory::default()), jitter_pool(4, 2), &cfg)
                    .unwrap();
            engine.write(&data).unwrap();
            assert!(engine.in_flight() <= limit as u64);
            engine.finish().unwrap();

            let snapshot = engine.telemetry();
            assert!(snapshot.max_in_flight <= limit as u64, "limit {limit}: {}", snapshot.max_in_flight);
            assert!(snapshot.max_pending <= limit as u64);
            assert!(snapshot.backpressure_waits > 0);
            assert_eq!(gunzip(&engine.into_inner().unwrap()), data);
        }
    }

    #[test]
    fn default_limit_is_at_least_one() {
        let cfg = StreamConfig::default().with_block_size(1024).with_workers(2);
        let engine = BlockEngine::with_config(Vec::new(), &cfg).unwrap();
        assert!(engine.backpressure_limit() >= 1);
        assert!(engine.backpressure_limit() <= 4);
    }

    // ------------------------------------------------------------
    // Round trip property
    // ------------------------------------------------------------
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn round_trip_any_input(
            data in proptest::collection::vec(any::<u8>(), 0..4000),
            block_size in 16usize..700,
            workers in 1usize..5,
            limit in 1usize..9,
        ) {
            let cfg = StreamConfig::default().with_block_size(block_size).with_backpressure_limit(limit);
            let (out, max_in_flight) = compress_with(&data, PoolHandle::with_workers(workers).unwrap(), &cfg);
            prop_assert_eq!(gunzip(&out), data);
            prop_assert!(max_in_flight <= limit as u64);
        }
    }
}
