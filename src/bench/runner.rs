//! Benchmark runner: warmup, fixed-count timed loop, profiling and reporting.

use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use sysinfo::System;
use tokio::sync::oneshot;

use super::config::{RunConfig, MAX_OPERAND};
use super::metrics::{MetricsCollector, MetricsSnapshot};
use super::profiler::CpuProfiler;
use super::report::BenchmarkReport;
use crate::error::Result;
use crate::transport::{AddArgs, AddTransport};

/// Hands out sequence numbers `1..=total`, each exactly once, to any number
/// of workers
#[derive(Debug)]
pub struct RequestCounter {
    next: AtomicU64,
    total: u64,
}

impl RequestCounter {
    pub fn new(total: u64) -> Self {
        Self {
            next: AtomicU64::new(0),
            total,
        }
    }

    /// Next sequence number, or `None` once all have been handed out
    pub fn next(&self) -> Option<u64> {
        let seq = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        (seq <= self.total).then_some(seq)
    }
}

/// Random operands in `0..MAX_OPERAND`
pub fn random_args() -> AddArgs {
    let mut rng = rand::thread_rng();
    AddArgs::new(rng.gen_range(0..MAX_OPERAND), rng.gen_range(0..MAX_OPERAND))
}

/// Benchmark runner over a connected transport
pub struct BenchmarkRunner<T> {
    config: RunConfig,
    transport: Arc<T>,
}

impl<T: AddTransport> BenchmarkRunner<T> {
    /// Create a new benchmark runner
    pub fn new(config: RunConfig, transport: T) -> Self {
        Self {
            config,
            transport: Arc::new(transport),
        }
    }

    /// Connect through `connect`, then run. A connect failure aborts before
    /// anything is timed or profiled.
    pub async fn execute<F>(config: RunConfig, connect: F) -> Result<BenchmarkReport>
    where
        F: Future<Output = Result<T>>,
    {
        println!(
            "Running benchmark with {} requests to {}",
            config.total_requests, config.target
        );

        let transport = connect.await?;
        tracing::info!("Connected to {} ({})", config.target, config.transport);

        Self::new(config, transport).run().await
    }

    /// Issue the fixed `(1, 2)` request. Failures are reported but not fatal.
    pub async fn warmup(&self) -> bool {
        match self.transport.add(AddArgs::WARMUP).await {
            Ok(Some(result)) if result != AddArgs::WARMUP.expected() => {
                tracing::warn!(
                    "Warmup returned wrong result: got {}, want {}",
                    result,
                    AddArgs::WARMUP.expected()
                );
                false
            }
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Warmup call failed: {}", e);
                false
            }
        }
    }

    /// Run the whole benchmark and build the report
    pub async fn run(&self) -> Result<BenchmarkReport> {
        if self.config.warmup {
            self.warmup().await;
        }

        let profiler = match (&self.config.profile, self.config.profile_path()) {
            (Some(profile), Some(path)) => Some(CpuProfiler::start(path, profile.frequency)?),
            _ => None,
        };

        let snapshot = self.run_timed().await;

        let profile_path: Option<PathBuf> = match profiler {
            Some(profiler) => Some(profiler.finish()?),
            None => None,
        };

        Ok(BenchmarkReport::from_snapshot(
            &self.config,
            &snapshot,
            profile_path,
        ))
    }

    /// The timed region: exactly `total_requests` calls spread over the workers
    pub async fn run_timed(&self) -> MetricsSnapshot {
        let metrics = Arc::new(MetricsCollector::new());
        let counter = Arc::new(RequestCounter::new(self.config.total_requests));
        let workers = self.config.effective_workers();

        tracing::debug!(
            "Starting {} workers for {} requests",
            workers,
            self.config.total_requests
        );

        let (stop_sampling, sampling_handle) = spawn_resource_sampler(metrics.clone());

        metrics.start();

        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let transport = self.transport.clone();
            let counter = counter.clone();
            let metrics = metrics.clone();
            handles.push(tokio::spawn(async move {
                run_worker(transport.as_ref(), &counter, &metrics).await;
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!("Benchmark worker panicked: {}", e);
            }
        }

        metrics.stop();

        let _ = stop_sampling.send(());
        let _ = sampling_handle.await;

        metrics.snapshot()
    }
}

/// Pull sequence numbers until the counter runs dry
async fn run_worker<T: AddTransport>(
    transport: &T,
    counter: &RequestCounter,
    metrics: &MetricsCollector,
) {
    while let Some(seq) = counter.next() {
        let args = random_args();
        let started = Instant::now();
        let outcome = transport.add(args).await;
        let latency = started.elapsed();

        match outcome {
            Ok(Some(result)) if result != args.expected() => {
                tracing::warn!(
                    "Counter: {} | Args: a={}, b={} | Wrong result: got {}, want {}",
                    seq,
                    args.a,
                    args.b,
                    result,
                    args.expected()
                );
                metrics.record_wrong_result(latency);
            }
            Ok(_) => metrics.record_success(latency),
            Err(e) => {
                tracing::warn!(
                    "Counter: {} | Args: a={}, b={} | Error: {}",
                    seq,
                    args.a,
                    args.b,
                    e
                );
                metrics.record_error();
            }
        }
    }
}

/// Sample CPU and memory every 500ms until told to stop
fn spawn_resource_sampler(
    metrics: Arc<MetricsCollector>,
) -> (oneshot::Sender<()>, tokio::task::JoinHandle<()>) {
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
        let mut sys = System::new();
        let mut interval = tokio::time::interval(Duration::from_millis(500));
        loop {
            tokio::select! {
                _ = interval.tick() => metrics.sample_resources(&mut sys),
                _ = &mut stop_rx => break,
            }
        }
    });

    (stop_tx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BenchError, CallError};
    use crate::transport::TransportKind;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// In-memory transport that records every call
    #[derive(Default)]
    struct RecordingTransport {
        calls: Mutex<Vec<AddArgs>>,
        fail: bool,
        off_by_one: bool,
    }

    impl AddTransport for RecordingTransport {
        async fn add(&self, args: AddArgs) -> std::result::Result<Option<i32>, CallError> {
            self.calls.lock().unwrap().push(args);
            tokio::task::yield_now().await;
            if self.fail {
                return Err(CallError::Grpc(tonic::Status::unauthenticated("expired token")));
            }
            let bump = if self.off_by_one { 1 } else { 0 };
            Ok(Some(args.a + args.b + bump))
        }
    }

    fn config(total_requests: u64, workers: usize) -> RunConfig {
        let mut config = RunConfig::new(TransportKind::NetRpc, "in-memory");
        config.total_requests = total_requests;
        config.workers = workers;
        config.profile = None;
        config
    }

    #[test]
    fn test_random_args_in_range() {
        for _ in 0..10_000 {
            let args = random_args();
            assert!((0..MAX_OPERAND).contains(&args.a));
            assert!((0..MAX_OPERAND).contains(&args.b));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_counter_hands_out_each_value_once() {
        let counter = Arc::new(RequestCounter::new(1000));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(seq) = counter.next() {
                    seen.push(seq);
                    tokio::task::yield_now().await;
                }
                seen
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }

        assert_eq!(all.len(), 1000);
        let unique: HashSet<u64> = all.into_iter().collect();
        assert_eq!(unique, (1..=1000).collect::<HashSet<u64>>());
        assert_eq!(counter.next(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_exactly_n_calls_with_parallel_workers() {
        let runner = BenchmarkRunner::new(config(250, 7), RecordingTransport::default());
        let report = runner.run().await.unwrap();

        // 250 timed calls plus the warmup
        let calls = runner.transport.calls.lock().unwrap();
        assert_eq!(calls.len(), 251);
        assert_eq!(calls[0], AddArgs::WARMUP);
        assert_eq!(report.total_requests, 250);
        assert_eq!(report.successes, 250);
        assert_eq!(report.errors, 0);
        assert!(report.profile_path.is_none());
    }

    #[tokio::test]
    async fn test_no_warmup_skips_fixed_request() {
        let mut config = config(5, 1);
        config.warmup = false;
        let runner = BenchmarkRunner::new(config, RecordingTransport::default());
        runner.run().await.unwrap();

        assert_eq!(runner.transport.calls.lock().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_failures_are_counted_and_run_completes() {
        let transport = RecordingTransport {
            fail: true,
            ..Default::default()
        };
        let runner = BenchmarkRunner::new(config(20, 3), transport);
        let report = runner.run().await.unwrap();

        assert_eq!(report.total_requests, 20);
        assert_eq!(report.errors, 20);
        assert_eq!(report.successes, 0);
    }

    #[tokio::test]
    async fn test_wrong_results_are_counted() {
        let transport = RecordingTransport {
            off_by_one: true,
            ..Default::default()
        };
        let runner = BenchmarkRunner::new(config(12, 2), transport);
        assert!(!runner.warmup().await);

        let snapshot = runner.run_timed().await;
        assert_eq!(snapshot.wrong_result_count, 12);
        assert_eq!(snapshot.total_requests, 12);
    }

    #[tokio::test]
    async fn test_connect_failure_aborts() {
        let connect = async {
            Err::<RecordingTransport, _>(BenchError::connect("localhost:1", "connection refused"))
        };
        let err = BenchmarkRunner::execute(config(10, 1), connect)
            .await
            .unwrap_err();
        assert!(matches!(err, BenchError::Connect { .. }));
    }

    #[tokio::test]
    async fn test_warmup_excluded_from_timed_region() {
        /// Slow only on the warmup request
        struct SlowWarmup;

        impl AddTransport for SlowWarmup {
            async fn add(&self, args: AddArgs) -> std::result::Result<Option<i32>, CallError> {
                if args == AddArgs::WARMUP {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                }
                Ok(Some(args.expected()))
            }
        }

        let mut config = config(4, 1);
        config.warmup = true;
        let report = BenchmarkRunner::new(config, SlowWarmup).run().await.unwrap();

        assert!(report.elapsed_secs < 0.3, "elapsed {}", report.elapsed_secs);
    }
}
