//! Metrics collection using HdrHistogram for accurate percentile calculations.

use hdrhistogram::Histogram;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use sysinfo::System;

/// Thread-safe metrics collector for benchmark results
pub struct MetricsCollector {
    /// Histogram for per-call latency (microseconds)
    latency_histogram: Mutex<Histogram<u64>>,
    /// Calls answered correctly (or not checked)
    success_count: AtomicU64,
    /// Calls that failed outright
    error_count: AtomicU64,
    /// Calls answered with the wrong sum
    wrong_result_count: AtomicU64,
    /// Start of the timed region
    start_time: Mutex<Option<Instant>>,
    /// End of the timed region
    end_time: Mutex<Option<Instant>>,
    /// CPU and memory samples taken during the run
    resources: Mutex<ResourceSamples>,
}

#[derive(Default)]
struct ResourceSamples {
    cpu: Vec<f32>,
    memory_mb: Vec<f64>,
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            // Latencies up to 10 minutes with 3 significant figures
            latency_histogram: Mutex::new(
                Histogram::new_with_bounds(1, 600_000_000, 3)
                    .expect("static histogram bounds are valid"),
            ),
            success_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            wrong_result_count: AtomicU64::new(0),
            start_time: Mutex::new(None),
            end_time: Mutex::new(None),
            resources: Mutex::new(ResourceSamples::default()),
        }
    }

    /// Mark the start of the timed region
    pub fn start(&self) {
        if let Ok(mut start) = self.start_time.lock() {
            *start = Some(Instant::now());
        }
    }

    /// Mark the end of the timed region
    pub fn stop(&self) {
        if let Ok(mut end) = self.end_time.lock() {
            *end = Some(Instant::now());
        }
    }

    fn record_latency(&self, latency: Duration) {
        let latency_us = latency.as_micros() as u64;
        if let Ok(mut hist) = self.latency_histogram.lock() {
            let _ = hist.record(latency_us.max(1));
        }
    }

    /// Record a call answered with the expected sum
    pub fn record_success(&self, latency: Duration) {
        self.record_latency(latency);
        self.success_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a call answered with the wrong sum
    pub fn record_wrong_result(&self, latency: Duration) {
        self.record_latency(latency);
        self.wrong_result_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed call
    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Sample system CPU and memory usage
    pub fn sample_resources(&self, sys: &mut System) {
        sys.refresh_cpu_usage();
        sys.refresh_memory();
        let cpu = sys.global_cpu_usage();
        let memory_mb = sys.used_memory() as f64 / (1024.0 * 1024.0);

        if let Ok(mut samples) = self.resources.lock() {
            samples.cpu.push(cpu);
            samples.memory_mb.push(memory_mb);
        }
    }

    pub fn success_count(&self) -> u64 {
        self.success_count.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub fn wrong_result_count(&self) -> u64 {
        self.wrong_result_count.load(Ordering::Relaxed)
    }

    /// Every call issued, whatever its outcome
    pub fn total_requests(&self) -> u64 {
        self.success_count() + self.error_count() + self.wrong_result_count()
    }

    /// Get the success rate as a percentage
    pub fn success_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            return 100.0;
        }
        (self.success_count() as f64 / total as f64) * 100.0
    }

    /// Length of the timed region
    pub fn elapsed(&self) -> Duration {
        let start = self.start_time.lock().ok().and_then(|s| *s);
        let end = self.end_time.lock().ok().and_then(|e| *e);
        match (start, end) {
            (Some(s), Some(e)) => e.duration_since(s),
            (Some(s), None) => s.elapsed(),
            _ => Duration::ZERO,
        }
    }

    /// Get per-call latency percentile in milliseconds
    pub fn latency_percentile(&self, percentile: f64) -> f64 {
        match self.latency_histogram.lock() {
            Ok(hist) => hist.value_at_percentile(percentile) as f64 / 1000.0,
            Err(_) => 0.0,
        }
    }

    /// Create a snapshot of current metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        let total = self.total_requests();
        let elapsed = self.elapsed();
        let (avg_cpu, max_cpu, avg_memory_mb, max_memory_mb) = self.resource_summary();

        MetricsSnapshot {
            total_requests: total,
            success_count: self.success_count(),
            error_count: self.error_count(),
            wrong_result_count: self.wrong_result_count(),
            success_rate: self.success_rate(),
            elapsed_secs: elapsed.as_secs_f64(),
            latency_us: mean_latency_us(elapsed, total),
            requests_per_second: throughput(elapsed, total),
            latency_p50: self.latency_percentile(50.0),
            latency_p95: self.latency_percentile(95.0),
            latency_p99: self.latency_percentile(99.0),
            avg_cpu,
            max_cpu,
            avg_memory_mb,
            max_memory_mb,
        }
    }

    fn resource_summary(&self) -> (f32, f32, f64, f64) {
        let Ok(samples) = self.resources.lock() else {
            return (0.0, 0.0, 0.0, 0.0);
        };
        if samples.cpu.is_empty() {
            return (0.0, 0.0, 0.0, 0.0);
        }

        let avg_cpu = samples.cpu.iter().sum::<f32>() / samples.cpu.len() as f32;
        let max_cpu = samples.cpu.iter().cloned().fold(0.0, f32::max);
        let avg_memory_mb = samples.memory_mb.iter().sum::<f64>() / samples.memory_mb.len() as f64;
        let max_memory_mb = samples.memory_mb.iter().cloned().fold(0.0, f64::max);
        (avg_cpu, max_cpu, avg_memory_mb, max_memory_mb)
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Mean time per request in microseconds over the timed region
pub fn mean_latency_us(elapsed: Duration, total_requests: u64) -> f64 {
    if total_requests == 0 {
        return 0.0;
    }
    elapsed.as_micros() as f64 / total_requests as f64
}

/// Requests per second over the timed region
pub fn throughput(elapsed: Duration, total_requests: u64) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs == 0.0 {
        return 0.0;
    }
    total_requests as f64 / secs
}

/// A snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub wrong_result_count: u64,
    pub success_rate: f64,
    pub elapsed_secs: f64,
    /// Mean latency, elapsed / requests (µs)
    pub latency_us: f64,
    pub requests_per_second: f64,
    /// Per-call percentiles (ms)
    pub latency_p50: f64,
    pub latency_p95: f64,
    pub latency_p99: f64,
    pub avg_cpu: f32,
    pub max_cpu: f32,
    pub avg_memory_mb: f64,
    pub max_memory_mb: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_metrics_collector() {
        let collector = MetricsCollector::new();
        collector.start();

        collector.record_success(Duration::from_millis(100));
        collector.record_success(Duration::from_millis(150));
        collector.record_wrong_result(Duration::from_millis(200));
        collector.record_error();

        collector.stop();

        assert_eq!(collector.success_count(), 2);
        assert_eq!(collector.wrong_result_count(), 1);
        assert_eq!(collector.error_count(), 1);
        assert_eq!(collector.total_requests(), 4);
        assert!((collector.success_rate() - 50.0).abs() < 0.01);
    }

    #[test]
    fn test_percentiles_in_milliseconds() {
        let collector = MetricsCollector::new();
        for ms in 1..=100 {
            collector.record_success(Duration::from_millis(ms));
        }

        let p50 = collector.latency_percentile(50.0);
        let p99 = collector.latency_percentile(99.0);
        assert!((p50 - 50.0).abs() < 1.0, "p50 was {}", p50);
        assert!((p99 - 99.0).abs() < 1.0, "p99 was {}", p99);
    }

    #[test]
    fn test_snapshot_without_timed_region() {
        let snapshot = MetricsCollector::new().snapshot();
        assert_eq!(snapshot.total_requests, 0);
        assert_eq!(snapshot.latency_us, 0.0);
        assert_eq!(snapshot.requests_per_second, 0.0);
        assert_eq!(snapshot.success_rate, 100.0);
    }

    #[test]
    fn test_resource_sampling() {
        let collector = MetricsCollector::new();
        let mut sys = System::new();
        collector.sample_resources(&mut sys);
        collector.sample_resources(&mut sys);

        let snapshot = collector.snapshot();
        assert!(snapshot.max_memory_mb > 0.0);
        assert!(snapshot.max_cpu >= snapshot.avg_cpu);
    }

    #[test]
    fn test_latency_and_throughput_formulas() {
        let elapsed = Duration::from_millis(500);
        assert_eq!(mean_latency_us(elapsed, 10), 50_000.0);
        assert_eq!(throughput(elapsed, 10), 20.0);
    }

    proptest! {
        #[test]
        fn prop_latency_times_requests_is_elapsed(
            micros in 1u64..10_000_000_000,
            requests in 1u64..1_000_000,
        ) {
            let elapsed = Duration::from_micros(micros);
            let latency = mean_latency_us(elapsed, requests);
            let rebuilt = latency * requests as f64;
            prop_assert!((rebuilt - micros as f64).abs() <= micros as f64 * 1e-9 + 1e-6);
        }

        #[test]
        fn prop_throughput_inverse_of_latency(
            micros in 1u64..10_000_000_000,
            requests in 1u64..1_000_000,
        ) {
            let elapsed = Duration::from_micros(micros);
            let product = mean_latency_us(elapsed, requests) * throughput(elapsed, requests);
            // µs/op * ops/s == 1e6
            prop_assert!((product - 1_000_000.0).abs() < 1e-3);
        }
    }
}
