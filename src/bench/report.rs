//! Report generation for benchmark results.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::config::RunConfig;
use super::metrics::MetricsSnapshot;
use crate::transport::TransportKind;

/// Complete benchmark report for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub run_id: Uuid,
    pub finished_at: DateTime<Utc>,
    pub transport: TransportKind,
    pub target: String,
    pub workers: usize,
    pub total_requests: u64,
    pub successes: u64,
    pub errors: u64,
    pub wrong_results: u64,
    pub success_rate: f64,
    pub elapsed_secs: f64,
    /// Mean latency over the timed region (µs/op)
    pub latency_us: f64,
    /// ops/sec over the timed region
    pub throughput: f64,
    pub latency_p50_ms: f64,
    pub latency_p95_ms: f64,
    pub latency_p99_ms: f64,
    pub avg_cpu: f32,
    pub max_cpu: f32,
    pub avg_memory_mb: f64,
    pub max_memory_mb: f64,
    pub profile_path: Option<PathBuf>,
}

impl BenchmarkReport {
    /// Create a report from a finished run
    pub fn from_snapshot(
        config: &RunConfig,
        snapshot: &MetricsSnapshot,
        profile_path: Option<PathBuf>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            finished_at: Utc::now(),
            transport: config.transport,
            target: config.target.clone(),
            workers: config.effective_workers(),
            total_requests: snapshot.total_requests,
            successes: snapshot.success_count,
            errors: snapshot.error_count,
            wrong_results: snapshot.wrong_result_count,
            success_rate: snapshot.success_rate,
            elapsed_secs: snapshot.elapsed_secs,
            latency_us: snapshot.latency_us,
            throughput: snapshot.requests_per_second,
            latency_p50_ms: snapshot.latency_p50,
            latency_p95_ms: snapshot.latency_p95,
            latency_p99_ms: snapshot.latency_p99,
            avg_cpu: snapshot.avg_cpu,
            max_cpu: snapshot.max_cpu,
            avg_memory_mb: snapshot.avg_memory_mb,
            max_memory_mb: snapshot.max_memory_mb,
            profile_path,
        }
    }

    /// The one-line result summary
    pub fn summary_line(&self) -> String {
        format!(
            "Requests: {} | Latency: {:.2} µs/op | Throughput: {:.2} ops/sec",
            self.total_requests, self.latency_us, self.throughput
        )
    }

    /// Print the summary line and where the profile went
    pub fn print_summary(&self) {
        println!("{}", self.summary_line());
        if let Some(path) = &self.profile_path {
            println!("CPU profile written to: {}", path.display());
        }
    }

    /// Print the full result as an ASCII table
    pub fn print_table(&self) {
        println!();
        println!("╔══════════════════════════════════════════════════════════════════════════════════╗");
        println!("║                            ADD SERVICE BENCHMARK RESULTS                         ║");
        println!("╚══════════════════════════════════════════════════════════════════════════════════╝");
        println!("  Transport: {}   Target: {}   Workers: {}", self.transport, self.target, self.workers);
        println!();
        println!("┌──────────┬──────────┬──────────┬──────────┬──────────┬──────────┬──────────┬──────────┐");
        println!("│ Requests │  µs/op   │  ops/s   │  p50(ms) │  p95(ms) │  p99(ms) │ Success% │ CPU(avg) │");
        println!("├──────────┼──────────┼──────────┼──────────┼──────────┼──────────┼──────────┼──────────┤");
        println!(
            "│ {:>8} │ {:>8.2} │ {:>8.1} │ {:>8.2} │ {:>8.2} │ {:>8.2} │ {:>7.1}% │ {:>6.1}%  │",
            self.total_requests,
            self.latency_us,
            self.throughput,
            self.latency_p50_ms,
            self.latency_p95_ms,
            self.latency_p99_ms,
            self.success_rate,
            self.avg_cpu,
        );
        println!("└──────────┴──────────┴──────────┴──────────┴──────────┴──────────┴──────────┴──────────┘");

        if self.errors > 0 || self.wrong_results > 0 {
            println!(
                "  Errors: {}   Wrong results: {}",
                self.errors, self.wrong_results
            );
        }
        println!(
            "  Memory: {:.0} MB avg / {:.0} MB peak",
            self.avg_memory_mb, self.max_memory_mb
        );
        println!();
        self.print_summary();
    }

    /// Export the report as JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}
