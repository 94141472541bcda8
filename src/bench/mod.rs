//! Benchmark module for the add service.
//!
//! This module provides:
//! - Benchmark runner with a fixed request count and shared-counter workers
//! - HdrHistogram-based metrics collection
//! - CPU profiling of the timed region
//! - Report generation
//! - Mock REST and RPC add servers for standalone runs

pub mod config;
pub mod metrics;
pub mod mock_server;
pub mod profiler;
pub mod report;
pub mod runner;

pub use config::{MockServerConfig, ProfileConfig, RunConfig};
pub use metrics::{MetricsCollector, MetricsSnapshot};
pub use mock_server::{MockRestServer, MockRpcServer};
pub use profiler::CpuProfiler;
pub use report::BenchmarkReport;
pub use runner::{BenchmarkRunner, RequestCounter};
