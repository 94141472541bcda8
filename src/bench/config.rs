//! Configuration structs for benchmarking.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::transport::TransportKind;

/// Operands are drawn from `0..MAX_OPERAND`
pub const MAX_OPERAND: i32 = 1000;

impl TransportKind {
    /// Request count used when none is given
    pub fn default_requests(&self) -> u64 {
        match self {
            TransportKind::Rest => 100,
            TransportKind::NetRpc => 10_000,
            TransportKind::Grpc => 10,
        }
    }
}

/// Configuration for the mock add server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockServerConfig {
    /// Port to listen on (0 for random)
    pub port: u16,
    /// Simulated latency per call in milliseconds
    pub latency_ms: u64,
    /// Fraction of calls answered with an error (0.0 to 1.0)
    pub error_rate: f64,
    /// Fraction of calls answered with `a + b + 1` (0.0 to 1.0)
    pub wrong_result_rate: f64,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            port: 0,
            latency_ms: 0,
            error_rate: 0.0,
            wrong_result_rate: 0.0,
        }
    }
}

/// CPU profile settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Directory the profile file is written to
    pub dir: PathBuf,
    /// Sampling frequency in Hz
    pub frequency: i32,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            frequency: 100,
        }
    }
}

/// Configuration for a benchmark run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Transport under test
    pub transport: TransportKind,
    /// Human-readable target (URL or address)
    pub target: String,
    /// Exact number of timed requests
    pub total_requests: u64,
    /// Concurrent workers sharing the transport
    pub workers: usize,
    /// Issue the untimed warmup call
    pub warmup: bool,
    /// CPU profiling, disabled when `None`
    pub profile: Option<ProfileConfig>,
}

impl RunConfig {
    pub fn new(transport: TransportKind, target: impl Into<String>) -> Self {
        Self {
            transport,
            target: target.into(),
            total_requests: transport.default_requests(),
            workers: default_workers(),
            warmup: true,
            profile: Some(ProfileConfig::default()),
        }
    }

    /// Workers actually spawned: never more than there are requests
    pub fn effective_workers(&self) -> usize {
        let requests = usize::try_from(self.total_requests).unwrap_or(usize::MAX);
        self.workers.min(requests).max(1)
    }

    /// `cpu_profile_<transport>_<requests>.prof` inside the profile directory
    pub fn profile_path(&self) -> Option<PathBuf> {
        self.profile.as_ref().map(|profile| {
            profile.dir.join(format!(
                "cpu_profile_{}_{}.prof",
                self.transport, self.total_requests
            ))
        })
    }
}

/// One worker per available core
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
