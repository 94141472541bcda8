//! CPU profiling of the timed region, written as a pprof protobuf.

use std::path::{Path, PathBuf};

use pprof::protos::Message;
use pprof::{ProfilerGuard, ProfilerGuardBuilder};

use crate::error::{BenchError, Result};

/// A running CPU profiler bound to its output file
pub struct CpuProfiler {
    guard: ProfilerGuard<'static>,
    path: PathBuf,
}

impl CpuProfiler {
    /// Start sampling at `frequency` Hz. Only one profiler can run per process.
    pub fn start(path: PathBuf, frequency: i32) -> Result<Self> {
        let guard = ProfilerGuardBuilder::default()
            .frequency(frequency)
            .blocklist(&["libc", "libgcc", "pthread", "vdso"])
            .build()
            .map_err(|e| BenchError::Profile(format!("could not start profiling: {:?}", e)))?;

        tracing::debug!("CPU profiler started at {} Hz", frequency);
        Ok(Self { guard, path })
    }

    /// Stop sampling and write the profile. The file only appears once the
    /// whole profile has been written.
    pub fn finish(self) -> Result<PathBuf> {
        let report = self.guard.report().build().map_err(|e| {
            BenchError::Profile(format!("could not build profiling report: {:?}", e))
        })?;
        let profile = report
            .pprof()
            .map_err(|e| BenchError::Profile(format!("could not get pprof profile: {:?}", e)))?;

        let body = profile.encode_to_vec();
        drop(self.guard);

        write_atomically(&self.path, &body)?;
        tracing::debug!(
            "CPU profile ({} bytes) written to {}",
            body.len(),
            self.path.display()
        );
        Ok(self.path)
    }
}

fn write_atomically(path: &Path, body: &[u8]) -> Result<()> {
    let tmp = path.with_extension("prof.tmp");
    std::fs::write(&tmp, body)
        .map_err(|e| BenchError::Profile(format!("could not write {}: {}", tmp.display(), e)))?;
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        BenchError::Profile(format!("could not write {}: {}", path.display(), e))
    })
}
