//! Process memory monitor.
//!
//! Samples the resident set once per cycle and keeps the peak. Going over
//! the configured ceiling is advisory only.

use sysinfo::{Pid, System};
use tracing::warn;

const BYTES_PER_MB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemorySample {
    pub current_mb: u64,
    pub peak_mb: u64,
    /// `peak_mb > max_mb`, strictly.
    pub over_threshold: bool,
}

impl MemorySample {
    /// Status line for the memory channel.
    pub fn message(&self) -> String {
        let advisory = if self.over_threshold {
            " (peaked over MAX, restart recommended)"
        } else {
            ""
        };
        format!(
            "\t[TRCM]\tCurrent memory usage: {} MB, peak usage: {} MB{advisory}",
            self.current_mb, self.peak_mb
        )
    }
}

pub struct MemoryMonitor {
    system: System,
    pid: Pid,
    max_mb: u64,
    peak_bytes: u64,
}

impl MemoryMonitor {
    pub fn new(max_mb: u64) -> Self {
        Self {
            system: System::new(),
            pid: Pid::from_u32(std::process::id()),
            max_mb,
            peak_bytes: 0,
        }
    }

    /// Read this process's resident set and fold it into the peak.
    pub fn sample(&mut self) -> MemorySample {
        self.system.refresh_process(self.pid);
        let current = self
            .system
            .process(self.pid)
            .map(|p| p.memory())
            .unwrap_or(0);
        self.record(current)
    }

    /// Fold one reading (bytes) into the peak.
    pub fn record(&mut self, current_bytes: u64) -> MemorySample {
        self.peak_bytes = self.peak_bytes.max(current_bytes);
        let sample = MemorySample {
            current_mb: current_bytes / BYTES_PER_MB,
            peak_mb: self.peak_bytes / BYTES_PER_MB,
            over_threshold: self.peak_bytes / BYTES_PER_MB > self.max_mb,
        };
        if sample.over_threshold {
            warn!(peak_mb = sample.peak_mb, max_mb = self.max_mb, "Memory peaked over maximum");
        }
        sample
    }
}
