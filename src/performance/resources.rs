//! Best-effort process resource introspection
//!
//! Memory and CPU figures are only available on some hosts, so sampling
//! returns `Option<ResourceUsage>` and callers must handle absence.

use serde::{Deserialize, Serialize};

/// Resource usage of the current process
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceUsage {
    /// Resident memory in megabytes
    pub memory_mb: f64,
    /// User plus system CPU time consumed so far, in milliseconds
    pub cpu_time_ms: Option<f64>,
}

impl ResourceUsage {
    /// Sample the current process, or `None` when memory cannot be determined
    pub fn sample() -> Option<Self> {
        let memory_bytes = resident_memory_bytes()?;
        Some(Self {
            memory_mb: memory_bytes as f64 / (1024.0 * 1024.0),
            cpu_time_ms: cpu_time_ms(),
        })
    }
}

fn resident_memory_bytes() -> Option<u64> {
    proc_status_rss().or_else(rusage_max_rss)
}

/// Current resident set size from /proc/self/status
#[cfg(target_os = "linux")]
fn proc_status_rss() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    status
        .lines()
        .find(|line| line.starts_with("VmRSS:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb * 1024)
}

#[cfg(not(target_os = "linux"))]
fn proc_status_rss() -> Option<u64> {
    None
}

/// Peak usage from rusage, used when the current RSS is unavailable
#[cfg(unix)]
fn rusage_max_rss() -> Option<u64> {
    let max_rss = rusage()?.ru_maxrss.max(0) as u64;
    // ru_maxrss is in KB on Linux, bytes on macOS
    if cfg!(target_os = "macos") {
        Some(max_rss)
    } else {
        Some(max_rss * 1024)
    }
}

#[cfg(not(unix))]
fn rusage_max_rss() -> Option<u64> {
    None
}

#[cfg(unix)]
fn cpu_time_ms() -> Option<f64> {
    let usage = rusage()?;
    let to_ms = |time: libc::timeval| time.tv_sec as f64 * 1000.0 + time.tv_usec as f64 / 1000.0;
    Some(to_ms(usage.ru_utime) + to_ms(usage.ru_stime))
}

#[cfg(not(unix))]
fn cpu_time_ms() -> Option<f64> {
    None
}

#[cfg(unix)]
fn rusage() -> Option<libc::rusage> {
    // SAFETY: getrusage only writes into the zeroed struct we own
    unsafe {
        let mut usage: libc::rusage = std::mem::zeroed();
        if libc::getrusage(libc::RUSAGE_SELF, &mut usage) == 0 {
            Some(usage)
        } else {
            None
        }
    }
}
