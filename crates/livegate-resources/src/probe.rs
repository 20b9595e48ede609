//! Host probes: raw CPU tick counters and memory totals.
//!
//! [`ProcfsProbe`] reads `/proc/stat` and `/proc/meminfo`. Other
//! platforms surface [`ProbeError`]s, which the sampler absorbs by
//! serving its last known-good values.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type alias for probe reads.
pub type ProbeResult<T> = Result<T, ProbeError>;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
}

/// Cumulative CPU tick counters since boot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTicks {
    pub total: u64,
    pub idle: u64,
}

impl CpuTicks {
    /// Busy percentage between `prev` and `self`.
    ///
    /// `None` when no ticks elapsed (or counters went backwards).
    pub fn busy_percent_since(&self, prev: &CpuTicks) -> Option<f64> {
        let total = self.total.checked_sub(prev.total)?;
        if total == 0 {
            return None;
        }
        let idle = self.idle.saturating_sub(prev.idle).min(total);
        let busy = (total - idle) as f64 / total as f64 * 100.0;
        Some(busy.clamp(0.0, 100.0))
    }
}

/// Physical memory totals in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryInfo {
    pub total_bytes: u64,
    pub available_bytes: u64,
}

impl MemoryInfo {
    pub fn used_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.available_bytes)
    }

    /// `(total - available) / total` as a percentage; `None` when total is zero.
    pub fn used_percent(&self) -> Option<f64> {
        if self.total_bytes == 0 {
            return None;
        }
        Some((self.used_bytes() as f64 / self.total_bytes as f64 * 100.0).clamp(0.0, 100.0))
    }
}

/// Source of host CPU and memory readings.
pub trait HostProbe: Send + Sync {
    fn cpu_ticks(&self) -> ProbeResult<CpuTicks>;

    fn memory(&self) -> ProbeResult<MemoryInfo>;

    /// One-line description of the host, for logs.
    fn describe(&self) -> String {
        "host info unavailable".to_string()
    }
}

/// Reads the Linux procfs.
#[derive(Debug, Clone)]
pub struct ProcfsProbe {
    root: PathBuf,
}

impl ProcfsProbe {
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    /// Probe a procfs mounted elsewhere (containers, fixtures).
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read(&self, name: &str) -> ProbeResult<(PathBuf, String)> {
        let path = self.root.join(name);
        let content = std::fs::read_to_string(&path).map_err(|source| ProbeError::Io {
            path: path.clone(),
            source,
        })?;
        Ok((path, content))
    }
}

impl Default for ProcfsProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HostProbe for ProcfsProbe {
    fn cpu_ticks(&self) -> ProbeResult<CpuTicks> {
        let (path, content) = self.read("stat")?;
        parse_cpu_ticks(&content).ok_or_else(|| parse_error(&path, "no aggregate cpu line"))
    }

    fn memory(&self) -> ProbeResult<MemoryInfo> {
        let (path, content) = self.read("meminfo")?;
        parse_meminfo(&content).ok_or_else(|| parse_error(&path, "MemTotal missing"))
    }

    fn describe(&self) -> String {
        let cpu = self
            .read("cpuinfo")
            .ok()
            .and_then(|(_, c)| parse_cpu_model(&c))
            .unwrap_or_else(|| "unknown".to_string());
        let mem_mb = self
            .memory()
            .map(|m| m.total_bytes / (1024 * 1024))
            .unwrap_or(0);
        format!(
            "OS: {} {}, CPU: {}, Memory: {} MB",
            std::env::consts::OS,
            std::env::consts::ARCH,
            cpu,
            mem_mb
        )
    }
}

fn parse_error(path: &Path, reason: &str) -> ProbeError {
    ProbeError::Parse {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Parse the aggregate `cpu` line of `/proc/stat`.
///
/// Format: `cpu  user nice system idle iowait irq softirq steal guest guest_nice`.
/// Guest time is already included in user time, so only the first eight
/// fields count toward the total. Only the `idle` column counts as idle.
fn parse_cpu_ticks(content: &str) -> Option<CpuTicks> {
    let line = content
        .lines()
        .find(|l| l.split_whitespace().next() == Some("cpu"))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .take(8)
        .map(|f| f.parse().ok())
        .collect::<Option<_>>()?;
    if fields.len() < 4 {
        return None;
    }
    Some(CpuTicks {
        total: fields.iter().sum(),
        idle: fields[3],
    })
}

/// Parse `MemTotal` and `MemAvailable` from `/proc/meminfo`.
///
/// Kernels without `MemAvailable` fall back to `MemFree + Buffers + Cached`.
fn parse_meminfo(content: &str) -> Option<MemoryInfo> {
    let mut total = None;
    let mut available = None;
    let mut free_estimate = 0u64;

    for line in content.lines() {
        let mut parts = line.split_whitespace();
        let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
            continue;
        };
        let Ok(kb) = value.parse::<u64>() else {
            continue;
        };
        let bytes = kb.saturating_mul(1024);
        match key {
            "MemTotal:" => total = Some(bytes),
            "MemAvailable:" => available = Some(bytes),
            "MemFree:" | "Buffers:" | "Cached:" => free_estimate = free_estimate.saturating_add(bytes),
            _ => {}
        }
    }

    let total_bytes = total?;
    Some(MemoryInfo {
        total_bytes,
        available_bytes: available.unwrap_or(free_estimate).min(total_bytes),
    })
}

fn parse_cpu_model(content: &str) -> Option<String> {
    content
        .lines()
        .find(|l| l.starts_with("model name"))
        .and_then(|l| l.split_once(':'))
        .map(|(_, v)| v.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT: &str = "cpu  4705 356 584 3699176 23060 0 277 0 0 0\n\
                        cpu0 1393 280 290 925014 9140 0 143 0 0 0\n\
                        intr 114930548 113199788 3 0 5 263 0 4\n";

    const MEMINFO: &str = "MemTotal:       16384000 kB\n\
                           MemFree:         1000000 kB\n\
                           MemAvailable:    8192000 kB\n\
                           Buffers:          200000 kB\n\
                           Cached:          3000000 kB\n";

    #[test]
    fn parse_aggregate_cpu_line() {
        let ticks = parse_cpu_ticks(STAT).unwrap();
        assert_eq!(ticks.idle, 3_699_176);
        assert_eq!(ticks.total, 4705 + 356 + 584 + 3_699_176 + 23_060 + 277);
    }

    #[test]
    fn parse_cpu_rejects_garbage() {
        assert_eq!(parse_cpu_ticks("cpu a b c d\n"), None);
        assert_eq!(parse_cpu_ticks("intr 1 2 3\n"), None);
    }

    #[test]
    fn parse_meminfo_prefers_available() {
        let mem = parse_meminfo(MEMINFO).unwrap();
        assert_eq!(mem.total_bytes, 16_384_000 * 1024);
        assert_eq!(mem.available_bytes, 8_192_000 * 1024);
        assert_eq!(mem.used_percent(), Some(50.0));
    }

    #[test]
    fn parse_meminfo_falls_back_without_available() {
        let content = "MemTotal: 1000 kB\nMemFree: 100 kB\nBuffers: 50 kB\nCached: 250 kB\n";
        let mem = parse_meminfo(content).unwrap();
        assert_eq!(mem.available_bytes, 400 * 1024);
    }

    #[test]
    fn busy_percent_from_deltas() {
        let prev = CpuTicks { total: 1000, idle: 800 };
        let next = CpuTicks { total: 1200, idle: 850 };
        // 200 ticks elapsed, 50 idle → 75% busy.
        assert_eq!(next.busy_percent_since(&prev), Some(75.0));
        assert_eq!(prev.busy_percent_since(&prev), None);
        assert_eq!(prev.busy_percent_since(&next), None);
    }

    #[test]
    fn busy_percent_is_clamped() {
        // Idle advanced more than total: measurement noise.
        let prev = CpuTicks { total: 100, idle: 10 };
        let next = CpuTicks { total: 110, idle: 40 };
        assert_eq!(next.busy_percent_since(&prev), Some(0.0));
    }

    #[test]
    fn procfs_probe_reads_fixture_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("stat"), STAT).unwrap();
        std::fs::write(dir.path().join("meminfo"), MEMINFO).unwrap();
        std::fs::write(dir.path().join("cpuinfo"), "model name\t: Test CPU @ 3.0GHz\n").unwrap();

        let probe = ProcfsProbe::with_root(dir.path());
        assert_eq!(probe.cpu_ticks().unwrap().idle, 3_699_176);
        assert_eq!(probe.memory().unwrap().total_bytes, 16_384_000 * 1024);
        let desc = probe.describe();
        assert!(desc.contains("Test CPU @ 3.0GHz"), "{desc}");
        assert!(desc.contains("16000 MB"), "{desc}");
    }

    #[test]
    fn procfs_probe_missing_root_errors() {
        let probe = ProcfsProbe::with_root("/nonexistent/procfs");
        assert!(matches!(probe.cpu_ticks(), Err(ProbeError::Io { .. })));
        assert!(matches!(probe.memory(), Err(ProbeError::Io { .. })));
    }
}
