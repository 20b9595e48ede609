//! Throttled host resource sampler.
//!
//! `sample()` performs a real probe at most once per interval and serves
//! the cached snapshot (marked stale) in between. CPU usage is the busy
//! share of ticks accumulated since the previous real sample, so the
//! first sample after construction or reset has no baseline and reports
//! zero unless a warmup is configured.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, warn};

use livegate_core::{ResourceSnapshot, SampleMetric};
use livegate_metrics::{AggregateView, MetricAggregate};

use crate::probe::{CpuTicks, HostProbe};

/// Default throttle interval between real samples.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(5000);

/// Upper bound on the blocking first-sample warmup.
pub const MAX_WARMUP: Duration = Duration::from_secs(1);

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Sampler settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerConfig {
    /// Minimum time between real probes.
    pub interval: Duration,
    /// When non-zero, the first sample takes a second tick reading after
    /// this delay (capped at [`MAX_WARMUP`]) instead of reporting 0% CPU.
    pub first_sample_warmup: Duration,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SAMPLE_INTERVAL,
            first_sample_warmup: Duration::ZERO,
        }
    }
}

/// Running aggregates over every fresh resource measurement.
#[derive(Debug, Clone, Default)]
struct ResourceHistory {
    cpu: MetricAggregate,
    memory: MetricAggregate,
}

/// Point-in-time views of the resource history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ResourceHistoryView {
    pub cpu: AggregateView,
    pub memory: AggregateView,
}

impl ResourceHistoryView {
    /// View for a resource metric; `None` for sample-derived metrics.
    pub fn metric(&self, metric: SampleMetric) -> Option<&AggregateView> {
        match metric {
            SampleMetric::CpuUsage => Some(&self.cpu),
            SampleMetric::MemoryUsage => Some(&self.memory),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct SamplerState {
    last_real: Option<Instant>,
    prev_ticks: Option<CpuTicks>,
    history: ResourceHistory,
}

/// Throttled, failure-tolerant CPU/memory sampler.
pub struct ResourceSampler {
    probe: Arc<dyn HostProbe>,
    config: SamplerConfig,
    state: Mutex<SamplerState>,
    /// Last snapshot handed out; readable while a probe is in flight.
    cached: RwLock<ResourceSnapshot>,
}

impl ResourceSampler {
    pub fn new(probe: Arc<dyn HostProbe>, config: SamplerConfig) -> Self {
        Self {
            probe,
            config,
            state: Mutex::new(SamplerState::default()),
            cached: RwLock::new(ResourceSnapshot::default()),
        }
    }

    pub fn config(&self) -> SamplerConfig {
        self.config
    }

    pub fn describe_host(&self) -> String {
        self.probe.describe()
    }

    /// Current snapshot; probes the host if the interval has elapsed.
    pub fn sample(&self) -> ResourceSnapshot {
        self.sample_at(Instant::now())
    }

    /// [`sample`](Self::sample) against an explicit monotonic clock reading.
    ///
    /// Never blocks on another caller's probe: if one is in flight the
    /// cached snapshot is returned.
    pub fn sample_at(&self, now: Instant) -> ResourceSnapshot {
        let Some(mut state) = self.state.try_lock() else {
            return self.cached.read().stale();
        };

        if let Some(last) = state.last_real {
            if now.saturating_duration_since(last) < self.config.interval {
                return self.cached.read().stale();
            }
        }
        self.take_sample(&mut state, now)
    }

    /// Probe the host regardless of the throttle.
    ///
    /// Used by the periodic task, which owns the sampling cadence. Still
    /// returns the cached snapshot if another probe is in flight.
    pub fn sample_now(&self) -> ResourceSnapshot {
        let Some(mut state) = self.state.try_lock() else {
            return self.cached.read().stale();
        };
        self.take_sample(&mut state, Instant::now())
    }

    fn take_sample(&self, state: &mut SamplerState, now: Instant) -> ResourceSnapshot {
        let previous = *self.cached.read();
        let snapshot = self.measure(state, previous);
        state.last_real = Some(now);
        *self.cached.write() = snapshot;
        snapshot
    }

    /// Last snapshot handed out, without probing.
    pub fn cached(&self) -> ResourceSnapshot {
        self.cached.read().stale()
    }

    /// Point-in-time views of all fresh measurements since the last reset.
    pub fn history(&self) -> ResourceHistoryView {
        let state = self.state.lock();
        ResourceHistoryView {
            cpu: state.history.cpu.view(),
            memory: state.history.memory.view(),
        }
    }

    /// Drop the CPU baseline, throttle clock and history.
    ///
    /// The cached snapshot keeps its timestamp so timestamps never go
    /// backwards across runs.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        *state = SamplerState::default();
        let mut cached = self.cached.write();
        *cached = ResourceSnapshot {
            timestamp_ms: cached.timestamp_ms,
            ..ResourceSnapshot::default()
        };
        info!("resource sampler reset");
    }

    fn measure(&self, state: &mut SamplerState, previous: ResourceSnapshot) -> ResourceSnapshot {
        let mut fresh = false;

        let cpu_percent = match self.cpu_percent(state) {
            CpuReading::Measured(pct) => {
                fresh = true;
                state.history.cpu.record(pct);
                pct
            }
            CpuReading::Baseline => {
                fresh = true;
                0.0
            }
            CpuReading::NoDelta => {
                fresh = true;
                previous.cpu_percent
            }
            CpuReading::Failed => previous.cpu_percent,
        };

        let (memory_percent, used_memory_mb, available_memory_mb) = match self.probe.memory() {
            Ok(mem) => match mem.used_percent() {
                Some(pct) => {
                    fresh = true;
                    state.history.memory.record(pct);
                    (
                        pct,
                        mem.used_bytes() / BYTES_PER_MB,
                        mem.available_bytes / BYTES_PER_MB,
                    )
                }
                None => {
                    warn!("host reported zero total memory");
                    (
                        previous.memory_percent,
                        previous.used_memory_mb,
                        previous.available_memory_mb,
                    )
                }
            },
            Err(e) => {
                warn!(error = %e, "memory probe failed, serving cached values");
                (
                    previous.memory_percent,
                    previous.used_memory_mb,
                    previous.available_memory_mb,
                )
            }
        };

        let snapshot = ResourceSnapshot {
            timestamp_ms: epoch_millis().max(previous.timestamp_ms),
            cpu_percent: cpu_percent.clamp(0.0, 100.0),
            memory_percent,
            used_memory_mb,
            available_memory_mb,
            fresh,
        };
        debug!(
            cpu = snapshot.cpu_percent,
            memory = snapshot.memory_percent,
            fresh,
            "resource sample taken"
        );
        snapshot
    }

    fn cpu_percent(&self, state: &mut SamplerState) -> CpuReading {
        let ticks = match self.probe.cpu_ticks() {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "cpu probe failed, serving cached value");
                return CpuReading::Failed;
            }
        };

        let Some(prev) = state.prev_ticks.replace(ticks) else {
            return self.warmup(state, ticks);
        };

        match ticks.busy_percent_since(&prev) {
            Some(pct) => CpuReading::Measured(pct),
            None => CpuReading::NoDelta,
        }
    }

    /// First sample: either report a zero baseline or block briefly for a
    /// second tick reading.
    fn warmup(&self, state: &mut SamplerState, baseline: CpuTicks) -> CpuReading {
        let delay = self.config.first_sample_warmup.min(MAX_WARMUP);
        if delay.is_zero() {
            return CpuReading::Baseline;
        }
        std::thread::sleep(delay);
        match self.probe.cpu_ticks() {
            Ok(ticks) => {
                state.prev_ticks = Some(ticks);
                ticks
                    .busy_percent_since(&baseline)
                    .map_or(CpuReading::Baseline, CpuReading::Measured)
            }
            Err(e) => {
                warn!(error = %e, "cpu warmup probe failed");
                CpuReading::Baseline
            }
        }
    }
}

impl std::fmt::Debug for ResourceSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceSampler")
            .field("config", &self.config)
            .field("cached", &*self.cached.read())
            .finish()
    }
}

enum CpuReading {
    /// Busy percent from a tick delta.
    Measured(f64),
    /// No previous reading to diff against.
    Baseline,
    /// No ticks elapsed since the previous reading.
    NoDelta,
    /// The probe failed.
    Failed,
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
