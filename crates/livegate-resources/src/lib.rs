//! livegate-resources: host CPU and memory sampling for live runs.
//!
//! On-demand callers get a real probe at most once per interval and cached
//! values in between, so any number of dashboard clients can poll without
//! adding load. The periodic task probes on every tick. CPU usage is
//! computed from tick-counter deltas between consecutive real samples.
//!
//! # Architecture
//!
//! ```text
//! SamplerTask (tokio, watch shutdown)
//!   └── tick → spawn_blocking(ResourceSampler::sample_now)
//!
//! ResourceSampler
//!   ├── HostProbe (ProcfsProbe: /proc/stat, /proc/meminfo)
//!   ├── throttle for sample(): last real sample + interval
//!   ├── cached ResourceSnapshot   ← served while throttled or on failure
//!   └── history: cpu / memory MetricAggregate
//! ```
//!
//! # Failure handling
//!
//! A failed probe never surfaces to callers. The last known-good values
//! are served with `fresh == false` and a warning is logged.

pub mod probe;
pub mod sampler;
pub mod task;

pub use probe::{CpuTicks, HostProbe, MemoryInfo, ProbeError, ProbeResult, ProcfsProbe};
pub use sampler::{
    DEFAULT_SAMPLE_INTERVAL, MAX_WARMUP, ResourceHistoryView, ResourceSampler, SamplerConfig,
};
pub use task::{SamplerTask, SnapshotCallback};
