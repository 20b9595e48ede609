//! livegate-service: the quality-gate engine as one owned service.
//!
//! Wires ingestion, the aggregate store, the resource sampler and the
//! evaluator together behind the lifecycle of a single test run.
//!
//! # Architecture
//!
//! ```text
//! load generator threads ──on_sample()──┐
//!                                       ▼
//! QualityGateService ── SampleIngestor ── AggregateStore (ArcSwap generation)
//!   ├── ArcSwap<GateConfig>       ← load_rules() / set_target_scores()
//!   ├── ResourceSampler ◄── SamplerTask (at most one, per run)
//!   └── verdict() → GateEvaluator(config, store snapshot, resource history)
//!
//! on_run_start(): reset store + sampler, start SamplerTask
//! on_run_end():   stop SamplerTask, close throughput buckets, final verdict
//! ```
//!
//! Recorders ([`JtlRecorder`], [`ResourceRecorder`]) are additional
//! [`RunListener`]s that persist a run for later replay.

pub mod listener;
pub mod recorder;
pub mod service;

pub use listener::{Fanout, RunListener};
pub use recorder::{JtlRecorder, ResourceRecorder};
pub use service::{QualityGateService, ServiceConfig};
