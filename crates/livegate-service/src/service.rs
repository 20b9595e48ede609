//! Quality-gate service: one explicitly owned instance per test run.
//!
//! The service owns the rule configuration, the aggregate store, the
//! resource sampler and at most one background sampling task. Run
//! boundaries reset all per-run state; configuration edits apply to the
//! next evaluation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use livegate_core::{ConfigResult, GateConfig, GateRule, ResourceSnapshot, Sample};
use livegate_eval::{GateEvaluator, GateVerdict};
use livegate_metrics::{AggregateStore, IngestConfig, SampleIngestor, StoreSnapshot};
use livegate_resources::{
    HostProbe, ProcfsProbe, ResourceHistoryView, ResourceSampler, SamplerConfig, SamplerTask,
    SnapshotCallback,
};

use crate::listener::RunListener;

/// Per-run engine settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceConfig {
    pub ingest: IngestConfig,
    pub sampler: SamplerConfig,
}

/// Live quality-gate engine for one load-test process.
pub struct QualityGateService {
    config: ArcSwap<GateConfig>,
    /// Serializes config writers so concurrent edits are not lost.
    config_write: Mutex<()>,
    ingestor: SampleIngestor,
    sampler: Arc<ResourceSampler>,
    evaluator: GateEvaluator,
    settings: ServiceConfig,
    /// At most one sampling task; replacing it stops the old one.
    task: Mutex<Option<SamplerTask>>,
    runtime: Option<Handle>,
    on_snapshot: Option<SnapshotCallback>,
    running: AtomicBool,
}

impl QualityGateService {
    /// Service probing the local procfs.
    pub fn new(config: GateConfig, settings: ServiceConfig) -> Self {
        Self::with_probe(config, settings, Arc::new(ProcfsProbe::new()))
    }

    /// Service with a custom host probe.
    ///
    /// Background sampling runs on the tokio runtime current at construction
    /// or the one given to [`with_runtime`](Self::with_runtime). Without
    /// either, resources are sampled on demand at run start, on every
    /// [`verdict`](Self::verdict) and at run end.
    pub fn with_probe(config: GateConfig, settings: ServiceConfig, probe: Arc<dyn HostProbe>) -> Self {
        let runtime = Handle::try_current().ok();
        if runtime.is_none() {
            warn!("no tokio runtime, resources will only be sampled on demand");
        }
        Self {
            config: ArcSwap::from_pointee(config),
            config_write: Mutex::new(()),
            ingestor: SampleIngestor::with_config(settings.ingest),
            sampler: Arc::new(ResourceSampler::new(probe, settings.sampler)),
            evaluator: GateEvaluator::new(),
            settings,
            task: Mutex::new(None),
            runtime,
            on_snapshot: None,
            running: AtomicBool::new(false),
        }
    }

    /// Run the background sampling task on `runtime`.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Set a callback for every fresh snapshot taken by the sampling task.
    pub fn with_snapshot_callback(mut self, callback: SnapshotCallback) -> Self {
        self.on_snapshot = Some(callback);
        self
    }

    // ── Configuration ──────────────────────────────────────────

    /// Current configuration. Evaluations use whatever is current when they start.
    pub fn config(&self) -> Arc<GateConfig> {
        self.config.load_full()
    }

    /// Replace the rule set. Invalid rules are rejected and nothing changes.
    pub fn load_rules(&self, rules: Vec<GateRule>) -> ConfigResult<()> {
        let _guard = self.config_write.lock();
        let next = self.config.load().with_rules(rules)?;
        info!(rules = next.rules().len(), "gate rules loaded");
        self.config.store(Arc::new(next));
        Ok(())
    }

    /// Replace the composite-score targets.
    pub fn set_target_scores(&self, pass: f64, warning: f64) -> ConfigResult<()> {
        let _guard = self.config_write.lock();
        let next = self.config.load().with_target(pass, warning)?;
        info!(pass, warning, "target scores updated");
        self.config.store(Arc::new(next));
        Ok(())
    }

    /// Replace the whole configuration.
    pub fn replace_config(&self, config: GateConfig) {
        let _guard = self.config_write.lock();
        info!(rules = config.rules().len(), "gate configuration replaced");
        self.config.store(Arc::new(config));
    }

    // ── Hot path ───────────────────────────────────────────────

    /// Record one completed sample. Never blocks on I/O, never fails.
    pub fn ingest(&self, sample: &Sample) {
        self.ingestor.ingest(sample);
    }

    // ── Reads ──────────────────────────────────────────────────

    /// Throttled resource snapshot; probes the host only if the interval elapsed.
    pub fn resource_snapshot(&self) -> ResourceSnapshot {
        self.sampler.sample()
    }

    pub fn resource_history(&self) -> ResourceHistoryView {
        self.sampler.history()
    }

    pub fn aggregates(&self) -> StoreSnapshot {
        self.store().snapshot_all()
    }

    /// Evaluate the current configuration against current aggregates.
    ///
    /// During a run without a sampling task this also takes a throttled
    /// resource sample.
    pub fn verdict(&self) -> GateVerdict {
        if self.is_running() && !self.is_sampling() {
            self.sampler.sample();
        }
        let config = self.config.load_full();
        let store = self.store().snapshot_all();
        let resources = self.sampler.history();
        self.evaluator.evaluate(&config, &store, &resources)
    }

    pub fn store(&self) -> &Arc<AggregateStore> {
        self.ingestor.store()
    }

    pub fn sampler(&self) -> &Arc<ResourceSampler> {
        &self.sampler
    }

    pub fn settings(&self) -> ServiceConfig {
        self.settings
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Whether a background sampling task is active.
    pub fn is_sampling(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|t| t.is_running())
    }

    // ── Run lifecycle ──────────────────────────────────────────

    /// Reset per-run state and start background sampling.
    ///
    /// Calling this during a run starts a new run.
    pub fn start_run(&self) {
        if self.running.swap(true, Ordering::AcqRel) {
            warn!("run started while another was active, restarting");
        }
        self.store().reset();
        self.sampler.reset();
        info!(host = %self.sampler.describe_host(), "test run started");

        let Some(runtime) = &self.runtime else {
            // CPU baseline for the on-demand samples.
            self.sampler.sample();
            return;
        };
        let _enter = runtime.enter();
        let task = SamplerTask::start(
            Arc::clone(&self.sampler),
            self.settings.sampler.interval,
            self.on_snapshot.clone(),
        );
        // Dropping the previous task stops it.
        drop(self.task.lock().replace(task));
    }

    /// Stop sampling, close open throughput buckets and return the final verdict.
    pub fn end_run(&self) -> GateVerdict {
        if !self.running.swap(false, Ordering::AcqRel) {
            debug!("run ended without an active run");
        }
        let task = self.task.lock().take();
        if task.is_none() {
            self.sampler.sample();
        }
        drop(task);
        self.store().close_open_buckets();

        let verdict = self.verdict();
        info!(
            score = verdict.score.unwrap_or(f64::NAN),
            status = %verdict.status,
            indeterminate = verdict.is_indeterminate(),
            samples = self.store().stats().samples_ingested,
            "test run ended"
        );
        verdict
    }

    /// Stop the sampling task and wait for it to exit.
    pub async fn shutdown(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.stop().await;
        }
        self.running.store(false, Ordering::Release);
    }
}

impl RunListener for QualityGateService {
    fn on_sample(&self, sample: &Sample) {
        self.ingest(sample);
    }

    fn on_run_start(&self) {
        self.start_run();
    }

    fn on_run_end(&self) {
        self.end_run();
    }
}

impl std::fmt::Debug for QualityGateService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QualityGateService")
            .field("rules", &self.config.load().rules().len())
            .field("store", self.store())
            .field("running", &self.is_running())
            .finish()
    }
}
