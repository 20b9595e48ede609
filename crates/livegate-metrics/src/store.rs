//! Aggregate store: per-label running statistics with atomic reset.
//!
//! Aggregates live in a [`Generation`]: a `DashMap` from label to that
//! label's aggregates, so writers for different labels contend only on
//! their map shard. The current generation sits behind an `ArcSwap`.
//! Writers load the generation once per sample and apply every update
//! for that sample to it; `reset()` swaps in an empty generation. A write
//! racing a reset therefore lands wholly in the old generation or wholly
//! in the new one.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info};

use livegate_core::{ALL_LABELS, SampleMetric};

use crate::aggregate::{AggregateView, MetricAggregate, ThroughputWindow};

/// Default throughput bucket width.
pub const DEFAULT_THROUGHPUT_BUCKET: Duration = Duration::from_millis(1000);

/// Identifies one aggregate: a sample label and a sample-derived metric.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricKey {
    pub label: String,
    pub metric: SampleMetric,
}

impl MetricKey {
    pub fn new(label: impl Into<String>, metric: SampleMetric) -> Self {
        Self {
            label: label.into(),
            metric,
        }
    }

    /// Key for the aggregate spanning every label.
    pub fn all(metric: SampleMetric) -> Self {
        Self::new(ALL_LABELS, metric)
    }
}

/// Aggregates kept for one label.
#[derive(Debug, Clone)]
pub(crate) struct LabelAggregates {
    response_time: MetricAggregate,
    error_rate: MetricAggregate,
    throughput: MetricAggregate,
    window: ThroughputWindow,
}

impl LabelAggregates {
    fn new(bucket_ms: i64) -> Self {
        Self {
            response_time: MetricAggregate::new(),
            error_rate: MetricAggregate::new(),
            throughput: MetricAggregate::new(),
            window: ThroughputWindow::new(bucket_ms),
        }
    }

    /// Returns `true` when the timestamp restarted the throughput window.
    pub(crate) fn record_sample(&mut self, timestamp_ms: i64, elapsed_ms: f64, success: bool) -> bool {
        self.response_time.record(elapsed_ms);
        self.error_rate.record(if success { 0.0 } else { 1.0 });
        self.window.observe(timestamp_ms, &mut self.throughput)
    }

    fn aggregate_mut(&mut self, metric: SampleMetric) -> Option<&mut MetricAggregate> {
        match metric {
            SampleMetric::ResponseTime => Some(&mut self.response_time),
            SampleMetric::ErrorRate => Some(&mut self.error_rate),
            SampleMetric::Throughput => Some(&mut self.throughput),
            SampleMetric::CpuUsage | SampleMetric::MemoryUsage => None,
        }
    }

    fn view(&self) -> LabelView {
        LabelView {
            response_time: self.response_time.view(),
            error_rate: self.error_rate.view(),
            throughput: self.throughput.view(),
        }
    }
}

/// One reset epoch of the store.
#[derive(Debug)]
pub(crate) struct Generation {
    number: u64,
    bucket_ms: i64,
    labels: DashMap<String, LabelAggregates>,
    ingested: AtomicU64,
    clamped: AtomicU64,
}

impl Generation {
    fn new(number: u64, bucket_ms: i64) -> Self {
        Self {
            number,
            bucket_ms,
            labels: DashMap::with_capacity(16),
            ingested: AtomicU64::new(0),
            clamped: AtomicU64::new(0),
        }
    }

    /// Apply `f` to the aggregates for `label`, creating them on first use.
    pub(crate) fn with_label<R>(&self, label: &str, f: impl FnOnce(&mut LabelAggregates) -> R) -> R {
        if let Some(mut entry) = self.labels.get_mut(label) {
            return f(entry.value_mut());
        }
        let mut entry = self
            .labels
            .entry(label.to_string())
            .or_insert_with(|| LabelAggregates::new(self.bucket_ms));
        f(entry.value_mut())
    }

    pub(crate) fn count_ingested(&self, clamped: bool) {
        self.ingested.fetch_add(1, Ordering::Relaxed);
        if clamped {
            self.clamped.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn stats(&self) -> StoreStats {
        StoreStats {
            generation: self.number,
            labels: self.labels.len(),
            samples_ingested: self.ingested.load(Ordering::Relaxed),
            samples_clamped: self.clamped.load(Ordering::Relaxed),
        }
    }
}

/// Counters for one store generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub generation: u64,
    pub labels: usize,
    pub samples_ingested: u64,
    pub samples_clamped: u64,
}

/// Point-in-time views of one label's aggregates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LabelView {
    pub response_time: AggregateView,
    pub error_rate: AggregateView,
    pub throughput: AggregateView,
}

impl LabelView {
    pub fn metric(&self, metric: SampleMetric) -> Option<&AggregateView> {
        match metric {
            SampleMetric::ResponseTime => Some(&self.response_time),
            SampleMetric::ErrorRate => Some(&self.error_rate),
            SampleMetric::Throughput => Some(&self.throughput),
            SampleMetric::CpuUsage | SampleMetric::MemoryUsage => None,
        }
    }
}

/// Views of every label in one generation, taken in a single pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreSnapshot {
    pub stats: StoreStats,
    pub labels: BTreeMap<String, LabelView>,
}

impl StoreSnapshot {
    /// View for `key`; `None` for unknown labels and resource metrics.
    pub fn get(&self, key: &MetricKey) -> Option<AggregateView> {
        self.labels
            .get(&key.label)
            .and_then(|l| l.metric(key.metric))
            .copied()
    }
}

/// Thread-safe store of per-label aggregates.
pub struct AggregateStore {
    current: ArcSwap<Generation>,
    bucket_ms: i64,
}

impl AggregateStore {
    /// Create a store whose throughput aggregates use `throughput_bucket` wide buckets.
    pub fn new(throughput_bucket: Duration) -> Self {
        let bucket_ms = (throughput_bucket.as_millis() as i64).max(1);
        Self {
            current: ArcSwap::from_pointee(Generation::new(0, bucket_ms)),
            bucket_ms,
        }
    }

    /// The generation writers should apply the next sample to.
    pub(crate) fn current(&self) -> Arc<Generation> {
        self.current.load_full()
    }

    /// Record one value for `key`.
    ///
    /// Throughput values are taken as already-computed rates. Resource
    /// metrics are owned by the resource sampler and ignored here.
    pub fn update(&self, key: &MetricKey, value: f64) {
        let generation = self.current.load();
        let applied = generation.with_label(&key.label, |aggs| {
            aggs.aggregate_mut(key.metric).map(|agg| agg.record(value)).is_some()
        });
        if !applied {
            debug!(metric = %key.metric, "resource metric ignored by aggregate store");
        }
    }

    /// Point-in-time view of one aggregate. Empty when never written.
    pub fn snapshot(&self, key: &MetricKey) -> AggregateView {
        let generation = self.current.load();
        generation
            .labels
            .get(&key.label)
            .and_then(|l| l.view().metric(key.metric).copied())
            .unwrap_or_default()
    }

    /// Views of every label in the current generation.
    pub fn snapshot_all(&self) -> StoreSnapshot {
        let generation = self.current.load_full();
        let labels = generation
            .labels
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().view()))
            .collect();
        StoreSnapshot {
            stats: generation.stats(),
            labels,
        }
    }

    pub fn stats(&self) -> StoreStats {
        self.current.load().stats()
    }

    /// Record every open throughput bucket as a closed observation.
    pub fn close_open_buckets(&self) {
        let generation = self.current.load();
        for mut entry in generation.labels.iter_mut() {
            let aggs = entry.value_mut();
            aggs.window.close(&mut aggs.throughput);
        }
    }

    /// Atomically replace all contents with an empty generation.
    pub fn reset(&self) {
        let old = self
            .current
            .rcu(|cur| Arc::new(Generation::new(cur.number + 1, self.bucket_ms)));
        info!(
            generation = old.number + 1,
            discarded_samples = old.ingested.load(Ordering::Relaxed),
            "aggregate store reset"
        );
    }
}

impl Default for AggregateStore {
    fn default() -> Self {
        Self::new(DEFAULT_THROUGHPUT_BUCKET)
    }
}

impl std::fmt::Debug for AggregateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregateStore")
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_creates_label_lazily() {
        let store = AggregateStore::default();
        let key = MetricKey::new("login", SampleMetric::ResponseTime);
        assert!(store.snapshot(&key).is_empty());

        store.update(&key, 500.0);
        store.update(&key, 1500.0);

        let view = store.snapshot(&key);
        assert_eq!(view.count, 2);
        assert_eq!(view.mean, 1000.0);
        assert_eq!(store.stats().labels, 1);
    }

    #[test]
    fn resource_metrics_are_not_stored() {
        let store = AggregateStore::default();
        let key = MetricKey::all(SampleMetric::CpuUsage);
        store.update(&key, 50.0);
        assert!(store.snapshot(&key).is_empty());
    }

    #[test]
    fn reset_swaps_to_empty_generation() {
        let store = AggregateStore::default();
        let key = MetricKey::all(SampleMetric::ErrorRate);
        store.update(&key, 1.0);
        assert_eq!(store.stats().generation, 0);

        store.reset();

        assert!(store.snapshot(&key).is_empty());
        let stats = store.stats();
        assert_eq!(stats.generation, 1);
        assert_eq!(stats.labels, 0);
    }

    #[test]
    fn snapshot_all_lists_labels_in_order() {
        let store = AggregateStore::default();
        store.update(&MetricKey::new("b", SampleMetric::ResponseTime), 1.0);
        store.update(&MetricKey::new("a", SampleMetric::ResponseTime), 2.0);

        let snap = store.snapshot_all();
        let labels: Vec<_> = snap.labels.keys().cloned().collect();
        assert_eq!(labels, vec!["a", "b"]);
        assert_eq!(
            snap.get(&MetricKey::new("a", SampleMetric::ResponseTime)).unwrap().max,
            2.0
        );
        assert!(snap.get(&MetricKey::new("c", SampleMetric::ResponseTime)).is_none());
    }

    #[test]
    fn close_open_buckets_records_partial_bucket() {
        let store = AggregateStore::default();
        let generation = store.current();
        generation.with_label("api", |aggs| {
            aggs.record_sample(1_000, 10.0, true);
            aggs.record_sample(1_500, 10.0, true);
        });
        let key = MetricKey::new("api", SampleMetric::Throughput);
        assert!(store.snapshot(&key).is_empty());

        store.close_open_buckets();
        assert_eq!(store.snapshot(&key).mean, 2.0);
    }
}
