//! Sample ingestion: turns completed samples into aggregate updates.
//!
//! `ingest()` is called from every load-generator thread. It never
//! blocks on I/O and never fails: malformed input is clamped and counted.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use livegate_core::{ALL_LABELS, Sample};

use crate::store::{AggregateStore, DEFAULT_THROUGHPUT_BUCKET};

/// Ingestion settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestConfig {
    /// Width of the time buckets throughput is counted in.
    pub throughput_bucket: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            throughput_bucket: DEFAULT_THROUGHPUT_BUCKET,
        }
    }
}

/// Routes each sample to response-time, error-rate and throughput
/// aggregates for both its own label and the all-labels aggregate.
#[derive(Debug, Clone)]
pub struct SampleIngestor {
    store: Arc<AggregateStore>,
}

impl SampleIngestor {
    pub fn new(store: Arc<AggregateStore>) -> Self {
        Self { store }
    }

    /// Ingestor over a fresh store built from `config`.
    pub fn with_config(config: IngestConfig) -> Self {
        Self::new(Arc::new(AggregateStore::new(config.throughput_bucket)))
    }

    pub fn store(&self) -> &Arc<AggregateStore> {
        &self.store
    }

    /// Record one completed sample.
    ///
    /// A negative elapsed time is clamped to zero. A timestamp far outside
    /// the open throughput bucket restarts the throughput window instead of
    /// zero-filling the gap. Either counts the sample as clamped.
    pub fn ingest(&self, sample: &Sample) {
        let negative = sample.elapsed_ms < 0;
        let elapsed = sample.elapsed_ms.max(0) as f64;
        if negative {
            debug!(
                label = %sample.label,
                elapsed_ms = sample.elapsed_ms,
                "negative elapsed time clamped to zero"
            );
        }

        // Every update for this sample goes to the same generation.
        let generation = self.store.current();
        let mut restarted = generation.with_label(&sample.label, |aggs| {
            aggs.record_sample(sample.timestamp_ms, elapsed, sample.success)
        });
        if sample.label != ALL_LABELS {
            restarted |= generation.with_label(ALL_LABELS, |aggs| {
                aggs.record_sample(sample.timestamp_ms, elapsed, sample.success)
            });
        }
        if restarted {
            debug!(
                label = %sample.label,
                timestamp_ms = sample.timestamp_ms,
                "timestamp jump restarted throughput window"
            );
        }
        generation.count_ingested(negative || restarted);
    }
}
