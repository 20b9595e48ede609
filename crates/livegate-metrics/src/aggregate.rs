//! Running statistics for one (label, metric) pair.

use serde::Serialize;

use livegate_core::AggregateKind;

use crate::sketch::QuantileSketch;

/// Count, sum, min, max and a percentile sketch over a value stream.
#[derive(Debug, Clone, Default)]
pub struct MetricAggregate {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    sketch: QuantileSketch,
}

impl MetricAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one observation.
    pub fn record(&mut self, value: f64) {
        self.record_n(value, 1);
    }

    /// Record `n` observations of the same value.
    pub fn record_n(&mut self, value: f64, n: u64) {
        if n == 0 || !value.is_finite() {
            return;
        }
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += n;
        self.sum += value * n as f64;
        self.sketch.add_n(value, n);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Immutable point-in-time summary.
    pub fn view(&self) -> AggregateView {
        if self.count == 0 {
            return AggregateView::default();
        }
        // Sketch estimates are clamped into the exact observed range.
        let pct = |q: f64| {
            self.sketch
                .quantile(q)
                .map(|v| v.clamp(self.min, self.max))
                .unwrap_or(self.max)
        };
        AggregateView {
            count: self.count,
            sum: self.sum,
            min: self.min,
            max: self.max,
            mean: self.sum / self.count as f64,
            p90: pct(0.90),
            p95: pct(0.95),
            p99: pct(0.99),
        }
    }
}

/// Snapshot of a [`MetricAggregate`]. All fields are zero when `count == 0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AggregateView {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

impl AggregateView {
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Reduce to one value. `None` when there are no observations.
    pub fn value(&self, kind: AggregateKind) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        Some(match kind {
            AggregateKind::Avg => self.mean,
            AggregateKind::Max => self.max,
            AggregateKind::Min => self.min,
            AggregateKind::Pct90 => self.p90,
            AggregateKind::Pct95 => self.p95,
            AggregateKind::Pct99 => self.p99,
        })
    }
}

/// Largest timestamp jump, in buckets, still treated as continuous traffic.
/// Gaps up to this size are zero-filled; larger jumps restart the window.
const MAX_GAP_BUCKETS: u64 = 3600;

/// Counts samples in fixed-width time buckets and emits one rate
/// observation (requests per second) for every bucket that closes.
#[derive(Debug, Clone)]
pub struct ThroughputWindow {
    bucket_ms: i64,
    open: Option<(i64, u64)>,
}

impl ThroughputWindow {
    pub fn new(bucket_ms: i64) -> Self {
        Self {
            bucket_ms: bucket_ms.max(1),
            open: None,
        }
    }

    fn per_second(&self, count: u64) -> f64 {
        count as f64 * 1000.0 / self.bucket_ms as f64
    }

    /// Count one sample. Closed buckets are recorded into `rates`.
    ///
    /// Samples older than the open bucket are counted in the open bucket.
    /// A jump of more than `MAX_GAP_BUCKETS` in either direction discards
    /// the open bucket and restarts the window at the new timestamp; the
    /// return value is `true` when that happened.
    pub fn observe(&mut self, timestamp_ms: i64, rates: &mut MetricAggregate) -> bool {
        let bucket = timestamp_ms.div_euclid(self.bucket_ms);
        let Some((open, count)) = self.open else {
            self.open = Some((bucket, 1));
            return false;
        };

        let distance = bucket.abs_diff(open);
        if distance > MAX_GAP_BUCKETS {
            self.open = Some((bucket, 1));
            return true;
        }

        if bucket <= open {
            self.open = Some((open, count.saturating_add(1)));
        } else {
            rates.record(self.per_second(count));
            rates.record_n(0.0, distance - 1);
            self.open = Some((bucket, 1));
        }
        false
    }

    /// Record the open bucket, if any, and start empty.
    pub fn close(&mut self, rates: &mut MetricAggregate) {
        if let Some((_, count)) = self.open.take() {
            rates.record(self.per_second(count));
        }
    }

    /// Samples counted in the bucket that has not closed yet.
    pub fn open_count(&self) -> u64 {
        self.open.map_or(0, |(_, c)| c)
    }
}
