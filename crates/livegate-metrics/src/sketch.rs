//! Bounded-memory streaming quantile estimator.
//!
//! Values are mapped to logarithmically spaced buckets so that every
//! bucket spans a fixed *relative* width. Reporting the bucket's midpoint
//! bounds the relative error of any quantile estimate:
//!
//! ```text
//! gamma  = (1 + alpha) / (1 - alpha)
//! bucket = ceil(ln(v) / ln(gamma))          covers (gamma^(i-1), gamma^i]
//! value  = 2 * gamma^i / (gamma + 1)        |estimate - v| <= alpha * v
//! ```
//!
//! With the default `alpha = 0.01` the estimate of the value at rank
//! `floor(q * (n - 1))` is within ±1% of the true order statistic.
//! Memory is bounded by `max_buckets`; if a stream spans more orders of
//! magnitude than that allows, the lowest buckets are merged upward, which
//! only affects accuracy of the smallest values.

use std::collections::BTreeMap;

/// Default relative accuracy.
pub const DEFAULT_RELATIVE_ACCURACY: f64 = 0.01;

/// Default bucket cap. At 1% accuracy this covers ~18 orders of magnitude.
pub const DEFAULT_MAX_BUCKETS: usize = 2048;

/// Values at or below this are counted in the zero bucket.
const MIN_INDEXABLE: f64 = 1e-9;

/// Log-bucketed quantile sketch.
#[derive(Debug, Clone)]
pub struct QuantileSketch {
    gamma_ln: f64,
    gamma: f64,
    max_buckets: usize,
    zero_count: u64,
    buckets: BTreeMap<i32, u64>,
    count: u64,
}

impl QuantileSketch {
    /// Sketch with the given relative accuracy in (0, 1) and bucket cap.
    pub fn new(relative_accuracy: f64, max_buckets: usize) -> Self {
        let alpha = relative_accuracy.clamp(1e-6, 0.5);
        let gamma = (1.0 + alpha) / (1.0 - alpha);
        Self {
            gamma_ln: gamma.ln(),
            gamma,
            max_buckets: max_buckets.max(16),
            zero_count: 0,
            buckets: BTreeMap::new(),
            count: 0,
        }
    }

    /// Relative accuracy this sketch guarantees.
    pub fn relative_accuracy(&self) -> f64 {
        (self.gamma - 1.0) / (self.gamma + 1.0)
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of occupied buckets (memory footprint).
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Add one observation. Non-finite and negative values count as zero.
    pub fn add(&mut self, value: f64) {
        self.add_n(value, 1);
    }

    /// Add `n` observations of the same value.
    pub fn add_n(&mut self, value: f64, n: u64) {
        if n == 0 {
            return;
        }
        self.count += n;
        if !value.is_finite() || value <= MIN_INDEXABLE {
            self.zero_count += n;
            return;
        }
        *self.buckets.entry(self.index(value)).or_insert(0) += n;
        if self.buckets.len() > self.max_buckets {
            self.collapse_lowest();
        }
    }

    /// Estimate the `q`-quantile, `q` in [0, 1]. `None` when empty.
    pub fn quantile(&self, q: f64) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        let q = if q.is_nan() { 0.5 } else { q.clamp(0.0, 1.0) };
        let rank = (q * (self.count - 1) as f64).floor() as u64;

        let mut seen = self.zero_count;
        if seen > rank {
            return Some(0.0);
        }
        for (&idx, &n) in &self.buckets {
            seen += n;
            if seen > rank {
                return Some(self.value(idx));
            }
        }
        // Unreachable while counts are consistent; fall back to the top bucket.
        self.buckets.keys().next_back().map(|&idx| self.value(idx))
    }

    fn index(&self, value: f64) -> i32 {
        (value.ln() / self.gamma_ln).ceil() as i32
    }

    fn value(&self, index: i32) -> f64 {
        2.0 * self.gamma.powi(index) / (self.gamma + 1.0)
    }

    fn collapse_lowest(&mut self) {
        while self.buckets.len() > self.max_buckets {
            let Some((_, lowest)) = self.buckets.pop_first() else {
                return;
            };
            if let Some(mut next) = self.buckets.first_entry() {
                *next.get_mut() += lowest;
            }
        }
    }
}

impl Default for QuantileSketch {
    fn default() -> Self {
        Self::new(DEFAULT_RELATIVE_ACCURACY, DEFAULT_MAX_BUCKETS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exact(sorted: &[f64], q: f64) -> f64 {
        sorted[(q * (sorted.len() - 1) as f64).floor() as usize]
    }

    fn assert_within(estimate: f64, truth: f64, bound: f64) {
        let err = (estimate - truth).abs() / truth;
        assert!(err <= bound, "estimate {estimate} vs {truth}: rel err {err}");
    }

    #[test]
    fn empty_sketch_has_no_quantile() {
        let s = QuantileSketch::default();
        assert!(s.is_empty());
        assert_eq!(s.quantile(0.99), None);
    }

    #[test]
    fn single_value_within_accuracy() {
        let mut s = QuantileSketch::default();
        s.add(250.0);
        for q in [0.0, 0.5, 0.9, 1.0] {
            assert_within(s.quantile(q).unwrap(), 250.0, 0.01 + 1e-12);
        }
    }

    #[test]
    fn uniform_distribution_percentiles_within_bound() {
        let mut s = QuantileSketch::default();
        let values: Vec<f64> = (1..=100_000).map(|i| i as f64 * 0.5).collect();
        for v in &values {
            s.add(*v);
        }
        for q in [0.5, 0.9, 0.95, 0.99] {
            assert_within(s.quantile(q).unwrap(), exact(&values, q), 0.01 + 1e-9);
        }
    }

    #[test]
    fn skewed_distribution_percentiles_within_bound() {
        // Long-tailed latencies: most requests fast, a few very slow.
        let mut values: Vec<f64> = (0..50_000)
            .map(|i| {
                let x = (i % 1000) as f64 / 1000.0;
                5.0 + 20.0 * x.powi(8) * 1000.0
            })
            .collect();
        let mut s = QuantileSketch::default();
        for v in &values {
            s.add(*v);
        }
        values.sort_by(|a, b| a.total_cmp(b));
        for q in [0.9, 0.95, 0.99] {
            assert_within(s.quantile(q).unwrap(), exact(&values, q), 0.01 + 1e-9);
        }
    }

    #[test]
    fn zeros_and_negatives_land_in_zero_bucket() {
        let mut s = QuantileSketch::default();
        s.add(0.0);
        s.add(-5.0);
        s.add(f64::NAN);
        s.add(100.0);
        assert_eq!(s.count(), 4);
        assert_eq!(s.quantile(0.5), Some(0.0));
        assert_within(s.quantile(1.0).unwrap(), 100.0, 0.01 + 1e-12);
    }

    #[test]
    fn add_n_matches_repeated_add() {
        let mut a = QuantileSketch::default();
        let mut b = QuantileSketch::default();
        a.add_n(42.0, 10);
        for _ in 0..10 {
            b.add(42.0);
        }
        assert_eq!(a.count(), b.count());
        assert_eq!(a.quantile(0.9), b.quantile(0.9));
    }

    #[test]
    fn bucket_cap_bounds_memory() {
        let mut s = QuantileSketch::new(0.01, 64);
        for exp in -6..12 {
            for step in 1..50 {
                s.add(10f64.powi(exp) * step as f64);
            }
        }
        assert!(s.bucket_count() <= 64);
        // High quantiles keep their accuracy after collapsing.
        let top = 10f64.powi(11) * 49.0;
        assert_within(s.quantile(1.0).unwrap(), top, 0.01 + 1e-9);
    }

    #[test]
    fn relative_accuracy_reports_configured_alpha() {
        let s = QuantileSketch::new(0.02, 128);
        assert!((s.relative_accuracy() - 0.02).abs() < 1e-12);
    }
}
