//! Shared types used across livegate crates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Label key under which every sample is aggregated regardless of its own label.
pub const ALL_LABELS: &str = "*";

// ── Sample ────────────────────────────────────────────────────────

/// One completed request as reported by the load generator.
///
/// Field set mirrors a JTL row so that records can be exported and
/// replayed without loss.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Unix timestamp (milliseconds) when the request started.
    pub timestamp_ms: i64,
    /// Total elapsed time in milliseconds. Negative values are malformed.
    pub elapsed_ms: i64,
    pub label: String,
    pub response_code: String,
    pub response_message: String,
    pub thread_name: String,
    pub data_type: String,
    pub success: bool,
    pub failure_message: String,
    /// Received bytes.
    pub bytes: i64,
    pub sent_bytes: i64,
    /// Active threads in this sample's thread group.
    pub grp_threads: u32,
    /// Active threads across all groups.
    pub all_threads: u32,
    pub url: String,
    /// Time to first byte in milliseconds.
    pub latency_ms: i64,
    pub idle_time_ms: i64,
    pub connect_ms: i64,
}

impl Sample {
    /// Minimal sample with only the fields the aggregates consume.
    pub fn new(label: impl Into<String>, timestamp_ms: i64, elapsed_ms: i64, success: bool) -> Self {
        Self {
            timestamp_ms,
            elapsed_ms,
            label: label.into(),
            response_code: if success { "200" } else { "500" }.to_string(),
            success,
            ..Default::default()
        }
    }
}

// ── Resource snapshot ─────────────────────────────────────────────

/// Host CPU and memory state at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    /// Unix timestamp (milliseconds). Non-decreasing across a sampler's lifetime.
    pub timestamp_ms: u64,
    /// CPU busy percentage, always within [0, 100].
    pub cpu_percent: f64,
    /// Memory in use as a percentage of total, within [0, 100].
    pub memory_percent: f64,
    pub used_memory_mb: u64,
    pub available_memory_mb: u64,
    /// Whether this snapshot came from a new OS measurement.
    pub fresh: bool,
}

impl ResourceSnapshot {
    /// The same values, marked as served from cache.
    pub fn stale(self) -> Self {
        Self {
            fresh: false,
            ..self
        }
    }
}

// ── Metric vocabulary ─────────────────────────────────────────────

/// What a gate rule measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SampleMetric {
    /// Elapsed time per sample, milliseconds.
    ResponseTime,
    /// Requests per second, one observation per closed time bucket.
    Throughput,
    /// Failed-sample fraction, 0 or 1 per sample.
    ErrorRate,
    /// Host CPU busy percent.
    CpuUsage,
    /// Host memory used percent.
    MemoryUsage,
}

impl SampleMetric {
    pub const ALL: [SampleMetric; 5] = [
        SampleMetric::ResponseTime,
        SampleMetric::Throughput,
        SampleMetric::ErrorRate,
        SampleMetric::CpuUsage,
        SampleMetric::MemoryUsage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SampleMetric::ResponseTime => "Response Time",
            SampleMetric::Throughput => "Throughput",
            SampleMetric::ErrorRate => "Error Rate",
            SampleMetric::CpuUsage => "CPU Usage",
            SampleMetric::MemoryUsage => "Memory Usage",
        }
    }

    /// Resource metrics come from the host sampler rather than from samples.
    pub fn is_resource(&self) -> bool {
        matches!(self, SampleMetric::CpuUsage | SampleMetric::MemoryUsage)
    }
}

impl FromStr for SampleMetric {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "response time" | "response_time" | "elapsed" => Ok(SampleMetric::ResponseTime),
            "throughput" | "rps" => Ok(SampleMetric::Throughput),
            "error rate" | "error_rate" => Ok(SampleMetric::ErrorRate),
            "cpu usage" | "cpu_usage" | "cpu" => Ok(SampleMetric::CpuUsage),
            "memory usage" | "memory_usage" | "memory" => Ok(SampleMetric::MemoryUsage),
            _ => Err(ConfigError::UnknownMetric(s.to_string())),
        }
    }
}

/// How an aggregate is reduced to one observed value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AggregateKind {
    #[default]
    Avg,
    Max,
    Min,
    Pct90,
    Pct95,
    Pct99,
}

impl AggregateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateKind::Avg => "Avg",
            AggregateKind::Max => "Max",
            AggregateKind::Min => "Min",
            AggregateKind::Pct90 => "90Pct",
            AggregateKind::Pct95 => "95Pct",
            AggregateKind::Pct99 => "99Pct",
        }
    }

    /// Quantile in (0, 1) for percentile kinds.
    pub fn quantile(&self) -> Option<f64> {
        match self {
            AggregateKind::Pct90 => Some(0.90),
            AggregateKind::Pct95 => Some(0.95),
            AggregateKind::Pct99 => Some(0.99),
            _ => None,
        }
    }
}

impl FromStr for AggregateKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "avg" | "mean" => Ok(AggregateKind::Avg),
            "max" => Ok(AggregateKind::Max),
            "min" => Ok(AggregateKind::Min),
            "90pct" | "pct90" | "p90" => Ok(AggregateKind::Pct90),
            "95pct" | "pct95" | "p95" => Ok(AggregateKind::Pct95),
            "99pct" | "pct99" | "p99" => Ok(AggregateKind::Pct99),
            _ => Err(ConfigError::UnknownAggregate(s.to_string())),
        }
    }
}

/// Comparison between an observed value and a threshold.
///
/// A threshold is always satisfied at equality: `<` and `<=` both accept
/// `observed == threshold`, as do `>` and `>=`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Operator {
    #[default]
    Lt,
    Gt,
    Le,
    Ge,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Le => "<=",
            Operator::Ge => ">=",
        }
    }

    /// Whether smaller observed values are better under this operator.
    pub fn lower_is_better(&self) -> bool {
        matches!(self, Operator::Lt | Operator::Le)
    }

    /// Whether `observed` meets `threshold`. Equality always meets it.
    pub fn satisfies(&self, observed: f64, threshold: f64) -> bool {
        if self.lower_is_better() {
            observed <= threshold
        } else {
            observed >= threshold
        }
    }
}

impl FromStr for Operator {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "<" | "lt" => Ok(Operator::Lt),
            ">" | "gt" => Ok(Operator::Gt),
            "<=" | "le" => Ok(Operator::Le),
            ">=" | "ge" => Ok(Operator::Ge),
            other => Err(ConfigError::UnknownOperator(other.to_string())),
        }
    }
}

macro_rules! string_conversions {
    ($($ty:ty),*) => {$(
        impl TryFrom<String> for $ty {
            type Error = ConfigError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                s.parse()
            }
        }

        impl From<$ty> for String {
            fn from(v: $ty) -> String {
                v.as_str().to_string()
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    )*};
}

string_conversions!(SampleMetric, AggregateKind, Operator);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_accepts_ui_and_snake_names() {
        assert_eq!("Response Time".parse::<SampleMetric>().unwrap(), SampleMetric::ResponseTime);
        assert_eq!("error_rate".parse::<SampleMetric>().unwrap(), SampleMetric::ErrorRate);
        assert_eq!("CPU Usage".parse::<SampleMetric>().unwrap(), SampleMetric::CpuUsage);
        assert!("latency".parse::<SampleMetric>().is_err());
    }

    #[test]
    fn aggregate_names_round_trip_through_display() {
        for kind in [
            AggregateKind::Avg,
            AggregateKind::Max,
            AggregateKind::Min,
            AggregateKind::Pct90,
            AggregateKind::Pct95,
            AggregateKind::Pct99,
        ] {
            assert_eq!(kind.to_string().parse::<AggregateKind>().unwrap(), kind);
        }
        assert_eq!("p99".parse::<AggregateKind>().unwrap(), AggregateKind::Pct99);
    }

    #[test]
    fn operator_equality_is_satisfied() {
        assert!(Operator::Lt.satisfies(1000.0, 1000.0));
        assert!(Operator::Le.satisfies(1000.0, 1000.0));
        assert!(Operator::Gt.satisfies(5.0, 5.0));
        assert!(Operator::Ge.satisfies(5.0, 5.0));
        assert!(!Operator::Lt.satisfies(1000.1, 1000.0));
        assert!(!Operator::Gt.satisfies(4.9, 5.0));
    }

    #[test]
    fn metric_serializes_with_ui_name() {
        let json = serde_json::to_string(&SampleMetric::MemoryUsage).unwrap();
        assert_eq!(json, "\"Memory Usage\"");
        let back: SampleMetric = serde_json::from_str("\"throughput\"").unwrap();
        assert_eq!(back, SampleMetric::Throughput);
    }

    #[test]
    fn stale_keeps_values() {
        let snap = ResourceSnapshot {
            timestamp_ms: 10,
            cpu_percent: 42.0,
            memory_percent: 50.0,
            used_memory_mb: 100,
            available_memory_mb: 100,
            fresh: true,
        };
        let stale = snap.stale();
        assert!(!stale.fresh);
        assert_eq!(stale.cpu_percent, 42.0);
        assert_eq!(stale.timestamp_ms, 10);
    }
}
