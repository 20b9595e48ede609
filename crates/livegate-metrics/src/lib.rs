//! livegate-metrics: streaming statistics for load-test samples.
//!
//! Maintains per-label running aggregates (count, sum, min, max and a
//! bounded-memory percentile sketch) for response time, error rate and
//! throughput, with an atomic whole-store reset between test runs.
//!
//! # Architecture
//!
//! ```text
//! SampleIngestor
//!   └── ingest() ← called per completed sample, from many threads
//!         │
//! AggregateStore
//!   ├── ArcSwap<Generation>          ← reset() swaps in an empty one
//!   │     └── DashMap<label, LabelAggregates>
//!   │           ├── response_time: MetricAggregate
//!   │           ├── error_rate:    MetricAggregate
//!   │           └── throughput:    MetricAggregate + ThroughputWindow
//!   └── snapshot() / snapshot_all() → AggregateView
//! ```
//!
//! Percentiles carry a ±1% relative error bound (see [`sketch`]).

pub mod aggregate;
pub mod ingest;
pub mod sketch;
pub mod store;

pub use aggregate::{AggregateView, MetricAggregate, ThroughputWindow};
pub use ingest::{IngestConfig, SampleIngestor};
pub use sketch::QuantileSketch;
pub use store::{
    AggregateStore, DEFAULT_THROUGHPUT_BUCKET, LabelView, MetricKey, StoreSnapshot, StoreStats,
};
