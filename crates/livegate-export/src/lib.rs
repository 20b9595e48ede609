//! livegate-export: encodings consumed by dashboards and scrapers.
//!
//! - [`jtl`]: per-sample CSV records in the fixed JTL column order, plus
//!   the reader used to replay recorded runs.
//! - [`resources`]: per-interval host resource CSV rows.
//! - [`json`]: compact JSON bodies for a polling frontend.
//! - [`prometheus`]: text exposition of aggregates, resources and verdict.
//!
//! Column orders and JSON field names are compatibility contracts with
//! downstream consumers.

pub mod error;
pub mod jtl;
pub mod json;
pub mod prometheus;
pub mod resources;

pub use error::{ExportError, ExportResult};
pub use jtl::{JTL_HEADER, JtlWriter, encode_sample, parse_sample, read_samples};
pub use json::{quality_gate_json, system_metrics_json, target_scores_json, verdict_json};
pub use prometheus::{render_aggregates, render_resources, render_verdict};
pub use resources::{RESOURCE_HEADER, ResourceCsvWriter, encode_snapshot};
