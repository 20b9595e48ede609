//! livegate-eval: weighted quality-gate scoring.
//!
//! Reads a `StoreSnapshot` and a `ResourceHistoryView`, resolves each
//! enabled rule's observed value, and combines per-rule contributions
//! into one composite score compared against the target scores.
//!
//! # Scoring Algorithm
//!
//! ```text
//! for each enabled rule:
//!     observed = aggregate(metric, label)   // none → Indeterminate
//!     observed meets pass    → Pass,    100
//!     observed meets warning → Warning, 100 * (warning - observed) / (warning - pass)
//!     otherwise              → Fail,    0
//!
//! score = Σ(contribution * weight) / Σ(weight)   over non-indeterminate rules
//!
//! score >= target.pass    → Pass
//! score >= target.warning → Warning
//! otherwise / no score    → Fail
//! ```
//!
//! Thresholds are met at equality for every operator.

pub mod evaluator;
pub mod verdict;

pub use evaluator::{FULL_SCORE, GateEvaluator, composite_score};
pub use verdict::{GateVerdict, OverallStatus, RuleResult, RuleStatus};
