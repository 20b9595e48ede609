//! livegate-core: shared types and gate configuration.
//!
//! Everything the other livegate crates exchange lives here: the
//! [`Sample`] record produced per completed request, the metric and
//! aggregate vocabulary rules are written in, [`ResourceSnapshot`], and
//! the validated [`GateConfig`].

pub mod config;
pub mod error;
pub mod types;

pub use config::{GateConfig, GateRule, TargetScores};
pub use error::{ConfigError, ConfigResult};
pub use types::*;
