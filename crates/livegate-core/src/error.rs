//! Error types for gate configuration.

use thiserror::Error;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or validating a gate configuration.
///
/// These surface at load time only. Nothing on the ingestion or
/// evaluation path returns a `ConfigError`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("rule {rule}: enabled rule has no pass threshold")]
    MissingPassThreshold { rule: String },

    #[error("rule {rule}: {field} threshold must be a finite number")]
    NonFiniteThreshold { rule: String, field: &'static str },

    #[error("rule {rule}: weight {weight} is outside [0, 1]")]
    WeightOutOfRange { rule: String, weight: f64 },

    #[error("rule {rule}: warning threshold {warning} is stricter than pass threshold {pass}")]
    WarningStricterThanPass { rule: String, pass: f64, warning: f64 },

    #[error("duplicate rule id: {0}")]
    DuplicateRuleId(String),

    #[error("{name} score {value} is outside [0, 100]")]
    TargetScoreOutOfRange { name: &'static str, value: f64 },

    #[error("pass score {pass} must be greater than warning score {warning}")]
    TargetScoreOrder { pass: f64, warning: f64 },

    #[error("unknown metric: {0}")]
    UnknownMetric(String),

    #[error("unknown aggregate: {0}")]
    UnknownAggregate(String),

    #[error("unknown operator: {0}")]
    UnknownOperator(String),

    #[error("line {line}: {reason}")]
    Legacy { line: usize, reason: String },

    #[error("toml parse error: {0}")]
    Toml(#[from] toml::de::Error),
}
