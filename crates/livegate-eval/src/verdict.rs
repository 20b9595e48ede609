//! Verdict types produced by the evaluator.

use std::fmt;

use serde::Serialize;

use livegate_core::{AggregateKind, Operator, SampleMetric, TargetScores};

/// Outcome of one rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RuleStatus {
    Pass,
    Warning,
    Fail,
    /// No observations behind the rule's metric; excluded from the score.
    Indeterminate,
}

impl RuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleStatus::Pass => "Pass",
            RuleStatus::Warning => "Warning",
            RuleStatus::Fail => "Fail",
            RuleStatus::Indeterminate => "Indeterminate",
        }
    }
}

impl fmt::Display for RuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the whole gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum OverallStatus {
    Pass,
    Warning,
    Fail,
}

impl OverallStatus {
    /// Map a composite score onto the targets. Equality counts toward the
    /// higher status; no score at all is a failure.
    pub fn from_score(score: Option<f64>, target: TargetScores) -> Self {
        match score {
            Some(s) if s >= target.pass => OverallStatus::Pass,
            Some(s) if s >= target.warning => OverallStatus::Warning,
            _ => OverallStatus::Fail,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OverallStatus::Pass => "Pass",
            OverallStatus::Warning => "Warning",
            OverallStatus::Fail => "Fail",
        }
    }

    /// Process exit code for CLI use: 0 pass, 1 warning, 2 fail.
    pub fn exit_code(&self) -> i32 {
        match self {
            OverallStatus::Pass => 0,
            OverallStatus::Warning => 1,
            OverallStatus::Fail => 2,
        }
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evaluation of one enabled rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleResult {
    pub id: String,
    pub metric: SampleMetric,
    /// Label the rule was scoped to; `None` for all labels or resource metrics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub aggregate: AggregateKind,
    pub operator: Operator,
    pub observed: Option<f64>,
    pub status: RuleStatus,
    /// Score in [0, 100]; `None` when indeterminate.
    pub contribution: Option<f64>,
    pub weight: f64,
    /// Why the rule could not be scored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RuleResult {
    pub fn is_indeterminate(&self) -> bool {
        self.status == RuleStatus::Indeterminate
    }
}

/// Gate outcome at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateVerdict {
    /// Weighted composite in [0, 100]; `None` when no rule was evaluable.
    pub score: Option<f64>,
    pub status: OverallStatus,
    pub target: TargetScores,
    /// Enabled rules, in configuration order.
    pub rules: Vec<RuleResult>,
}

impl GateVerdict {
    pub fn is_indeterminate(&self) -> bool {
        self.score.is_none()
    }

    pub fn rule(&self, id: &str) -> Option<&RuleResult> {
        self.rules.iter().find(|r| r.id == id)
    }

    /// Count of rules per status, in `Pass, Warning, Fail, Indeterminate` order.
    pub fn status_counts(&self) -> [usize; 4] {
        let mut counts = [0; 4];
        for r in &self.rules {
            let idx = match r.status {
                RuleStatus::Pass => 0,
                RuleStatus::Warning => 1,
                RuleStatus::Fail => 2,
                RuleStatus::Indeterminate => 3,
            };
            counts[idx] += 1;
        }
        counts
    }
}
