//! Gate evaluator: applies rules to aggregate snapshots.
//!
//! Takes point-in-time views of the aggregate store and the resource
//! history and scores every enabled rule against them. A rule that
//! cannot be resolved is reported as indeterminate and left out of the
//! composite; it never aborts the evaluation of other rules.

use tracing::debug;

use livegate_core::{ALL_LABELS, GateConfig, GateRule};
use livegate_metrics::{MetricKey, StoreSnapshot};
use livegate_resources::ResourceHistoryView;

use crate::verdict::{GateVerdict, OverallStatus, RuleResult, RuleStatus};

/// Contribution of a passing rule.
pub const FULL_SCORE: f64 = 100.0;

/// Stateless scorer over snapshots.
#[derive(Debug, Clone, Copy, Default)]
pub struct GateEvaluator;

impl GateEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Score every enabled rule in `config` and combine the results.
    ///
    /// Disabled rules are omitted from the verdict entirely.
    pub fn evaluate(
        &self,
        config: &GateConfig,
        store: &StoreSnapshot,
        resources: &ResourceHistoryView,
    ) -> GateVerdict {
        let rules: Vec<RuleResult> = config
            .rules()
            .iter()
            .enumerate()
            .filter(|(_, rule)| rule.enabled)
            .map(|(index, rule)| self.evaluate_rule(index, rule, store, resources))
            .collect();

        let score = composite_score(&rules);
        let target = config.target();
        let status = OverallStatus::from_score(score, target);

        debug!(
            score = score.unwrap_or(f64::NAN),
            %status,
            rules = rules.len(),
            "gate evaluated"
        );

        GateVerdict {
            score,
            status,
            target,
            rules,
        }
    }

    /// Score one rule. Never fails: unresolvable rules come back indeterminate.
    pub fn evaluate_rule(
        &self,
        index: usize,
        rule: &GateRule,
        store: &StoreSnapshot,
        resources: &ResourceHistoryView,
    ) -> RuleResult {
        let id = rule.display_id(index);
        let label = if rule.metric.is_resource() {
            None
        } else {
            rule.label.clone()
        };
        let mut result = RuleResult {
            id,
            metric: rule.metric,
            label,
            aggregate: rule.aggregate,
            operator: rule.operator,
            observed: None,
            status: RuleStatus::Indeterminate,
            contribution: None,
            weight: rule.weight,
            reason: None,
        };

        let observed = match resolve_observed(rule, store, resources) {
            Ok(v) => v,
            Err(reason) => {
                debug!(rule = %result.id, %reason, "rule indeterminate");
                result.reason = Some(reason);
                return result;
            }
        };
        let Some(pass) = rule.pass else {
            result.observed = Some(observed);
            result.reason = Some("no pass threshold".to_string());
            return result;
        };

        let (status, contribution) = classify(rule, observed, pass);
        result.observed = Some(observed);
        result.status = status;
        result.contribution = Some(contribution);
        debug!(
            rule = %result.id,
            metric = %rule.metric,
            observed,
            status = %status,
            contribution,
            "rule evaluated"
        );
        result
    }
}

/// Look up the value a rule compares against its thresholds.
fn resolve_observed(
    rule: &GateRule,
    store: &StoreSnapshot,
    resources: &ResourceHistoryView,
) -> Result<f64, String> {
    let view = if rule.metric.is_resource() {
        resources
            .metric(rule.metric)
            .copied()
            .ok_or_else(|| format!("{} has no resource history", rule.metric))?
    } else {
        let label = rule.label.as_deref().unwrap_or(ALL_LABELS);
        store
            .get(&MetricKey::new(label, rule.metric))
            .ok_or_else(|| format!("no samples for label '{label}'"))?
    };

    let value = view
        .value(rule.aggregate)
        .ok_or_else(|| format!("{} has no observations", rule.metric))?;
    if !value.is_finite() {
        return Err(format!("{} {} is not finite", rule.metric, rule.aggregate));
    }
    Ok(value)
}

/// Compare `observed` to the rule's thresholds.
///
/// Equality with the pass threshold passes and equality with the warning
/// threshold warns. A warning contributes linearly: 100 at the pass
/// threshold falling to 0 at the warning threshold.
fn classify(rule: &GateRule, observed: f64, pass: f64) -> (RuleStatus, f64) {
    if rule.operator.satisfies(observed, pass) {
        return (RuleStatus::Pass, FULL_SCORE);
    }
    match rule.warning {
        Some(warning) if rule.operator.satisfies(observed, warning) => {
            let span = warning - pass;
            let contribution = if span == 0.0 {
                0.0
            } else {
                FULL_SCORE * (warning - observed) / span
            };
            (RuleStatus::Warning, contribution.clamp(0.0, FULL_SCORE))
        }
        _ => (RuleStatus::Fail, 0.0),
    }
}

/// Weighted mean of contributions over evaluable rules.
///
/// `None` when no rule was evaluable or every evaluable rule has zero weight.
pub fn composite_score(rules: &[RuleResult]) -> Option<f64> {
    let (weighted, total_weight) = rules
        .iter()
        .filter_map(|r| r.contribution.map(|c| (c, r.weight)))
        .fold((0.0, 0.0), |(sum, total), (c, w)| (sum + c * w, total + w));
    if total_weight <= 0.0 {
        return None;
    }
    Some((weighted / total_weight).clamp(0.0, FULL_SCORE))
}
