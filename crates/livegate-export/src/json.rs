//! Compact JSON encodings for a polling dashboard.
//!
//! Field names are part of the dashboard contract and must not change.

use serde::Serialize;

use livegate_core::{GateConfig, ResourceSnapshot, TargetScores};
use livegate_eval::{GateVerdict, RuleResult};

use crate::error::ExportResult;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SystemMetricsBody {
    timestamp: u64,
    cpu_usage: f64,
    memory_usage: f64,
    #[serde(rename = "usedMemoryMB")]
    used_memory_mb: u64,
    #[serde(rename = "availableMemoryMB")]
    available_memory_mb: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GateRuleBody<'a> {
    enabled: bool,
    metric: &'a str,
    aggregate: &'a str,
    operator: &'a str,
    pass_value: Option<f64>,
    warning_value: Option<f64>,
    weightage: f64,
}

#[derive(Debug, Serialize)]
struct QualityGateBody<'a> {
    metrics: Vec<GateRuleBody<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TargetScoresBody {
    pass_score: f64,
    warning_score: f64,
}

#[derive(Debug, Serialize)]
struct RuleResultBody<'a> {
    id: &'a str,
    metric: &'a str,
    aggregate: &'a str,
    observed: Option<f64>,
    status: &'a str,
    contribution: Option<f64>,
    weight: f64,
}

#[derive(Debug, Serialize)]
struct VerdictBody<'a> {
    score: Option<f64>,
    status: &'a str,
    indeterminate: bool,
    rules: Vec<RuleResultBody<'a>>,
}

/// `{"timestamp","cpuUsage","memoryUsage","usedMemoryMB","availableMemoryMB"}`.
pub fn system_metrics_json(snapshot: &ResourceSnapshot) -> ExportResult<String> {
    Ok(serde_json::to_string(&SystemMetricsBody {
        timestamp: snapshot.timestamp_ms,
        cpu_usage: round2(snapshot.cpu_percent),
        memory_usage: round2(snapshot.memory_percent),
        used_memory_mb: snapshot.used_memory_mb,
        available_memory_mb: snapshot.available_memory_mb,
    })?)
}

/// `{"metrics":[{"enabled","metric","aggregate","operator","passValue","warningValue","weightage"}]}`.
pub fn quality_gate_json(config: &GateConfig) -> ExportResult<String> {
    let metrics = config
        .rules()
        .iter()
        .map(|r| GateRuleBody {
            enabled: r.enabled,
            metric: r.metric.as_str(),
            aggregate: r.aggregate.as_str(),
            operator: r.operator.as_str(),
            pass_value: r.pass,
            warning_value: r.warning,
            weightage: r.weight,
        })
        .collect();
    Ok(serde_json::to_string(&QualityGateBody { metrics })?)
}

/// `{"passScore","warningScore"}`.
pub fn target_scores_json(target: TargetScores) -> ExportResult<String> {
    Ok(serde_json::to_string(&TargetScoresBody {
        pass_score: round2(target.pass),
        warning_score: round2(target.warning),
    })?)
}

/// `{"score","status","indeterminate","rules":[...]}`.
pub fn verdict_json(verdict: &GateVerdict) -> ExportResult<String> {
    let rules = verdict.rules.iter().map(rule_body).collect();
    Ok(serde_json::to_string(&VerdictBody {
        score: verdict.score.map(round2),
        status: verdict.status.as_str(),
        indeterminate: verdict.is_indeterminate(),
        rules,
    })?)
}

fn rule_body(r: &RuleResult) -> RuleResultBody<'_> {
    RuleResultBody {
        id: &r.id,
        metric: r.metric.as_str(),
        aggregate: r.aggregate.as_str(),
        observed: r.observed,
        status: r.status.as_str(),
        contribution: r.contribution.map(round2),
        weight: r.weight,
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use livegate_core::{GateRule, Operator, SampleMetric};
    use livegate_eval::{OverallStatus, RuleStatus};
    use serde_json::{Value, json};

    #[test]
    fn system_metrics_fields() {
        let snap = ResourceSnapshot {
            timestamp_ms: 1_700_000_000_000,
            cpu_percent: 12.3456,
            memory_percent: 50.0,
            used_memory_mb: 8000,
            available_memory_mb: 8000,
            fresh: true,
        };
        let v: Value = serde_json::from_str(&system_metrics_json(&snap).unwrap()).unwrap();
        assert_eq!(
            v,
            json!({
                "timestamp": 1_700_000_000_000u64,
                "cpuUsage": 12.35,
                "memoryUsage": 50.0,
                "usedMemoryMB": 8000,
                "availableMemoryMB": 8000
            })
        );
    }

    #[test]
    fn quality_gate_uses_ui_vocabulary() {
        let config = GateConfig::new(
            TargetScores::default(),
            vec![GateRule {
                metric: SampleMetric::ErrorRate,
                operator: Operator::Le,
                pass: Some(0.01),
                warning: None,
                weight: 0.5,
                ..GateRule::default()
            }],
        )
        .unwrap();

        let v: Value = serde_json::from_str(&quality_gate_json(&config).unwrap()).unwrap();
        assert_eq!(
            v,
            json!({"metrics": [{
                "enabled": true,
                "metric": "Error Rate",
                "aggregate": "Avg",
                "operator": "<=",
                "passValue": 0.01,
                "warningValue": null,
                "weightage": 0.5
            }]})
        );
    }

    #[test]
    fn target_scores_fields() {
        let s = target_scores_json(TargetScores::default()).unwrap();
        assert_eq!(s, r#"{"passScore":80.0,"warningScore":60.0}"#);
    }

    #[test]
    fn verdict_fields() {
        let verdict = GateVerdict {
            score: Some(66.666_666),
            status: OverallStatus::Warning,
            target: TargetScores::default(),
            rules: vec![RuleResult {
                id: "rule-1".to_string(),
                metric: SampleMetric::ResponseTime,
                label: None,
                aggregate: Default::default(),
                operator: Operator::Lt,
                observed: None,
                status: RuleStatus::Indeterminate,
                contribution: None,
                weight: 1.0,
                reason: Some("no samples".to_string()),
            }],
        };

        let v: Value = serde_json::from_str(&verdict_json(&verdict).unwrap()).unwrap();
        assert_eq!(v["score"], json!(66.67));
        assert_eq!(v["status"], json!("Warning"));
        assert_eq!(v["indeterminate"], json!(false));
        assert_eq!(
            v["rules"][0],
            json!({
                "id": "rule-1",
                "metric": "Response Time",
                "aggregate": "Avg",
                "observed": null,
                "status": "Indeterminate",
                "contribution": null,
                "weight": 1.0
            })
        );
    }

    #[test]
    fn indeterminate_verdict_has_null_score() {
        let verdict = GateVerdict {
            score: None,
            status: OverallStatus::Fail,
            target: TargetScores::default(),
            rules: Vec::new(),
        };
        let v: Value = serde_json::from_str(&verdict_json(&verdict).unwrap()).unwrap();
        assert_eq!(v["score"], Value::Null);
        assert_eq!(v["indeterminate"], json!(true));
    }
}
