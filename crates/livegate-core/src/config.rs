//! Quality gate configuration: rules, target scores, validation.
//!
//! A [`GateConfig`] can only be built through validation, so every
//! instance that reaches the evaluator is well-formed. Configuration is
//! read from TOML:
//!
//! ```toml
//! [target]
//! pass = 80
//! warning = 60
//!
//! [[rules]]
//! metric = "Response Time"
//! aggregate = "95Pct"
//! operator = "<"
//! pass = 1000
//! warning = 2000
//! weight = 1.0
//! ```
//!
//! The legacy single-property format (`enabled|metric|aggregate|operator|pass|warning|weight`
//! per line) is also understood.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::types::{AggregateKind, Operator, SampleMetric};

/// Weights this close outside [0, 1] are treated as float noise and clamped.
const WEIGHT_TOLERANCE: f64 = 1e-6;

pub const DEFAULT_PASS_SCORE: f64 = 80.0;
pub const DEFAULT_WARNING_SCORE: f64 = 60.0;

/// One threshold check contributing to the composite score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateRule {
    /// Stable identifier; assigned as `rule-N` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub metric: SampleMetric,
    /// Restrict the rule to one sample label. Absent means all labels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub aggregate: AggregateKind,
    #[serde(default)]
    pub operator: Operator,
    #[serde(default, alias = "passValue", skip_serializing_if = "Option::is_none")]
    pub pass: Option<f64>,
    #[serde(default, alias = "warningValue", skip_serializing_if = "Option::is_none")]
    pub warning: Option<f64>,
    #[serde(default = "default_weight", alias = "weightage")]
    pub weight: f64,
}

fn default_enabled() -> bool {
    true
}

fn default_weight() -> f64 {
    1.0
}

impl Default for GateRule {
    fn default() -> Self {
        Self {
            id: None,
            enabled: true,
            metric: SampleMetric::ResponseTime,
            label: None,
            aggregate: AggregateKind::Avg,
            operator: Operator::Lt,
            pass: Some(1000.0),
            warning: Some(2000.0),
            weight: 1.0,
        }
    }
}

impl GateRule {
    /// Identifier used in verdicts. Falls back to the 1-based position.
    pub fn display_id(&self, index: usize) -> String {
        self.id.clone().unwrap_or_else(|| format!("rule-{}", index + 1))
    }

    /// Validate this rule and normalize its weight.
    ///
    /// Disabled rules only need well-formed numbers; enabled rules also
    /// need a pass threshold and a warning threshold on the failing side.
    pub fn validate(&mut self, id: &str) -> ConfigResult<()> {
        for (field, value) in [("pass", self.pass), ("warning", self.warning)] {
            if let Some(v) = value
                && !v.is_finite()
            {
                return Err(ConfigError::NonFiniteThreshold {
                    rule: id.to_string(),
                    field,
                });
            }
        }

        if !self.weight.is_finite()
            || self.weight < -WEIGHT_TOLERANCE
            || self.weight > 1.0 + WEIGHT_TOLERANCE
        {
            return Err(ConfigError::WeightOutOfRange {
                rule: id.to_string(),
                weight: self.weight,
            });
        }
        self.weight = self.weight.clamp(0.0, 1.0);

        if !self.enabled {
            return Ok(());
        }

        let pass = self.pass.ok_or_else(|| ConfigError::MissingPassThreshold {
            rule: id.to_string(),
        })?;

        if let Some(warning) = self.warning {
            let looser = if self.operator.lower_is_better() {
                warning >= pass
            } else {
                warning <= pass
            };
            if !looser {
                return Err(ConfigError::WarningStricterThanPass {
                    rule: id.to_string(),
                    pass,
                    warning,
                });
            }
        }

        Ok(())
    }
}

/// Composite-score targets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetScores {
    #[serde(alias = "passScore")]
    pub pass: f64,
    #[serde(alias = "warningScore")]
    pub warning: f64,
}

impl Default for TargetScores {
    fn default() -> Self {
        Self {
            pass: DEFAULT_PASS_SCORE,
            warning: DEFAULT_WARNING_SCORE,
        }
    }
}

impl TargetScores {
    /// Build validated targets: both within [0, 100], pass above warning.
    pub fn new(pass: f64, warning: f64) -> ConfigResult<Self> {
        for (name, value) in [("pass", pass), ("warning", warning)] {
            if !value.is_finite() || !(0.0..=100.0).contains(&value) {
                return Err(ConfigError::TargetScoreOutOfRange { name, value });
            }
        }
        if pass <= warning {
            return Err(ConfigError::TargetScoreOrder { pass, warning });
        }
        Ok(Self { pass, warning })
    }
}

/// On-disk shape, validated into [`GateConfig`].
#[derive(Debug, Clone, Default, Deserialize)]
struct GateConfigFile {
    #[serde(default)]
    target: TargetScores,
    #[serde(default)]
    rules: Vec<GateRule>,
}

/// Validated rule set plus target scores.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateConfig {
    target: TargetScores,
    rules: Vec<GateRule>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            target: TargetScores::default(),
            rules: vec![GateRule {
                id: Some("rule-1".to_string()),
                ..GateRule::default()
            }],
        }
    }
}

impl GateConfig {
    /// Validate rules and targets. Every rule gets an id.
    pub fn new(target: TargetScores, rules: Vec<GateRule>) -> ConfigResult<Self> {
        let target = TargetScores::new(target.pass, target.warning)?;
        let rules = validate_rules(rules)?;
        Ok(Self { target, rules })
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let file: GateConfigFile = toml::from_str(content)?;
        Self::new(file.target, file.rules)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_toml_str(&content)?)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn target(&self) -> TargetScores {
        self.target
    }

    pub fn rules(&self) -> &[GateRule] {
        &self.rules
    }

    /// Replace the rule set, keeping targets. Nothing changes on error.
    pub fn with_rules(&self, rules: Vec<GateRule>) -> ConfigResult<Self> {
        Ok(Self {
            target: self.target,
            rules: validate_rules(rules)?,
        })
    }

    /// Replace the targets, keeping rules. Nothing changes on error.
    pub fn with_target(&self, pass: f64, warning: f64) -> ConfigResult<Self> {
        Ok(Self {
            target: TargetScores::new(pass, warning)?,
            rules: self.rules.clone(),
        })
    }

    /// Parse the legacy pipe-delimited rule list.
    ///
    /// Lines with fewer than seven fields are skipped, blank lines ignored.
    pub fn parse_legacy_rules(content: &str) -> ConfigResult<Vec<GateRule>> {
        let mut rules = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let parts: Vec<&str> = line.split('|').collect();
            if parts.len() < 7 {
                continue;
            }
            let legacy = |reason: String| ConfigError::Legacy {
                line: idx + 1,
                reason,
            };
            let threshold = |raw: &str| -> ConfigResult<Option<f64>> {
                match raw.trim() {
                    "null" | "" => Ok(None),
                    v => v
                        .parse::<f64>()
                        .map(Some)
                        .map_err(|e| legacy(format!("bad threshold {v:?}: {e}"))),
                }
            };

            let weight = parts[6]
                .trim()
                .parse::<f64>()
                .map_err(|e| legacy(format!("bad weight {:?}: {e}", parts[6])))?;

            rules.push(GateRule {
                id: None,
                enabled: parts[0].trim().eq_ignore_ascii_case("true"),
                metric: parts[1].parse()?,
                label: None,
                aggregate: parts[2].parse()?,
                operator: parts[3].parse()?,
                pass: threshold(parts[4])?,
                warning: threshold(parts[5])?,
                weight,
            });
        }
        Ok(rules)
    }

    /// Render rules in the legacy pipe-delimited format.
    pub fn to_legacy_rules(&self) -> String {
        let mut out = String::new();
        for rule in &self.rules {
            let threshold = |v: Option<f64>| v.map_or_else(|| "null".to_string(), |v| format!("{v:?}"));
            out.push_str(&format!(
                "{}|{}|{}|{}|{}|{}|{:?}\n",
                rule.enabled,
                rule.metric,
                rule.aggregate,
                rule.operator,
                threshold(rule.pass),
                threshold(rule.warning),
                rule.weight,
            ));
        }
        out
    }
}

fn validate_rules(mut rules: Vec<GateRule>) -> ConfigResult<Vec<GateRule>> {
    let mut seen = HashSet::new();
    for (index, rule) in rules.iter_mut().enumerate() {
        let id = rule.display_id(index);
        rule.validate(&id)?;
        if !seen.insert(id.clone()) {
            return Err(ConfigError::DuplicateRuleId(id));
        }
        rule.id = Some(id);
    }
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(metric: SampleMetric, op: Operator, pass: Option<f64>, warning: Option<f64>) -> GateRule {
        GateRule {
            metric,
            operator: op,
            pass,
            warning,
            ..GateRule::default()
        }
    }

    #[test]
    fn parse_toml_with_defaults() {
        let config = GateConfig::from_toml_str(
            r#"
[[rules]]
metric = "Response Time"
pass = 1000
"#,
        )
        .unwrap();

        assert_eq!(config.target(), TargetScores::default());
        let r = &config.rules()[0];
        assert_eq!(r.id.as_deref(), Some("rule-1"));
        assert!(r.enabled);
        assert_eq!(r.aggregate, AggregateKind::Avg);
        assert_eq!(r.operator, Operator::Lt);
        assert_eq!(r.warning, None);
        assert_eq!(r.weight, 1.0);
    }

    #[test]
    fn parse_toml_with_ui_field_names() {
        let config = GateConfig::from_toml_str(
            r#"
[target]
passScore = 90
warningScore = 50

[[rules]]
id = "errors"
metric = "Error Rate"
aggregate = "Avg"
operator = "<="
passValue = 0.01
warningValue = 0.05
weightage = 0.5
"#,
        )
        .unwrap();
        assert_eq!(config.target().pass, 90.0);
        let r = &config.rules()[0];
        assert_eq!(r.id.as_deref(), Some("errors"));
        assert_eq!(r.metric, SampleMetric::ErrorRate);
        assert_eq!(r.weight, 0.5);
    }

    #[test]
    fn enabled_rule_requires_pass_threshold() {
        let err = GateConfig::new(
            TargetScores::default(),
            vec![rule(SampleMetric::ResponseTime, Operator::Lt, None, Some(10.0))],
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingPassThreshold { .. }));
    }

    #[test]
    fn disabled_rule_may_omit_thresholds() {
        let mut r = rule(SampleMetric::ResponseTime, Operator::Lt, None, None);
        r.enabled = false;
        let config = GateConfig::new(TargetScores::default(), vec![r]).unwrap();
        assert_eq!(config.rules().len(), 1);
    }

    #[test]
    fn weight_out_of_range_is_rejected() {
        let mut r = rule(SampleMetric::ResponseTime, Operator::Lt, Some(1.0), None);
        r.weight = 1.5;
        let err = GateConfig::new(TargetScores::default(), vec![r]).unwrap_err();
        assert!(matches!(err, ConfigError::WeightOutOfRange { .. }));
    }

    #[test]
    fn weight_noise_is_clamped() {
        let mut r = rule(SampleMetric::ResponseTime, Operator::Lt, Some(1.0), None);
        r.weight = 1.0 + 1e-9;
        let config = GateConfig::new(TargetScores::default(), vec![r]).unwrap();
        assert_eq!(config.rules()[0].weight, 1.0);
    }

    #[test]
    fn non_finite_threshold_is_rejected() {
        let r = rule(SampleMetric::ResponseTime, Operator::Lt, Some(f64::NAN), None);
        let err = GateConfig::new(TargetScores::default(), vec![r]).unwrap_err();
        assert!(matches!(err, ConfigError::NonFiniteThreshold { field: "pass", .. }));
    }

    #[test]
    fn warning_must_be_looser_than_pass() {
        let lower = rule(SampleMetric::ResponseTime, Operator::Lt, Some(1000.0), Some(500.0));
        assert!(matches!(
            GateConfig::new(TargetScores::default(), vec![lower]).unwrap_err(),
            ConfigError::WarningStricterThanPass { .. }
        ));

        let higher = rule(SampleMetric::Throughput, Operator::Gt, Some(100.0), Some(50.0));
        assert!(GateConfig::new(TargetScores::default(), vec![higher]).is_ok());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut a = rule(SampleMetric::ResponseTime, Operator::Lt, Some(1.0), None);
        a.id = Some("rule-2".to_string());
        let b = rule(SampleMetric::ResponseTime, Operator::Lt, Some(1.0), None);
        let err = GateConfig::new(TargetScores::default(), vec![a, b]).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateRuleId(id) if id == "rule-2"));
    }

    #[test]
    fn target_scores_validation() {
        assert!(TargetScores::new(80.0, 40.0).is_ok());
        assert!(matches!(
            TargetScores::new(101.0, 40.0).unwrap_err(),
            ConfigError::TargetScoreOutOfRange { name: "pass", .. }
        ));
        assert!(matches!(
            TargetScores::new(50.0, 50.0).unwrap_err(),
            ConfigError::TargetScoreOrder { .. }
        ));
    }

    #[test]
    fn with_rules_keeps_old_config_on_error() {
        let config = GateConfig::default();
        let bad = rule(SampleMetric::ResponseTime, Operator::Lt, None, None);
        assert!(config.with_rules(vec![bad]).is_err());
        assert_eq!(config.rules().len(), 1);
    }

    #[test]
    fn legacy_format_round_trip() {
        let legacy = "true|Response Time|95Pct|<|1000.0|2000.0|1.0\n\
                      false|Error Rate|Avg|<=|null|null|0.5\n\
                      \n\
                      garbage line\n";
        let rules = GateConfig::parse_legacy_rules(legacy).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].aggregate, AggregateKind::Pct95);
        assert_eq!(rules[1].pass, None);
        assert!(!rules[1].enabled);

        let config = GateConfig::new(TargetScores::default(), rules).unwrap();
        let rendered = config.to_legacy_rules();
        assert_eq!(
            rendered,
            "true|Response Time|95Pct|<|1000.0|2000.0|1.0\nfalse|Error Rate|Avg|<=|null|null|0.5\n"
        );
    }

    #[test]
    fn legacy_bad_number_reports_line() {
        let err = GateConfig::parse_legacy_rules("true|Throughput|Avg|>|fast|null|1.0").unwrap_err();
        assert!(matches!(err, ConfigError::Legacy { line: 1, .. }));
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gate.toml");
        std::fs::write(
            &path,
            "[[rules]]\nmetric = \"CPU Usage\"\naggregate = \"Max\"\npass = 80\nwarning = 95\n",
        )
        .unwrap();
        let config = GateConfig::from_file(&path).unwrap();
        assert_eq!(config.rules()[0].metric, SampleMetric::CpuUsage);

        let rendered = config.to_toml_string().unwrap();
        let again = GateConfig::from_toml_str(&rendered).unwrap();
        assert_eq!(again, config);
    }
}
