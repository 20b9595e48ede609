//! `replay` and `check` subcommands.

use std::fmt::Write as _;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use tracing::info;

use livegate_core::{GateConfig, TargetScores};
use livegate_eval::GateVerdict;
use livegate_metrics::IngestConfig;
use livegate_service::{Fanout, QualityGateService, ResourceRecorder, RunListener, ServiceConfig};

/// How the verdict is printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Prometheus,
}

#[derive(Debug, Clone)]
pub struct ReplayOptions {
    pub config: PathBuf,
    pub samples: PathBuf,
    pub legacy: bool,
    pub format: OutputFormat,
    pub bucket_ms: u64,
    pub sample_interval_ms: u64,
    pub resources_out: Option<PathBuf>,
}

/// Load a TOML configuration, or a legacy rule list with default targets.
pub fn load_config(path: &Path, legacy: bool) -> anyhow::Result<GateConfig> {
    if !legacy {
        return GateConfig::from_file(path)
            .with_context(|| format!("loading gate configuration {}", path.display()));
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading legacy rules {}", path.display()))?;
    let rules = GateConfig::parse_legacy_rules(&content)?;
    Ok(GateConfig::new(TargetScores::default(), rules)?)
}

/// Replay a recorded run and render the final verdict.
pub async fn run(options: &ReplayOptions) -> anyhow::Result<(GateVerdict, String)> {
    let config = load_config(&options.config, options.legacy)?;
    let file = File::open(&options.samples)
        .with_context(|| format!("opening samples {}", options.samples.display()))?;
    let samples = livegate_export::read_samples(BufReader::new(file))
        .with_context(|| format!("parsing samples {}", options.samples.display()))?;
    info!(
        samples = samples.len(),
        rules = config.rules().len(),
        "replaying recorded run"
    );

    let mut settings = ServiceConfig {
        ingest: IngestConfig {
            throughput_bucket: Duration::from_millis(options.bucket_ms.max(1)),
        },
        ..ServiceConfig::default()
    };
    settings.sampler.interval = Duration::from_millis(options.sample_interval_ms);

    // Recorders open their files before sampling starts.
    let mut service = QualityGateService::new(config, settings);
    let mut recorders = Fanout::new();
    if let Some(path) = &options.resources_out {
        let recorder = Arc::new(ResourceRecorder::new(path));
        service = service.with_snapshot_callback(recorder.callback());
        recorders = recorders.with(recorder);
    }

    recorders.on_run_start();
    service.start_run();
    for sample in &samples {
        service.ingest(sample);
    }
    let verdict = service.end_run();
    recorders.on_run_end();
    service.shutdown().await;

    let output = render(&service, &verdict, options.format)?;
    Ok((verdict, output))
}

fn render(service: &QualityGateService, verdict: &GateVerdict, format: OutputFormat) -> anyhow::Result<String> {
    Ok(match format {
        OutputFormat::Json => livegate_export::verdict_json(verdict)?,
        OutputFormat::Prometheus => {
            let mut out = livegate_export::render_aggregates(&service.aggregates());
            out.push_str(&livegate_export::render_resources(&service.sampler().cached()));
            out.push_str(&livegate_export::render_verdict(verdict));
            out
        }
        OutputFormat::Text => describe_verdict(verdict),
    })
}

/// Human-readable verdict table.
pub fn describe_verdict(verdict: &GateVerdict) -> String {
    let mut out = String::new();
    let score = verdict
        .score
        .map_or_else(|| "n/a".to_string(), |s| format!("{s:.2}"));
    let _ = writeln!(
        out,
        "Quality gate: {} (score {}, targets pass {:.0} / warning {:.0})",
        verdict.status, score, verdict.target.pass, verdict.target.warning
    );
    for r in &verdict.rules {
        let observed = r.observed.map_or_else(|| "-".to_string(), |v| format!("{v:.3}"));
        let contribution = r.contribution.map_or_else(|| "-".to_string(), |c| format!("{c:.1}"));
        let _ = writeln!(
            out,
            "  {:<16} {:<13} {:<5} {:<2} observed {:>12}  {:<13} contribution {:>5}  weight {:.2}",
            r.id,
            r.metric.as_str(),
            r.aggregate.as_str(),
            r.operator.as_str(),
            observed,
            r.status.as_str(),
            contribution,
            r.weight
        );
        if let Some(reason) = &r.reason {
            let _ = writeln!(out, "      {reason}");
        }
    }
    out
}

/// Human-readable listing of a validated configuration.
pub fn describe_config(config: &GateConfig) -> String {
    let mut out = String::new();
    let target = config.target();
    let _ = writeln!(out, "Targets: pass {:.2}, warning {:.2}", target.pass, target.warning);
    for (index, rule) in config.rules().iter().enumerate() {
        let fmt_opt = |v: Option<f64>| v.map_or_else(|| "null".to_string(), |v| v.to_string());
        let _ = writeln!(
            out,
            "  {:<16} {} {} {} {} pass {} warning {} weight {}{}",
            rule.display_id(index),
            if rule.enabled { "on " } else { "off" },
            rule.metric,
            rule.aggregate,
            rule.operator,
            fmt_opt(rule.pass),
            fmt_opt(rule.warning),
            rule.weight,
            rule.label
                .as_deref()
                .map(|l| format!(" label {l}"))
                .unwrap_or_default(),
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use livegate_core::Sample;
    use livegate_eval::OverallStatus;
    use livegate_export::JtlWriter;

    const GATE: &str = r#"
[target]
pass = 80.0
warning = 40.0

[[rules]]
id = "latency"
metric = "Response Time"
aggregate = "Avg"
operator = "<"
pass = 1000.0

[[rules]]
id = "errors"
metric = "Error Rate"
operator = "<="
pass = 0.05
"#;

    fn write_samples(path: &Path, samples: &[Sample]) {
        let mut w = JtlWriter::new(File::create(path).unwrap());
        for s in samples {
            w.write_sample(s).unwrap();
        }
        w.flush().unwrap();
    }

    fn options(dir: &Path, format: OutputFormat) -> ReplayOptions {
        ReplayOptions {
            config: dir.join("gate.toml"),
            samples: dir.join("results.jtl"),
            legacy: false,
            format,
            bucket_ms: 1000,
            sample_interval_ms: 5000,
            resources_out: None,
        }
    }

    #[tokio::test]
    async fn replay_scores_recorded_run() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("gate.toml"), GATE).unwrap();
        write_samples(
            &dir.path().join("results.jtl"),
            &[
                Sample::new("login", 0, 500, true),
                Sample::new("login", 100, 1500, false),
            ],
        );

        let (verdict, output) = run(&options(dir.path(), OutputFormat::Text)).await.unwrap();

        assert_eq!(verdict.score, Some(50.0));
        assert_eq!(verdict.status, OverallStatus::Warning);
        assert_eq!(verdict.status.exit_code(), 1);
        assert!(output.starts_with("Quality gate: Warning (score 50.00"), "{output}");
        assert!(output.contains("latency"));
    }

    #[tokio::test]
    async fn replay_json_output() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("gate.toml"), GATE).unwrap();
        write_samples(&dir.path().join("results.jtl"), &[Sample::new("a", 0, 100, true)]);

        let (verdict, output) = run(&options(dir.path(), OutputFormat::Json)).await.unwrap();
        assert_eq!(verdict.status, OverallStatus::Pass);
        assert!(output.starts_with(r#"{"score":100.0,"status":"Pass","indeterminate":false"#), "{output}");
    }

    #[tokio::test]
    async fn replay_writes_resource_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("gate.toml"), GATE).unwrap();
        write_samples(&dir.path().join("results.jtl"), &[Sample::new("a", 0, 100, true)]);

        let mut opts = options(dir.path(), OutputFormat::Prometheus);
        opts.resources_out = Some(dir.path().join("system_metrics.csv"));
        let (_, output) = run(&opts).await.unwrap();

        assert!(output.contains("livegate_gate_score 100.00"));
        let csv = std::fs::read_to_string(dir.path().join("system_metrics.csv")).unwrap();
        assert!(csv.starts_with(livegate_export::RESOURCE_HEADER));
    }

    #[tokio::test]
    async fn replay_missing_samples_errors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("gate.toml"), GATE).unwrap();
        let err = run(&options(dir.path(), OutputFormat::Text)).await.unwrap_err();
        assert!(err.to_string().contains("opening samples"));
    }

    #[test]
    fn check_legacy_rules() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gate.rules");
        std::fs::write(&path, "true|Response Time|90Pct|<|800|1200|0.7\nfalse|Error Rate|Avg|<=|0.01|null|0.3\n").unwrap();

        let config = load_config(&path, true).unwrap();
        assert_eq!(config.rules().len(), 2);
        assert_eq!(config.target(), TargetScores::default());

        let listing = describe_config(&config);
        assert!(listing.contains("rule-1"));
        assert!(listing.contains("90Pct"));
        assert!(listing.contains("warning null"));
    }

    #[test]
    fn check_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gate.toml");
        std::fs::write(&path, "[[rules]]\nmetric = \"Response Time\"\nweight = 2.0\npass = 1.0\n").unwrap();
        assert!(load_config(&path, false).is_err());
    }
}
