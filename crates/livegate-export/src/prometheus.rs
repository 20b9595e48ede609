//! Prometheus text exposition format.
//!
//! Renders aggregate snapshots, host resources and the current verdict
//! into the Prometheus text exposition format for scraping by a
//! Prometheus server or compatible agent.

use std::fmt::Write;

use livegate_core::ResourceSnapshot;
use livegate_eval::GateVerdict;
use livegate_metrics::{AggregateView, StoreSnapshot};

/// Render aggregates for every label as GAUGE metrics with `label` labels.
pub fn render_aggregates(snapshot: &StoreSnapshot) -> String {
    let mut out = String::new();

    header(&mut out, "livegate_samples_total", "Samples ingested in this run.", "counter");
    let _ = writeln!(out, "livegate_samples_total {}", snapshot.stats.samples_ingested);
    header(
        &mut out,
        "livegate_samples_clamped_total",
        "Samples with negative elapsed time clamped to zero.",
        "counter",
    );
    let _ = writeln!(out, "livegate_samples_clamped_total {}", snapshot.stats.samples_clamped);

    let families: [(&str, &str, fn(&AggregateView) -> f64); 6] = [
        ("livegate_response_time_avg_ms", "Mean response time in milliseconds.", |v| v.mean),
        ("livegate_response_time_max_ms", "Max response time in milliseconds.", |v| v.max),
        ("livegate_response_time_p90_ms", "P90 response time in milliseconds.", |v| v.p90),
        ("livegate_response_time_p95_ms", "P95 response time in milliseconds.", |v| v.p95),
        ("livegate_response_time_p99_ms", "P99 response time in milliseconds.", |v| v.p99),
        ("livegate_response_count", "Completed samples.", |v| v.count as f64),
    ];
    for (name, help, value) in families {
        header(&mut out, name, help, "gauge");
        for (label, view) in &snapshot.labels {
            let _ = writeln!(out, "{name}{{label=\"{}\"}} {:.2}", escape(label), value(&view.response_time));
        }
    }

    header(&mut out, "livegate_error_rate", "Error rate (0.0-1.0).", "gauge");
    for (label, view) in &snapshot.labels {
        let _ = writeln!(
            out,
            "livegate_error_rate{{label=\"{}\"}} {:.4}",
            escape(label),
            view.error_rate.mean
        );
    }

    header(
        &mut out,
        "livegate_throughput_avg_rps",
        "Mean requests per second over closed buckets.",
        "gauge",
    );
    for (label, view) in &snapshot.labels {
        let _ = writeln!(
            out,
            "livegate_throughput_avg_rps{{label=\"{}\"}} {:.2}",
            escape(label),
            view.throughput.mean
        );
    }

    out
}

/// Render host CPU and memory gauges.
pub fn render_resources(snapshot: &ResourceSnapshot) -> String {
    let mut out = String::new();
    header(&mut out, "livegate_cpu_usage_percent", "Host CPU busy percent.", "gauge");
    let _ = writeln!(out, "livegate_cpu_usage_percent {:.2}", snapshot.cpu_percent);
    header(&mut out, "livegate_memory_usage_percent", "Host memory used percent.", "gauge");
    let _ = writeln!(out, "livegate_memory_usage_percent {:.2}", snapshot.memory_percent);
    header(&mut out, "livegate_memory_used_mb", "Host memory in use, MB.", "gauge");
    let _ = writeln!(out, "livegate_memory_used_mb {}", snapshot.used_memory_mb);
    header(&mut out, "livegate_memory_available_mb", "Host memory available, MB.", "gauge");
    let _ = writeln!(out, "livegate_memory_available_mb {}", snapshot.available_memory_mb);
    out
}

/// Render the composite score and per-rule contributions.
///
/// An indeterminate score is exposed as `NaN`.
pub fn render_verdict(verdict: &GateVerdict) -> String {
    let mut out = String::new();
    header(&mut out, "livegate_gate_score", "Composite quality-gate score (0-100).", "gauge");
    let _ = writeln!(out, "livegate_gate_score {}", format_score(verdict.score));

    header(
        &mut out,
        "livegate_gate_status",
        "Overall gate status: 0 pass, 1 warning, 2 fail.",
        "gauge",
    );
    let _ = writeln!(out, "livegate_gate_status {}", verdict.status.exit_code());

    header(
        &mut out,
        "livegate_rule_contribution",
        "Per-rule score contribution (0-100).",
        "gauge",
    );
    for r in &verdict.rules {
        let _ = writeln!(
            out,
            "livegate_rule_contribution{{rule=\"{}\",metric=\"{}\",status=\"{}\"}} {}",
            escape(&r.id),
            r.metric,
            r.status,
            format_score(r.contribution)
        );
    }
    out
}

fn header(out: &mut String, name: &str, help: &str, kind: &str) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} {kind}");
}

fn format_score(score: Option<f64>) -> String {
    score.map_or_else(|| "NaN".to_string(), |s| format!("{s:.2}"))
}

fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
