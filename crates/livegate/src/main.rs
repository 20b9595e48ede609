//! livegate: quality-gate scoring for load-test results.
//!
//! Replays a recorded JTL file through the same engine a live run uses
//! and reports the gate verdict:
//! - Configuration loading (TOML or legacy rule list)
//! - Sample ingestion and aggregation
//! - Host resource sampling for the duration of the replay
//! - Weighted gate evaluation
//!
//! # Usage
//!
//! ```text
//! livegate replay --config gate.toml --samples results.jtl --format json
//! livegate check --config gate.toml
//! ```
//!
//! `replay` exits 0 on Pass, 1 on Warning and 2 on Fail.

mod replay;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use crate::replay::{OutputFormat, ReplayOptions};

#[derive(Parser)]
#[command(name = "livegate", about = "Live load-test quality gate")]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Score a recorded run against a gate configuration.
    Replay {
        /// Gate configuration file.
        #[arg(long)]
        config: PathBuf,

        /// Recorded samples (JTL CSV).
        #[arg(long)]
        samples: PathBuf,

        /// Treat the config file as a legacy pipe-delimited rule list.
        #[arg(long)]
        legacy: bool,

        /// Verdict output format.
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Shorthand for `--format json`.
        #[arg(long)]
        json: bool,

        /// Throughput bucket width in milliseconds.
        #[arg(long, default_value = "1000")]
        bucket_ms: u64,

        /// Minimum milliseconds between host resource probes.
        #[arg(long, default_value = "5000")]
        sample_interval_ms: u64,

        /// Also write host resource rows sampled during the replay.
        #[arg(long)]
        resources_out: Option<PathBuf>,
    },

    /// Validate a gate configuration and print its rules.
    Check {
        /// Gate configuration file.
        #[arg(long)]
        config: PathBuf,

        /// Treat the config file as a legacy pipe-delimited rule list.
        #[arg(long)]
        legacy: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Replay {
            config,
            samples,
            legacy,
            format,
            json,
            bucket_ms,
            sample_interval_ms,
            resources_out,
        } => {
            let options = ReplayOptions {
                config,
                samples,
                legacy,
                format: if json { OutputFormat::Json } else { format },
                bucket_ms,
                sample_interval_ms,
                resources_out,
            };
            let (verdict, output) = replay::run(&options).await?;
            println!("{output}");
            Ok(ExitCode::from(verdict.status.exit_code() as u8))
        }
        Command::Check { config, legacy } => {
            let gate = replay::load_config(&config, legacy)?;
            info!(path = %config.display(), rules = gate.rules().len(), "configuration valid");
            print!("{}", replay::describe_config(&gate));
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,livegate=debug"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
