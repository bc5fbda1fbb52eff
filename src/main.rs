//! xfinity-usage - CLI entry point.

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;

use xfinity_usage::cli::Cli;
use xfinity_usage::core::{http, logging, metrics::RunMetrics, pipeline};
use xfinity_usage::error::UsageError;

/// Backstop margin added to the run deadline so stage-level timeouts (HTTP
/// client, publisher budget) fire first and unwind cleanly.
const DEADLINE_GRACE: Duration = Duration::from_secs(10);

/// Build information embedded at compile time.
mod build_info {
    /// Rustc version that built the binary.
    pub const RUSTC_SEMVER: &str = env!("VERGEN_RUSTC_SEMVER");
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = cli
        .log_level
        .as_deref()
        .and_then(logging::LogLevel::from_arg)
        .or_else(|| logging::parse_log_level_from_env().map(logging::LogLevel::from_tracing_level))
        .unwrap_or_default();
    let log_format = if cli.json_output {
        logging::LogFormat::Json
    } else {
        logging::parse_log_format_from_env().unwrap_or_default()
    };
    let log_file = logging::parse_log_file_from_env();
    logging::init(log_level, log_format, log_file, cli.verbose);

    let metrics = RunMetrics::new();
    metrics.set_build_info(env!("CARGO_PKG_VERSION"), build_info::RUSTC_SEMVER);
    metrics.record_run_start();

    let start = Instant::now();
    let result = execute(&cli, &metrics).await;
    metrics.observe_execution(start.elapsed());

    if let Err(e) = &result {
        metrics.record_error(e.category());
        metrics.record_failure();
    }

    // Best-effort metrics push regardless of pipeline outcome.
    if let Some(endpoint) = cli.prometheus_endpoint.as_deref().filter(|e| !e.is_empty()) {
        match push_metrics(&metrics, endpoint, &cli.prometheus_job).await {
            Ok(()) => tracing::info!("metrics pushed successfully"),
            Err(e) => {
                metrics.record_error(e.category());
                tracing::error!("failed to push metrics: {e}");
            }
        }
    }

    match result {
        Ok(()) => {
            tracing::info!("all done");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("xfinity-usage: {e}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn execute(cli: &Cli, metrics: &RunMetrics) -> xfinity_usage::Result<()> {
    let client = http::build_client(cli.timeout_duration())?;
    match tokio::time::timeout(
        cli.timeout_duration() + DEADLINE_GRACE,
        pipeline::run(cli, &client, metrics),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(UsageError::Timeout(cli.timeout)),
    }
}

async fn push_metrics(
    metrics: &RunMetrics,
    endpoint: &str,
    job: &str,
) -> xfinity_usage::Result<()> {
    // A short-timeout client: the push must not hang a finished run.
    let client = http::build_client(Duration::from_secs(10))?;
    metrics.push(&client, endpoint, job).await
}
