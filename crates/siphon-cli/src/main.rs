use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use tracing::{error, info, info_span, warn, Instrument};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use uuid::Uuid;

use siphon_cli::shutdown::interrupted;
use siphon_cli::{run, Config, HarvestContext};
use siphon_core::config::{default_config_path, load_harvest_file};
use siphon_core::stats::BatchHarvestSummary;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Load environment variables from .env file
    dotenv().ok();

    let config = Config::parse();

    // Setup logging (stderr to keep stdout for command output)
    let default_level = if config.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install the log subscriber")?;

    let path = match &config.config {
        Some(path) => path.clone(),
        None => default_config_path().unwrap_or_else(|| PathBuf::from("siphon.toml")),
    };
    let file = load_harvest_file(&path)
        .with_context(|| format!("Failed to load harvest file {}", path.display()))?;

    let ctx = HarvestContext::new(file, config.output, config.concurrency);
    let run_id = Uuid::new_v4();
    let span = info_span!("run", %run_id, command = config.command.name());
    info!(%run_id, output = %ctx.layout.root().display(), "Starting harvest");

    let outcome = tokio::select! {
        result = run(&ctx, config.command).instrument(span) => Some(result),
        _ = interrupted(tokio::signal::ctrl_c()) => None,
    };

    match outcome {
        Some(Ok(summary)) => {
            report(&summary);
            Ok(ExitCode::SUCCESS)
        }
        Some(Err(e)) => {
            error!("{}", e.user_message());
            Ok(ExitCode::FAILURE)
        }
        None => {
            warn!("Interrupted, files written so far are kept");
            Ok(ExitCode::from(130))
        }
    }
}

fn report(summary: &BatchHarvestSummary) {
    for failed in summary.results.iter().filter(|r| !r.is_success()) {
        warn!(
            unit = %failed.target,
            error = failed.error.as_deref().unwrap_or("unknown"),
            "Unit failed"
        );
    }
    let totals = summary.totals();
    info!(
        targets = summary.total_targets(),
        successful = summary.successful_count(),
        failed = summary.failed_count(),
        records = summary.total_records(),
        files_written = totals.written,
        files_skipped = totals.skipped,
        files_failed = totals.failed,
        "Harvest complete"
    );
}
