mod config;

use clap::{Args, Parser, Subcommand};
use config::{Config, ConfigError, LoggingConfig, MetricsConfig};
use metrics_exporter_statsd::StatsdBuilder;
use relay::errors::RelayError;
use relay::relay::{BatchSummary, MetricsRelay};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(name = "mailstats", about = "Relay email webhook events to metrics backends")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Serve the webhook endpoint
    Run(RunArgs),
    /// Relay a saved webhook batch once and exit
    Send(SendArgs),
}

#[derive(Args)]
struct RunArgs {
    #[arg(long, short)]
    config: PathBuf,
}

#[derive(Args)]
struct SendArgs {
    #[arg(long, short)]
    config: PathBuf,
    /// JSON file holding an array of webhook events
    #[arg(long)]
    events: PathBuf,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Relay(#[from] RelayError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not read events: {0}")]
    Events(#[from] serde_json::Error),
    #[error("could not set up metrics: {0}")]
    Metrics(String),
    #[error("{0} event(s) could not be relayed")]
    EventsFailed(usize),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("mailstats: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config_path = match &cli.command {
        CliCommand::Run(args) => &args.config,
        CliCommand::Send(args) => &args.config,
    };
    let config = Config::from_file(config_path)?;

    // Keep the guard alive so buffered events are flushed on exit
    let _sentry = init_logging(config.common.logging.as_ref());

    if let Some(metrics_config) = &config.common.metrics {
        init_metrics(metrics_config)?;
    }

    let runtime = tokio::runtime::Runtime::new()?;

    match cli.command {
        CliCommand::Run(_) => {
            tracing::info!("Starting mailstats");
            runtime.block_on(relay::run(config.relay))?;
        }
        CliCommand::Send(args) => {
            let relay = MetricsRelay::from_config(&config.relay.backends)?;
            let summary = runtime.block_on(send_events(&relay, &args.events))?;
            println!(
                "sent: {}, skipped: {}, failed: {}",
                summary.sent, summary.skipped, summary.failed
            );
            if summary.failed > 0 {
                return Err(CliError::EventsFailed(summary.failed));
            }
        }
    }

    Ok(())
}

/// Relays every event of a saved webhook batch. Malformed elements are
/// counted as failed, like they are for live deliveries.
async fn send_events(relay: &MetricsRelay, path: &Path) -> Result<BatchSummary, CliError> {
    let reader = BufReader::new(File::open(path)?);
    let events: Vec<serde_json::Value> = serde_json::from_reader(reader)?;
    Ok(relay.process_batch(events).await)
}

fn init_logging(config: Option<&LoggingConfig>) -> Option<sentry::ClientInitGuard> {
    let guard = config.map(|c| {
        sentry::init((
            c.sentry_dsn.as_str(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .with(guard.as_ref().map(|_| sentry::integrations::tracing::layer()))
        .init();

    guard
}

fn init_metrics(config: &MetricsConfig) -> Result<(), CliError> {
    let recorder = StatsdBuilder::from(config.statsd_host.clone(), config.statsd_port)
        .build(Some("mailstats"))
        .map_err(|e| CliError::Metrics(e.to_string()))?;
    metrics::set_global_recorder(recorder).map_err(|e| CliError::Metrics(e.to_string()))?;

    shared::metrics_defs::describe_metrics(relay::metrics_defs::ALL_METRICS);
    tracing::info!(
        "Sending metrics to {}:{}",
        config.statsd_host,
        config.statsd_port
    );
    Ok(())
}
