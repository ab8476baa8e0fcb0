//! digestd entry point.
//!
//! Connects to the device, installs the bootstrap rules, then promotes flows
//! from digests until interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use p4ctl_device::{SimConnector, SimDevice, SimPipeline};
use p4ctl_digestd::config::TableConfig;
use p4ctl_digestd::{Controller, DigestdConfig, DEFAULT_CONFIG_PATH};
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Reactive digest controller
#[derive(Parser, Debug)]
#[command(name = "digestd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (defaults are used when missing)
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    info!("digestd: Starting reactive digest controller");

    if let Err(e) = run(&args).await {
        error!(error = %e, "digestd: Exiting with error");
        return Err(e);
    }

    info!("digestd: Exiting normally");
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).context("Failed to set logger")?;
    Ok(())
}

async fn run(args: &Args) -> Result<()> {
    let config = DigestdConfig::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    config.validate().context("invalid configuration")?;

    // Only the simulated device ships; it models the configured program.
    warn!("digestd: Using the simulated device backend");
    let connector = SimConnector::new(simulated_device(&config.tables));

    let handle = Controller::start(&config, &connector)
        .await
        .context("controller startup failed")?;

    let report = handle.bootstrap_report();
    if !report.is_complete() {
        warn!(
            failed = report.failed.len(),
            "digestd: Some bootstrap rules were not installed"
        );
    }

    info!("digestd: Listening for digests");
    signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("digestd: Received SIGINT, shutting down");

    handle.shutdown().await?;
    Ok(())
}

fn simulated_device(tables: &TableConfig) -> SimDevice {
    SimDevice::builder()
        .pipeline(SimPipeline {
            match_table: tables.forward_table.clone(),
            match_field: tables.match_field.clone(),
            recirculate_action: tables.recirculate_action.clone(),
            forward_action: tables.forward_action.clone(),
            port_field: tables.port_field.clone(),
            digest_table: tables.digest_table.clone(),
        })
        .build()
}
