//! # nodestated
//!
//! Entry point of the node state daemon.
//!
//! `run` loads the configuration, seeds desired resources, registers the
//! controllers and drives them until SIGINT. `check-config` and `partition`
//! resolve configuration without touching the system.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use nodestate::bootstrap;
use nodestate::cli::{Cli, Commands};
use nodestate::config::Config;
use nodestate_controllers::{ChconLabeler, PartitionOptions, SystemMounter};
use nodestate_resources::{InMemoryStore, ResourceStore, TracingStore};
use nodestate_runtime::Shutdown;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref())?;

    match cli.command {
        Commands::Run => run(&cli.config).await,
        Commands::CheckConfig => check_config(&cli.config),
        Commands::Partition { label, uki } => partition(&label, uki),
    }
}

/// Install the fmt subscriber. `--log-level` wins over `RUST_LOG`.
fn init_tracing(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).context("Invalid --log-level filter")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
    Ok(())
}

async fn run(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;

    let store: Arc<dyn ResourceStore> = Arc::new(TracingStore::new(InMemoryStore::new()));

    let nodename = bootstrap::resolve_nodename(&config);
    let seeder = bootstrap::seed_runtime(Arc::clone(&store));
    bootstrap::seed(&seeder, &config, &nodename)
        .await
        .context("Failed to seed desired state")?;
    drop(seeder);

    let engine = bootstrap::build_engine(
        Arc::clone(&store),
        &config,
        Arc::new(SystemMounter),
        Arc::new(ChconLabeler),
    )
    .context("Controller registration failed")?;

    let (trigger, shutdown) = Shutdown::channel();
    tokio::spawn(async move {
        wait_for_shutdown().await;
        trigger.trigger();
    });

    info!(%nodename, "nodestated running. Press Ctrl+C to stop.");
    engine.run(shutdown).await.context("Engine failed")?;
    info!("nodestated stopped");
    Ok(())
}

fn check_config(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)
        .with_context(|| format!("Invalid configuration in {}", config_path.display()))?;
    let rendered = serde_json::to_string_pretty(&config).context("Failed to render configuration")?;
    println!("{rendered}");
    Ok(())
}

fn partition(label: &str, uki: bool) -> Result<()> {
    let options = PartitionOptions::parse(label, uki)
        .with_context(|| format!("Cannot resolve partition '{label}'"))?;
    let rendered = serde_json::to_string_pretty(&options).context("Failed to render partition options")?;
    println!("{rendered}");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C).
async fn wait_for_shutdown() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown"),
        Err(err) => error!("Failed to listen for shutdown signal: {}", err),
    }
}
