use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use quorum_agents::{InMemoryBus, MessageBus};
use quorum_models::clock::{Clock, SystemClock};
use tracing_subscriber::EnvFilter;

use quorum_runner::config::load_config;
use quorum_runner::Runner;

#[derive(Parser, Debug)]
#[command(
    name = "quorum-runner",
    about = "Quorum agent daemon - runs the signal agents, coordinator and risk agent on a shared bus"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/quorum.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = load_config(&cli.config)
        .with_context(|| format!("Failed to load config: {}", cli.config))?;

    let bus: Arc<dyn MessageBus> = Arc::new(InMemoryBus::default());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let runner = Runner::from_config(&config, bus, clock).context("Failed to build agents")?;
    let cancel = runner.cancel_token();

    // Handle shutdown signals
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Received shutdown signal");
        cancel.cancel();
    });

    runner
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("Runner error: {e}"))?;

    Ok(())
}
