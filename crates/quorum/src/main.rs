use std::io::Read;

use anyhow::{Context, Result};
use clap::Parser;
use quorum::EvaluationRequest;
use quorum_models::config::QuorumConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "quorum", about = "Evaluate a proposed trade through the Quorum risk gate")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/quorum.toml")]
    config: String,

    /// Read the {trade, portfolio, market} request from a file instead of stdin
    #[arg(short, long)]
    input: Option<String>,

    /// Pretty-print the output JSON
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config_str = std::fs::read_to_string(&cli.config)
        .with_context(|| format!("Failed to read config: {}", cli.config))?;
    let config: QuorumConfig =
        toml::from_str(&config_str).with_context(|| "Failed to parse config")?;

    let request_json = if let Some(input_path) = &cli.input {
        std::fs::read_to_string(input_path)
            .with_context(|| format!("Failed to read input: {input_path}"))?
    } else {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read from stdin")?;
        buf
    };
    let request: EvaluationRequest =
        serde_json::from_str(&request_json).context("Failed to parse evaluation request JSON")?;

    let gate = quorum::build_risk_gate(&config).context("Failed to build risk gate")?;
    let verdict = quorum::evaluate(&gate, &request).await;
    info!(
        symbol = %verdict.symbol,
        kind = ?verdict.kind,
        rule = %verdict.rule,
        source = ?verdict.source,
        "Evaluation complete"
    );

    // stdout carries only the verdict JSON
    let output = if cli.pretty {
        serde_json::to_string_pretty(&verdict)?
    } else {
        serde_json::to_string(&verdict)?
    };
    println!("{output}");

    Ok(())
}
