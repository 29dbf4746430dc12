//! Quorum - multi-agent trading decision core
//!
//! Independent agents publish directional signals, a coordinator collapses
//! them into one decision per symbol, and a risk gate approves, vetoes or
//! resizes every proposed trade before execution.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use quorum::models::config::QuorumConfig;
//! use quorum::EvaluationRequest;
//!
//! # async fn run(request: EvaluationRequest) -> anyhow::Result<()> {
//! let config = QuorumConfig::default();
//! let gate = quorum::build_risk_gate(&config)?;
//! let verdict = quorum::evaluate(&gate, &request).await;
//! println!("{}", serde_json::to_string(&verdict)?);
//! # Ok(())
//! # }
//! ```

pub use quorum_agents as agents;
pub use quorum_models as models;
pub use quorum_store as store;

use anyhow::Context;
use quorum_agents::risk::metrics::{build_snapshot, REGIME_KEY, VOLATILITY_KEY};
use quorum_agents::RiskGate;
use quorum_models::config::{QuorumConfig, RiskLimits};
use quorum_models::portfolio::{PortfolioSnapshot, RiskSnapshot};
use quorum_models::risk::{ProposedTrade, RiskVerdict};
use quorum_store::BeliefStore;
use serde::{Deserialize, Serialize};

/// Market conditions supplied alongside a one-off evaluation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MarketContext {
    /// Return volatility as a fraction (0.02 = 2%).
    #[serde(default)]
    pub volatility: Option<f64>,
    #[serde(default)]
    pub regime: Option<String>,
}

/// Input accepted by the `quorum` CLI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationRequest {
    pub trade: ProposedTrade,
    pub portfolio: PortfolioSnapshot,
    #[serde(default)]
    pub market: MarketContext,
}

/// Build the risk gate from configuration. The advisor is only attached
/// when `advisory.enabled` is set.
pub fn build_risk_gate(config: &QuorumConfig) -> anyhow::Result<RiskGate> {
    config.validate().context("Invalid configuration")?;
    Ok(RiskGate::from_config(config))
}

/// Risk snapshot for a one-off request. Trade statistics fall back to the
/// configured priors because no ledger is consulted.
pub fn snapshot_for(request: &EvaluationRequest, limits: &RiskLimits) -> RiskSnapshot {
    let beliefs = BeliefStore::new();
    if let Some(volatility) = request.market.volatility {
        beliefs.update(VOLATILITY_KEY, volatility, 1.0, "request");
    }
    if let Some(regime) = &request.market.regime {
        beliefs.update(REGIME_KEY, regime.as_str(), 1.0, "request");
    }
    build_snapshot(&request.portfolio, limits, &beliefs, &[])
}

/// Evaluate one request. Never fails: advisory problems fall back to the
/// deterministic verdict inside the gate.
pub async fn evaluate(gate: &RiskGate, request: &EvaluationRequest) -> RiskVerdict {
    let snapshot = snapshot_for(request, gate.limits());
    gate.evaluate(&request.trade, &snapshot).await
}
