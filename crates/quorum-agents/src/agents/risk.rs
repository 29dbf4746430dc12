//! The risk agent: keeps the live risk snapshot current and runs every
//! coordinated decision through the risk gate.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use quorum_models::action::Action;
use quorum_models::config::RiskLimits;
use quorum_models::decision::Decision;
use quorum_models::portfolio::RiskSnapshot;
use quorum_models::risk::{ProposedTrade, RiskVerdict};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::agent::{Agent, AgentCore, StepReport};
use crate::bus::{publish_json, topics, Subscription};
use crate::error::AgentError;
use crate::observation::{gather_observations, CycleOutcome, ObservationData, ObservationSource};
use crate::portfolio::PortfolioSource;
use crate::risk::metrics::{build_snapshot, REGIME_KEY, VOLATILITY_KEY};
use crate::risk::RiskGate;

/// Closed trades considered for the Kelly statistics.
const TRADE_HISTORY: usize = 200;

pub fn price_key(symbol: &str) -> String {
    format!("market.price.{symbol}")
}

pub struct RiskAgent {
    core: AgentCore,
    sources: Vec<Arc<dyn ObservationSource>>,
    symbols: Vec<String>,
    portfolio: Arc<dyn PortfolioSource>,
    gate: Arc<RiskGate>,
    decisions: Subscription,
    base_position_size: f64,
    stale_after: Duration,
    advisory_budget: Option<std::time::Duration>,
    snapshot: Option<RiskSnapshot>,
}

impl RiskAgent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        core: AgentCore,
        sources: Vec<Arc<dyn ObservationSource>>,
        symbols: Vec<String>,
        portfolio: Arc<dyn PortfolioSource>,
        gate: Arc<RiskGate>,
        base_position_size: f64,
        stale_after: std::time::Duration,
    ) -> Self {
        let decisions = core.bus.subscribe(topics::DECISIONS);
        Self {
            core,
            sources,
            symbols,
            portfolio,
            gate,
            decisions,
            base_position_size,
            stale_after: Duration::from_std(stale_after).unwrap_or_else(|_| Duration::seconds(60)),
            advisory_budget: None,
            snapshot: None,
        }
    }

    /// Cap the time one step may spend consulting the advisor, across all
    /// of its decisions. Set it below the runner's cycle timeout.
    pub fn with_advisory_budget(mut self, budget: std::time::Duration) -> Self {
        self.advisory_budget = Some(budget);
        self
    }

    pub fn limits(&self) -> &RiskLimits {
        self.gate.limits()
    }

    /// The snapshot built on the most recent step.
    pub fn snapshot(&self) -> Option<&RiskSnapshot> {
        self.snapshot.as_ref()
    }

    /// Refresh market beliefs. Missing market data is not fatal here: the
    /// snapshot falls back to realised volatility and an unknown regime.
    async fn refresh_market(&self) -> CycleOutcome {
        if self.sources.is_empty() {
            return CycleOutcome::Complete;
        }
        let gathered = match gather_observations(
            &self.core.name,
            &self.sources,
            &self.symbols,
            &self.core.beliefs,
        )
        .await
        {
            Ok(gathered) => gathered,
            Err(e) => {
                warn!(agent = %self.core.name, error = %e, "No market data this tick");
                let total = self.sources.len() * self.symbols.len();
                return CycleOutcome::Degraded {
                    failed: total,
                    total,
                };
            }
        };

        let mut worst_volatility: Option<f64> = None;
        for observation in &gathered.observations {
            if let ObservationData::Market {
                volatility,
                regime,
                price,
            } = &observation.data
            {
                if let Some(v) = volatility.filter(|v| v.is_finite() && *v >= 0.0) {
                    worst_volatility = Some(worst_volatility.map_or(v, |w| w.max(v)));
                }
                if let Some(label) = regime {
                    self.core
                        .beliefs
                        .update(REGIME_KEY, label.as_str(), 1.0, &observation.source);
                }
                if let Some(p) = price.filter(|p| p.is_finite() && *p > 0.0) {
                    self.core
                        .beliefs
                        .update(price_key(&observation.symbol), p, 1.0, &observation.source);
                }
            }
        }
        if let Some(v) = worst_volatility {
            self.core.beliefs.update(VOLATILITY_KEY, v, 1.0, &self.core.name);
        }
        gathered.outcome
    }

    async fn refresh_snapshot(&mut self) -> Result<RiskSnapshot, AgentError> {
        let portfolio = self.portfolio.snapshot().await?;
        let outcomes = self.portfolio.trade_outcomes(TRADE_HISTORY).await?;
        let snapshot = build_snapshot(&portfolio, self.gate.limits(), &self.core.beliefs, &outcomes);

        let beliefs = &self.core.beliefs;
        beliefs.update("portfolio.value", snapshot.portfolio_value, 1.0, &self.core.name);
        beliefs.update("portfolio.exposure", snapshot.current_exposure, 1.0, &self.core.name);
        beliefs.update("portfolio.drawdown_pct", snapshot.current_drawdown_pct, 1.0, &self.core.name);
        beliefs.update(
            "portfolio.utilization",
            snapshot.limits_utilization,
            1.0,
            &self.core.name,
        );
        if let Some(sharpe) = snapshot.sharpe_ratio {
            beliefs.update("portfolio.sharpe", sharpe, 1.0, &self.core.name);
        }
        debug!(
            agent = %self.core.name,
            exposure = snapshot.current_exposure,
            drawdown_pct = snapshot.current_drawdown_pct,
            "Risk snapshot refreshed"
        );
        self.snapshot = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Decisions published since the last step, minus HOLDs and stale ones.
    fn pending_decisions(&mut self) -> Vec<Decision> {
        let cutoff = self.core.now() - self.stale_after;
        let mut pending = Vec::new();
        for message in self.decisions.drain() {
            let decision: Decision = match serde_json::from_value(message.payload) {
                Ok(decision) => decision,
                Err(e) => {
                    warn!(agent = %self.core.name, error = %e, "Dropping malformed decision");
                    continue;
                }
            };
            if decision.action == Action::Hold {
                continue;
            }
            if decision.timestamp < cutoff {
                debug!(symbol = %decision.symbol, "Skipping stale decision");
                continue;
            }
            pending.push(decision);
        }
        pending
    }

    pub fn propose(&self, decision: &Decision) -> ProposedTrade {
        ProposedTrade {
            symbol: decision.symbol.clone(),
            action: decision.action,
            size: self.base_position_size * decision.confidence,
            confidence: decision.confidence,
            entry_price: self.core.beliefs.number(&price_key(&decision.symbol)),
        }
    }
}

#[async_trait]
impl Agent for RiskAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    async fn step(&mut self) -> Result<StepReport, AgentError> {
        let advisory_deadline = self.advisory_budget.map(|b| Instant::now() + b);
        let outcome = self.refresh_market().await;
        let snapshot = self.refresh_snapshot().await?;

        let mut verdicts: Vec<RiskVerdict> = Vec::new();
        for decision in self.pending_decisions() {
            let trade = self.propose(&decision);
            let remaining = advisory_deadline.map(|d| d.saturating_duration_since(Instant::now()));
            let verdict = self.gate.evaluate_within(&trade, &snapshot, remaining).await;
            info!(
                symbol = %verdict.symbol,
                action = %verdict.action,
                kind = ?verdict.kind,
                rule = %verdict.rule,
                requested = verdict.requested_size,
                recommended = verdict.recommended_size,
                "Risk verdict"
            );
            verdicts.push(verdict);
        }

        for verdict in &verdicts {
            publish_json(self.core.bus.as_ref(), topics::RISK_VERDICTS, verdict).await?;
        }
        Ok(StepReport::new(verdicts.len(), outcome))
    }
}
