use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration for Quorum. Built once at startup and passed to
/// each component's constructor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct QuorumConfig {
    #[serde(default)]
    pub risk: RiskLimits,
    #[serde(default)]
    pub scorer: ScorerConfig,
    #[serde(default)]
    pub advisory: AdvisoryConfig,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
}

impl QuorumConfig {
    /// Reject malformed limits and thresholds before anything starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.risk.validate()?;
        self.scorer.validate()?;
        self.advisory.validate()?;
        self.coordinator.validate()?;
        self.runner.validate()?;
        for agent in &self.agents {
            agent.validate()?;
        }
        if self.advisory.enabled {
            let budget = self.advisory.worst_case_seconds();
            if budget >= self.runner.cycle_timeout_seconds {
                return Err(ConfigError::invalid(
                    "advisory.timeout_seconds",
                    format!(
                        "{}s x {} attempts = {budget}s must stay below runner.cycle_timeout_seconds ({}s)",
                        self.advisory.timeout_seconds,
                        u64::from(self.advisory.max_retries) + 1,
                        self.runner.cycle_timeout_seconds
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Trust weight for a signal origin. Unknown origins weigh 1.0.
    pub fn weight_for(&self, origin: &str) -> f64 {
        self.agents
            .iter()
            .find(|a| a.name == origin || a.topic() == origin)
            .map(|a| a.weight)
            .unwrap_or(1.0)
    }
}

/// Portfolio ceilings and sizing parameters. Immutable for the process lifetime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RiskLimits {
    /// Largest single position, in account currency.
    pub max_position_size: f64,
    /// Ceiling on summed notional exposure.
    pub max_total_exposure: f64,
    /// Largest share of `max_total_exposure` one symbol may take (0.25 = 25%).
    pub max_concentration: f64,
    pub max_open_positions: usize,
    /// Drawdown ceiling in percent (20.0 = 20%).
    pub max_drawdown_percent: f64,
    pub min_sharpe_ratio: f64,
    /// Fraction of full Kelly to bet.
    pub kelly_fraction: f64,
    /// Stop distance in multiples of volatility.
    pub stop_loss_multiplier: f64,
    /// Annual risk-free rate used by the Sharpe ratio.
    pub risk_free_rate: f64,
    /// Prior win rate used until enough trades are recorded.
    pub win_rate: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    /// Recorded trade outcomes needed before realised stats replace the priors.
    pub min_trades_for_stats: usize,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_position_size: 10_000.0,
            max_total_exposure: 50_000.0,
            max_concentration: 0.25,
            max_open_positions: 10,
            max_drawdown_percent: 20.0,
            min_sharpe_ratio: 0.5,
            kelly_fraction: 0.25,
            stop_loss_multiplier: 2.0,
            risk_free_rate: 0.02,
            win_rate: 0.55,
            avg_win: 1.5,
            avg_loss: 1.0,
            min_trades_for_stats: 20,
        }
    }
}

impl RiskLimits {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("risk.max_position_size", self.max_position_size)?;
        positive("risk.max_total_exposure", self.max_total_exposure)?;
        fraction("risk.max_concentration", self.max_concentration)?;
        if self.max_open_positions == 0 {
            return Err(ConfigError::invalid("risk.max_open_positions", "must be at least 1"));
        }
        positive("risk.max_drawdown_percent", self.max_drawdown_percent)?;
        if self.max_drawdown_percent > 100.0 {
            return Err(ConfigError::invalid(
                "risk.max_drawdown_percent",
                "is a percentage and cannot exceed 100",
            ));
        }
        if !self.min_sharpe_ratio.is_finite() {
            return Err(ConfigError::invalid("risk.min_sharpe_ratio", "must be finite"));
        }
        fraction("risk.kelly_fraction", self.kelly_fraction)?;
        positive("risk.stop_loss_multiplier", self.stop_loss_multiplier)?;
        fraction("risk.risk_free_rate", self.risk_free_rate)?;
        fraction("risk.win_rate", self.win_rate)?;
        positive("risk.avg_win", self.avg_win)?;
        positive("risk.avg_loss", self.avg_loss)?;
        Ok(())
    }

    /// Per-symbol exposure ceiling.
    pub fn concentration_limit(&self) -> f64 {
        self.max_total_exposure * self.max_concentration
    }
}

/// Thresholds for the candidate scorer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScorerConfig {
    /// Observations older than this are stale.
    pub latency_threshold_ms: u64,
    /// Magnitude (percent) below which confidence is cut hardest.
    pub low_magnitude_pct: f64,
    pub medium_magnitude_pct: f64,
    /// Liquidity (USD) below which confidence is cut hardest.
    pub thin_liquidity_usd: f64,
    pub moderate_liquidity_usd: f64,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            latency_threshold_ms: 500,
            low_magnitude_pct: 0.5,
            medium_magnitude_pct: 1.0,
            thin_liquidity_usd: 100_000.0,
            moderate_liquidity_usd: 1_000_000.0,
        }
    }
}

impl ScorerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("scorer.low_magnitude_pct", self.low_magnitude_pct)?;
        if self.medium_magnitude_pct < self.low_magnitude_pct {
            return Err(ConfigError::invalid(
                "scorer.medium_magnitude_pct",
                "must not be below low_magnitude_pct",
            ));
        }
        positive("scorer.thin_liquidity_usd", self.thin_liquidity_usd)?;
        if self.moderate_liquidity_usd < self.thin_liquidity_usd {
            return Err(ConfigError::invalid(
                "scorer.moderate_liquidity_usd",
                "must not be below thin_liquidity_usd",
            ));
        }
        Ok(())
    }
}

/// External risk-assessment advisor. Disabled by default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AdvisoryConfig {
    pub enabled: bool,
    pub model: String,
    /// Per-attempt timeout.
    pub timeout_seconds: u64,
    /// Extra attempts after the first failure.
    pub max_retries: u32,
    pub breaker: BreakerConfig,
}

impl Default for AdvisoryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model: "claude-sonnet-4-5-20250929".to_string(),
            timeout_seconds: 3,
            max_retries: 1,
            breaker: BreakerConfig::default(),
        }
    }
}

impl AdvisoryConfig {
    /// Seconds one consultation can take when every attempt times out.
    pub fn worst_case_seconds(&self) -> u64 {
        self.timeout_seconds
            .saturating_mul(u64::from(self.max_retries).saturating_add(1))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_seconds == 0 {
            return Err(ConfigError::invalid("advisory.timeout_seconds", "must be at least 1"));
        }
        if self.enabled && self.model.trim().is_empty() {
            return Err(ConfigError::invalid("advisory.model", "required when enabled"));
        }
        self.breaker.validate()
    }
}

/// Rolling-window circuit breaker around the advisor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BreakerConfig {
    /// Failures within `window_seconds` that open the breaker.
    pub failure_threshold: u32,
    /// Consecutive half-open successes that close it again.
    pub success_threshold: u32,
    pub window_seconds: u64,
    /// Time spent open before a half-open trial call is allowed.
    pub open_cooldown_seconds: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            success_threshold: 2,
            window_seconds: 60,
            open_cooldown_seconds: 30,
        }
    }
}

impl BreakerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::invalid(
                "advisory.breaker.failure_threshold",
                "must be at least 1",
            ));
        }
        if self.success_threshold == 0 {
            return Err(ConfigError::invalid(
                "advisory.breaker.success_threshold",
                "must be at least 1",
            ));
        }
        if self.window_seconds == 0 {
            return Err(ConfigError::invalid(
                "advisory.breaker.window_seconds",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Inter-agent coordination layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Signals older than this at decision time are discarded.
    pub cycle_window_seconds: u64,
    /// Notional proposed to the risk gate at full confidence.
    pub base_position_size: f64,
    pub symbols: Vec<String>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            cycle_window_seconds: 60,
            base_position_size: 1_000.0,
            symbols: vec!["BTC-USD".to_string(), "ETH-USD".to_string()],
        }
    }
}

impl CoordinatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cycle_window_seconds == 0 {
            return Err(ConfigError::invalid(
                "coordinator.cycle_window_seconds",
                "must be at least 1",
            ));
        }
        positive("coordinator.base_position_size", self.base_position_size)
    }
}

/// Scheduling of the agent loops.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunnerConfig {
    pub heartbeat_interval_seconds: u64,
    pub evaluation_interval_seconds: u64,
    /// A tick that runs longer than this is abandoned.
    pub cycle_timeout_seconds: u64,
    /// SQLite file holding equity history and trade outcomes.
    pub ledger_path: String,
    /// JSON file with the current positions and equity.
    pub portfolio_path: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_seconds: 30,
            evaluation_interval_seconds: 10,
            cycle_timeout_seconds: 8,
            ledger_path: "data/quorum_ledger.db".to_string(),
            portfolio_path: "data/portfolio.json".to_string(),
        }
    }
}

impl RunnerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heartbeat_interval_seconds == 0 {
            return Err(ConfigError::invalid(
                "runner.heartbeat_interval_seconds",
                "must be at least 1",
            ));
        }
        if self.evaluation_interval_seconds == 0 {
            return Err(ConfigError::invalid(
                "runner.evaluation_interval_seconds",
                "must be at least 1",
            ));
        }
        if self.cycle_timeout_seconds == 0 {
            return Err(ConfigError::invalid(
                "runner.cycle_timeout_seconds",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Opportunity,
    Technical,
    Risk,
}

/// A single agent definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    pub name: String,
    pub kind: AgentKind,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Trust weight of this agent's signals in the coordinated vote.
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub symbols: Vec<String>,
    /// Observation sources (files written by external collectors).
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    /// Minimum candidate score before an opportunity becomes a BUY.
    #[serde(default = "default_min_score")]
    pub min_score: f64,
}

impl AgentConfig {
    /// Bus topic the agent publishes its signals on.
    pub fn topic(&self) -> String {
        format!("signals.{}", self.name)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::invalid("agents.name", "must not be empty"));
        }
        if !self.weight.is_finite() || self.weight < 0.0 {
            return Err(ConfigError::invalid(
                &format!("agents.{}.weight", self.name),
                "must be a non-negative number",
            ));
        }
        fraction(&format!("agents.{}.min_score", self.name), self.min_score)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceConfig {
    pub name: String,
    pub path: String,
}

fn default_true() -> bool {
    true
}
fn default_weight() -> f64 {
    1.0
}
fn default_min_score() -> f64 {
    0.3
}

fn positive(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("must be positive, got {value}")))
    }
}

fn fraction(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("must be within [0, 1], got {value}")))
    }
}
