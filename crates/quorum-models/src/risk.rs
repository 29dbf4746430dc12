use std::fmt;

use serde::{Deserialize, Serialize};

use crate::action::Action;

/// A trade proposed to the risk gate. `size` is notional in account currency.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProposedTrade {
    pub symbol: String,
    pub action: Action,
    pub size: f64,
    /// Signal confidence backing the proposal, in [0, 1].
    pub confidence: f64,
    /// Expected entry price. Stop-loss is only attached when known.
    #[serde(default)]
    pub entry_price: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VerdictKind {
    Approve,
    Veto,
    Resize,
}

/// Which check produced the verdict.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RiskRule {
    PortfolioLimits,
    DrawdownCircuitBreaker,
    DrawdownWarning,
    VolatilityUtilization,
    KellyResize,
    ConcentrationWarning,
    Approved,
    Hold,
    Advisory,
}

impl fmt::Display for RiskRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RiskRule::PortfolioLimits => "portfolio_limits",
            RiskRule::DrawdownCircuitBreaker => "drawdown_circuit_breaker",
            RiskRule::DrawdownWarning => "drawdown_warning",
            RiskRule::VolatilityUtilization => "volatility_utilization",
            RiskRule::KellyResize => "kelly_resize",
            RiskRule::ConcentrationWarning => "concentration_warning",
            RiskRule::Approved => "approved",
            RiskRule::Hold => "hold",
            RiskRule::Advisory => "advisory",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VerdictSource {
    Deterministic,
    Advisory,
}

/// Outcome of a risk evaluation. A veto is a valid decision, not an error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskVerdict {
    pub symbol: String,
    pub action: Action,
    pub kind: VerdictKind,
    pub approved: bool,
    pub rule: RiskRule,
    pub source: VerdictSource,
    pub requested_size: f64,
    /// Size the gate allows. Zero on veto.
    pub recommended_size: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub confidence: f64,
    pub reasoning: String,
    #[serde(default)]
    pub concerns: Vec<String>,
}

impl RiskVerdict {
    pub fn is_veto(&self) -> bool {
        self.kind == VerdictKind::Veto
    }

    pub fn is_resize(&self) -> bool {
        self.kind == VerdictKind::Resize
    }
}

/// Realised trade statistics feeding the Kelly formula.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TradeStats {
    pub win_rate: f64,
    /// Average winning trade (any consistent unit).
    pub avg_win: f64,
    /// Average losing trade, as a positive number in the same unit.
    pub avg_loss: f64,
    pub samples: usize,
}
