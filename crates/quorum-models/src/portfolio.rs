use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::risk::TradeStats;

/// An open position as reported by the position-of-record collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub symbol: String,
    /// Quantity held. Negative for short positions.
    pub size: Decimal,
    pub entry_price: Decimal,
}

impl Position {
    /// Absolute notional value at entry, in account currency.
    pub fn notional(&self) -> f64 {
        (self.size.abs() * self.entry_price).to_f64().unwrap_or(0.0)
    }
}

/// A single equity observation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EquityPoint {
    pub recorded_at: DateTime<Utc>,
    pub equity: Decimal,
}

/// All-time equity peak and the deepest decline recorded against it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EquityWatermark {
    pub peak_equity: Decimal,
    pub peak_at: DateTime<Utc>,
    /// Percent (25.0 = 25%).
    pub max_drawdown_pct: f64,
}

impl EquityWatermark {
    pub fn start(point: &EquityPoint) -> Self {
        Self {
            peak_equity: point.equity,
            peak_at: point.recorded_at,
            max_drawdown_pct: 0.0,
        }
    }

    /// Fold the next equity observation into the mark.
    pub fn observe(&self, point: &EquityPoint) -> Self {
        let mut next = self.clone();
        if point.equity > next.peak_equity {
            next.peak_equity = point.equity;
            next.peak_at = point.recorded_at;
        }
        let drawdown = next.drawdown_pct(point.equity.to_f64().unwrap_or(0.0));
        next.max_drawdown_pct = next.max_drawdown_pct.max(drawdown);
        next
    }

    /// Decline of `equity` below the peak, in percent. Zero at or above it.
    pub fn drawdown_pct(&self, equity: f64) -> f64 {
        let peak = self.peak_equity.to_f64().unwrap_or(0.0);
        if peak > 0.0 && equity < peak {
            (peak - equity) / peak * 100.0
        } else {
            0.0
        }
    }
}

/// Read-only view of the portfolio for one cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortfolioSnapshot {
    pub positions: Vec<Position>,
    /// Current account equity.
    pub equity: Decimal,
    /// Oldest first.
    #[serde(default)]
    pub equity_history: Vec<EquityPoint>,
    /// Peak and worst drawdown over the whole record, beyond `equity_history`.
    #[serde(default)]
    pub high_water_mark: Option<EquityWatermark>,
    pub taken_at: DateTime<Utc>,
}

impl PortfolioSnapshot {
    pub fn empty(equity: Decimal, taken_at: DateTime<Utc>) -> Self {
        Self {
            positions: Vec::new(),
            equity,
            equity_history: Vec::new(),
            high_water_mark: None,
            taken_at,
        }
    }

    pub fn total_exposure(&self) -> f64 {
        self.positions.iter().map(Position::notional).sum()
    }

    /// Notional exposure grouped by symbol.
    pub fn exposure_by_symbol(&self) -> BTreeMap<String, f64> {
        let mut map = BTreeMap::new();
        for position in &self.positions {
            *map.entry(position.symbol.clone()).or_insert(0.0) += position.notional();
        }
        map
    }

    pub fn open_positions(&self) -> usize {
        self.positions.iter().filter(|p| !p.size.is_zero()).count()
    }

    pub fn equity_f64(&self) -> f64 {
        self.equity.to_f64().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MarketRegime {
    Trending,
    Ranging,
    Volatile,
    #[default]
    Unknown,
}

impl MarketRegime {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "trending" | "trend" => MarketRegime::Trending,
            "ranging" | "range" | "sideways" => MarketRegime::Ranging,
            "volatile" | "high_volatility" => MarketRegime::Volatile,
            _ => MarketRegime::Unknown,
        }
    }
}

impl fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketRegime::Trending => write!(f, "trending"),
            MarketRegime::Ranging => write!(f, "ranging"),
            MarketRegime::Volatile => write!(f, "volatile"),
            MarketRegime::Unknown => write!(f, "unknown"),
        }
    }
}

/// Live risk state the gate evaluates against. Refreshed on a fixed cadence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RiskSnapshot {
    pub portfolio_value: f64,
    pub current_exposure: f64,
    pub open_positions: usize,
    #[serde(default)]
    pub symbol_exposure: BTreeMap<String, f64>,
    /// Percent decline from peak equity (25.0 = 25%).
    pub current_drawdown_pct: f64,
    /// Worst drawdown observed over the equity history, in percent.
    pub max_drawdown_pct: f64,
    /// Return volatility as a fraction (0.02 = 2%). None when unknown.
    pub volatility: Option<f64>,
    #[serde(default)]
    pub market_regime: MarketRegime,
    /// Exposure divided by the exposure ceiling.
    pub limits_utilization: f64,
    pub sharpe_ratio: Option<f64>,
    /// Realised trade statistics. None until enough trades are recorded.
    #[serde(default)]
    pub trade_stats: Option<TradeStats>,
}

impl RiskSnapshot {
    pub fn exposure_for(&self, symbol: &str) -> f64 {
        self.symbol_exposure.get(symbol).copied().unwrap_or(0.0)
    }

    pub fn holds(&self, symbol: &str) -> bool {
        self.exposure_for(symbol) > 0.0
    }
}
