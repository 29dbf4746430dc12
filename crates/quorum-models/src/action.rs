use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Directional action carried by signals, decisions and proposed trades.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl Action {
    /// Evaluation order used to break ties during aggregation.
    pub const PRIORITY: [Action; 3] = [Action::Buy, Action::Sell, Action::Hold];

    /// Parse the wire vocabulary published by agents.
    ///
    /// `BULLISH`/`LONG` map to BUY and `BEARISH`/`SHORT` map to SELL.
    /// Matching is case-insensitive and ignores surrounding whitespace.
    pub fn from_wire(raw: &str) -> Result<Self, ModelError> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "BUY" | "BULLISH" | "LONG" => Ok(Action::Buy),
            "SELL" | "BEARISH" | "SHORT" => Ok(Action::Sell),
            "HOLD" => Ok(Action::Hold),
            other => Err(ModelError::UnknownAction(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Buy => "BUY",
            Action::Sell => "SELL",
            Action::Hold => "HOLD",
        }
    }

    /// Whether executing this action adds exposure to the portfolio.
    pub fn increases_exposure(&self) -> bool {
        matches!(self, Action::Buy)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::from_wire(s)
    }
}
