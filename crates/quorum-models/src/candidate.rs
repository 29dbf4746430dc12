use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::action::Action;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    #[default]
    Medium,
    High,
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskTier::Low => write!(f, "low"),
            RiskTier::Medium => write!(f, "medium"),
            RiskTier::High => write!(f, "high"),
        }
    }
}

/// A measurable opportunity or indicator reading waiting to be scored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    pub symbol: String,
    /// Direction the candidate argues for.
    pub action: Action,
    /// Positive strength measure in percent (e.g. expected profit 1.2 = 1.2%).
    pub magnitude_pct: f64,
    /// Traded volume / available liquidity in USD.
    pub volume_usd: f64,
    #[serde(default)]
    pub risk_tier: RiskTier,
    /// Age of the underlying observation when it was taken.
    #[serde(default)]
    pub latency_ms: u64,
    pub expires_at: DateTime<Utc>,
    /// Where the candidate came from (venue pair, indicator name, ...).
    #[serde(default)]
    pub source: String,
}

/// Output of the scorer. Never mutated after scoring.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredCandidate {
    pub symbol: String,
    pub action: Action,
    pub source: String,
    /// Named sub-factors and multipliers that produced the score.
    pub factors: BTreeMap<String, f64>,
    /// Composite before the final clamp.
    pub raw_score: f64,
    pub normalized_score: f64,
    pub confidence: f64,
    pub expires_at: DateTime<Utc>,
}

impl ScoredCandidate {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
