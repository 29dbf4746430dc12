//! Candidate scoring.
//!
//! Turns a measurable candidate into a normalized score and confidence so
//! opportunities from heterogeneous sources can be ordered against each
//! other. The weights, cutoffs and multipliers here are fixed; only the
//! staleness threshold and the confidence cutoffs come from configuration.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use quorum_models::belief::clamp_unit;
use quorum_models::candidate::{Candidate, RiskTier, ScoredCandidate};
use quorum_models::clock::{Clock, SystemClock};
use quorum_models::config::ScorerConfig;
use tracing::debug;

const MAGNITUDE_WEIGHT: f64 = 0.5;
const LIQUIDITY_WEIGHT: f64 = 0.25;
const STALE_MULTIPLIER: f64 = 0.7;
/// Seconds to expiry at which urgency starts decaying the score.
const URGENCY_WINDOW_SECS: f64 = 30.0;
/// Seconds to expiry below which a candidate counts as critically short-lived.
const CRITICAL_EXPIRY_SECS: f64 = 15.0;
const COMPOUND_PENALTY: f64 = 0.8;

const STALE_CONFIDENCE: f64 = 0.85;
const WEAK_DISCOUNT: f64 = 0.7;
const MODERATE_DISCOUNT: f64 = 0.85;

/// `1 - e^(-x)` for a positive strength measure; 0 for non-positive input.
pub fn magnitude_factor(magnitude_pct: f64) -> f64 {
    if !magnitude_pct.is_finite() {
        return if magnitude_pct > 0.0 { 1.0 } else { 0.0 };
    }
    if magnitude_pct <= 0.0 {
        return 0.0;
    }
    clamp_unit(1.0 - (-magnitude_pct).exp())
}

/// Log-scaled liquidity: ~$10k scores 0, ~$100M scores 1.
pub fn liquidity_factor(volume_usd: f64) -> f64 {
    if !volume_usd.is_finite() || volume_usd <= 0.0 {
        return 0.0;
    }
    clamp_unit(((volume_usd + 1.0).log10() - 4.0) / 4.0)
}

pub fn risk_multiplier(tier: RiskTier) -> f64 {
    match tier {
        RiskTier::Low => 1.0,
        RiskTier::Medium => 0.8,
        RiskTier::High => 0.6,
    }
}

fn risk_confidence(tier: RiskTier) -> f64 {
    match tier {
        RiskTier::Low => 1.0,
        RiskTier::Medium => 0.9,
        RiskTier::High => 0.75,
    }
}

/// Linear ramp from 1.0 at >= 30s to expiry down to 0.0 at expiry.
pub fn time_multiplier(seconds_to_expiry: f64) -> f64 {
    clamp_unit(seconds_to_expiry / URGENCY_WINDOW_SECS)
}

pub struct SignalScorer {
    config: ScorerConfig,
    clock: Arc<dyn Clock>,
}

impl SignalScorer {
    pub fn new(config: ScorerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: ScorerConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    pub fn score(&self, candidate: &Candidate) -> ScoredCandidate {
        let now = self.clock.now();
        let seconds_to_expiry =
            (candidate.expires_at - now).num_milliseconds() as f64 / 1000.0;

        let magnitude = magnitude_factor(candidate.magnitude_pct);
        let liquidity = liquidity_factor(candidate.volume_usd);
        let risk = risk_multiplier(candidate.risk_tier);
        let stale = candidate.latency_ms > self.config.latency_threshold_ms;
        let latency = if stale { STALE_MULTIPLIER } else { 1.0 };
        let time = time_multiplier(seconds_to_expiry);

        let base = MAGNITUDE_WEIGHT * magnitude + LIQUIDITY_WEIGHT * liquidity;
        let mut raw = base * risk * latency * time;

        let adverse = [
            candidate.risk_tier == RiskTier::High,
            stale,
            seconds_to_expiry < CRITICAL_EXPIRY_SECS,
        ]
        .iter()
        .filter(|hit| **hit)
        .count();
        let compound = if adverse >= 2 { COMPOUND_PENALTY } else { 1.0 };
        raw *= compound;

        let normalized = clamp_unit(raw);
        let confidence = self.confidence(normalized, candidate, stale);

        let mut factors = BTreeMap::new();
        factors.insert("magnitude".to_string(), magnitude);
        factors.insert("liquidity".to_string(), liquidity);
        factors.insert("base".to_string(), base);
        factors.insert("risk_multiplier".to_string(), risk);
        factors.insert("latency_multiplier".to_string(), latency);
        factors.insert("time_multiplier".to_string(), time);
        factors.insert("compound_penalty".to_string(), compound);
        factors.insert("seconds_to_expiry".to_string(), seconds_to_expiry);

        ScoredCandidate {
            symbol: candidate.symbol.clone(),
            action: candidate.action,
            source: candidate.source.clone(),
            factors,
            raw_score: raw,
            normalized_score: normalized,
            confidence,
            expires_at: candidate.expires_at,
        }
    }

    fn confidence(&self, score: f64, candidate: &Candidate, stale: bool) -> f64 {
        let mut confidence = score * risk_confidence(candidate.risk_tier);
        if stale {
            confidence *= STALE_CONFIDENCE;
        }

        if candidate.magnitude_pct < self.config.low_magnitude_pct {
            confidence *= WEAK_DISCOUNT;
        } else if candidate.magnitude_pct < self.config.medium_magnitude_pct {
            confidence *= MODERATE_DISCOUNT;
        }

        if candidate.volume_usd < self.config.thin_liquidity_usd {
            confidence *= WEAK_DISCOUNT;
        } else if candidate.volume_usd < self.config.moderate_liquidity_usd {
            confidence *= MODERATE_DISCOUNT;
        }

        clamp_unit(confidence)
    }

    /// Score a batch, drop expired candidates and order best first.
    pub fn rank(&self, candidates: &[Candidate]) -> Vec<ScoredCandidate> {
        let now = self.clock.now();
        let mut scored: Vec<ScoredCandidate> = candidates
            .iter()
            .filter(|c| c.expires_at > now)
            .map(|c| self.score(c))
            .collect();
        if scored.len() < candidates.len() {
            debug!(
                expired = candidates.len() - scored.len(),
                kept = scored.len(),
                "Dropped expired candidates"
            );
        }
        scored.sort_by(|a, b| {
            b.normalized_score
                .partial_cmp(&a.normalized_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| {
                    b.confidence
                        .partial_cmp(&a.confidence)
                        .unwrap_or(Ordering::Equal)
                })
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        scored
    }
}
