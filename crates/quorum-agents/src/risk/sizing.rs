//! Kelly-criterion position sizing and volatility stops.

use quorum_models::action::Action;
use quorum_models::belief::clamp_unit;
use quorum_models::config::RiskLimits;
use quorum_models::risk::TradeStats;

/// No single Kelly-sized position may exceed this share of the exposure ceiling.
pub const MAX_EXPOSURE_SHARE: f64 = 0.10;
/// Volatility assumed when none has been observed (2%).
pub const DEFAULT_VOLATILITY: f64 = 0.02;
/// Floor for the average loss so the payoff ratio stays finite.
const MIN_AVG_LOSS: f64 = 1e-9;

/// Full Kelly fraction for a signal of the given confidence.
///
/// The win probability is the historical win rate discounted by signal
/// confidence. Negative edges floor at zero.
pub fn kelly_fraction(stats: &TradeStats, signal_confidence: f64) -> f64 {
    let p = clamp_unit(stats.win_rate) * clamp_unit(signal_confidence);
    let b = stats.avg_win.max(0.0) / stats.avg_loss.max(MIN_AVG_LOSS);
    if !b.is_finite() || b <= 0.0 {
        return 0.0;
    }
    let q = 1.0 - p;
    ((p * b - q) / b).max(0.0)
}

/// Risk-adjusted notional for a signal of the given confidence.
///
/// `min(max_position_size, max_total_exposure * 0.10, max_total_exposure * kelly * kelly_fraction)`
pub fn optimal_size(limits: &RiskLimits, stats: &TradeStats, signal_confidence: f64) -> f64 {
    let kelly = kelly_fraction(stats, signal_confidence);
    limits
        .max_position_size
        .min(limits.max_total_exposure * MAX_EXPOSURE_SHARE)
        .min(limits.max_total_exposure * kelly * limits.kelly_fraction)
}

/// Volatility stop: below entry for BUY, above entry for SELL. None for HOLD
/// or an unusable entry price.
pub fn stop_loss(
    action: Action,
    entry_price: f64,
    volatility: Option<f64>,
    multiplier: f64,
) -> Option<f64> {
    if !entry_price.is_finite() || entry_price <= 0.0 {
        return None;
    }
    let volatility = volatility
        .filter(|v| v.is_finite() && *v > 0.0)
        .unwrap_or(DEFAULT_VOLATILITY);
    let distance = entry_price * volatility * multiplier;
    match action {
        Action::Buy => Some((entry_price - distance).max(0.0)),
        Action::Sell => Some(entry_price + distance),
        Action::Hold => None,
    }
}

/// Prior statistics from configuration, used until enough trades are recorded.
pub fn prior_stats(limits: &RiskLimits) -> TradeStats {
    TradeStats {
        win_rate: limits.win_rate,
        avg_win: limits.avg_win,
        avg_loss: limits.avg_loss,
        samples: 0,
    }
}
