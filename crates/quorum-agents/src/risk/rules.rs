//! Deterministic veto tree. Checks run in a fixed order and the first match wins.

use quorum_models::action::Action;
use quorum_models::config::RiskLimits;
use quorum_models::portfolio::RiskSnapshot;
use quorum_models::risk::{ProposedTrade, RiskRule, RiskVerdict, VerdictKind, VerdictSource};
use tracing::{debug, info};

use super::sizing::{optimal_size, prior_stats, stop_loss, DEFAULT_VOLATILITY};

pub const LIMITS_CONFIDENCE: f64 = 0.95;
pub const CIRCUIT_BREAKER_CONFIDENCE: f64 = 0.98;
pub const DRAWDOWN_WARNING_CONFIDENCE: f64 = 0.85;
pub const VOLATILITY_CONFIDENCE: f64 = 0.80;
pub const RESIZE_CONFIDENCE: f64 = 0.70;
pub const CONCENTRATION_CONFIDENCE: f64 = 0.75;
pub const APPROVE_CONFIDENCE: f64 = 0.90;

/// Early-warning drawdown as a share of the maximum.
const DRAWDOWN_WARNING_SHARE: f64 = 0.8;
const HIGH_VOLATILITY: f64 = 0.04;
const HIGH_UTILIZATION: f64 = 0.85;
/// Requests larger than this multiple of the Kelly size are resized.
const RESIZE_TRIGGER: f64 = 1.5;
const CONCENTRATION_WARNING_SHARE: f64 = 0.8;

/// Run the veto tree for one proposed trade.
///
/// SELL reduces exposure, so it skips the drawdown, volatility, Kelly and
/// concentration checks and only has to respect the single-position ceiling.
pub fn evaluate_rules(
    limits: &RiskLimits,
    trade: &ProposedTrade,
    snapshot: &RiskSnapshot,
) -> RiskVerdict {
    if trade.action == Action::Hold {
        return verdict(
            trade,
            VerdictKind::Approve,
            RiskRule::Hold,
            0.0,
            APPROVE_CONFIDENCE,
            format!("HOLD on {}: nothing to trade", trade.symbol),
        );
    }

    if let Some(reason) = portfolio_limit_breach(limits, trade, snapshot) {
        info!(symbol = %trade.symbol, rule = %RiskRule::PortfolioLimits, %reason, "Trade vetoed");
        return veto(trade, RiskRule::PortfolioLimits, LIMITS_CONFIDENCE, reason);
    }

    let buying = trade.action.increases_exposure();

    if buying && snapshot.current_drawdown_pct > limits.max_drawdown_percent {
        let reason = format!(
            "Drawdown circuit breaker: current drawdown {:.2}% exceeds max {:.2}%; new exposure blocked",
            snapshot.current_drawdown_pct, limits.max_drawdown_percent
        );
        info!(symbol = %trade.symbol, drawdown = snapshot.current_drawdown_pct, "Trade vetoed by drawdown breaker");
        return veto(
            trade,
            RiskRule::DrawdownCircuitBreaker,
            CIRCUIT_BREAKER_CONFIDENCE,
            reason,
        );
    }

    let warning_level = limits.max_drawdown_percent * DRAWDOWN_WARNING_SHARE;
    if buying && snapshot.current_drawdown_pct > warning_level {
        let reason = format!(
            "Drawdown warning: current drawdown {:.2}% is above {:.2}% (80% of max {:.2}%)",
            snapshot.current_drawdown_pct, warning_level, limits.max_drawdown_percent
        );
        info!(symbol = %trade.symbol, drawdown = snapshot.current_drawdown_pct, "Trade vetoed by drawdown warning");
        return veto(
            trade,
            RiskRule::DrawdownWarning,
            DRAWDOWN_WARNING_CONFIDENCE,
            reason,
        );
    }

    if buying {
        if let Some(volatility) = snapshot.volatility {
            if volatility > HIGH_VOLATILITY && snapshot.limits_utilization > HIGH_UTILIZATION {
                let reason = format!(
                    "High volatility {:.2}% with limits utilization {:.0}% (thresholds {:.0}% / {:.0}%)",
                    volatility * 100.0,
                    snapshot.limits_utilization * 100.0,
                    HIGH_VOLATILITY * 100.0,
                    HIGH_UTILIZATION * 100.0
                );
                info!(symbol = %trade.symbol, volatility, utilization = snapshot.limits_utilization, "Trade vetoed by volatility");
                return veto(
                    trade,
                    RiskRule::VolatilityUtilization,
                    VOLATILITY_CONFIDENCE,
                    reason,
                );
            }
        }
    }

    let stats = snapshot.trade_stats.unwrap_or_else(|| prior_stats(limits));

    if buying {
        let optimal = optimal_size(limits, &stats, trade.confidence);
        debug!(symbol = %trade.symbol, optimal, requested = trade.size, "Kelly sizing");

        if trade.size > RESIZE_TRIGGER * optimal {
            let reason = if optimal <= 0.0 {
                format!(
                    "Kelly-optimal size is zero: win rate {:.2} at signal confidence {:.2} with payoff {:.2} has no positive edge; resized to 0",
                    stats.win_rate,
                    trade.confidence,
                    stats.avg_win / stats.avg_loss.max(f64::EPSILON)
                )
            } else {
                format!(
                    "Requested {:.2} exceeds 1.5x Kelly-optimal {:.2} (win rate {:.2}, confidence {:.2}, kelly fraction {:.2}); resized",
                    trade.size, optimal, stats.win_rate, trade.confidence, limits.kelly_fraction
                )
            };
            info!(symbol = %trade.symbol, requested = trade.size, recommended = optimal, "Trade resized");
            let mut resized = verdict(
                trade,
                VerdictKind::Resize,
                RiskRule::KellyResize,
                optimal,
                RESIZE_CONFIDENCE,
                reason,
            );
            attach_stop(&mut resized, limits, trade, snapshot);
            return resized;
        }

        let concentration_limit = limits.concentration_limit();
        let symbol_after = snapshot.exposure_for(&trade.symbol) + trade.size;
        let warning = concentration_limit * CONCENTRATION_WARNING_SHARE;
        if symbol_after > warning {
            let reason = format!(
                "Concentration warning: {} exposure would reach {:.2}, above {:.2} (80% of limit {:.2})",
                trade.symbol, symbol_after, warning, concentration_limit
            );
            info!(symbol = %trade.symbol, exposure = symbol_after, "Trade vetoed by concentration warning");
            return veto(
                trade,
                RiskRule::ConcentrationWarning,
                CONCENTRATION_CONFIDENCE,
                reason,
            );
        }
    }

    let mut approved = verdict(
        trade,
        VerdictKind::Approve,
        RiskRule::Approved,
        trade.size,
        APPROVE_CONFIDENCE,
        format!(
            "{} {:.2} {} within limits: exposure {:.2}/{:.2}, drawdown {:.2}%, {} open positions",
            trade.action,
            trade.size,
            trade.symbol,
            snapshot.current_exposure,
            limits.max_total_exposure,
            snapshot.current_drawdown_pct,
            snapshot.open_positions
        ),
    );
    attach_stop(&mut approved, limits, trade, snapshot);
    if let Some(sharpe) = snapshot.sharpe_ratio {
        if sharpe < limits.min_sharpe_ratio {
            approved.concerns.push(format!(
                "Sharpe ratio {sharpe:.2} below minimum {:.2}",
                limits.min_sharpe_ratio
            ));
        }
    }
    approved
}

/// First violated hard limit, if any.
fn portfolio_limit_breach(
    limits: &RiskLimits,
    trade: &ProposedTrade,
    snapshot: &RiskSnapshot,
) -> Option<String> {
    if !trade.size.is_finite() || trade.size < 0.0 {
        return Some(format!("Invalid requested size {}", trade.size));
    }
    if trade.size > limits.max_position_size {
        return Some(format!(
            "Position size {:.2} exceeds max {:.2}",
            trade.size, limits.max_position_size
        ));
    }
    if !trade.action.increases_exposure() {
        return None;
    }

    let total_after = snapshot.current_exposure + trade.size;
    if total_after > limits.max_total_exposure {
        return Some(format!(
            "Total exposure {:.2} + {:.2} exceeds max {:.2}",
            snapshot.current_exposure, trade.size, limits.max_total_exposure
        ));
    }

    let concentration_limit = limits.concentration_limit();
    let symbol_after = snapshot.exposure_for(&trade.symbol) + trade.size;
    if symbol_after > concentration_limit {
        return Some(format!(
            "{} exposure {:.2} would exceed concentration limit {:.2} ({:.0}% of {:.2})",
            trade.symbol,
            symbol_after,
            concentration_limit,
            limits.max_concentration * 100.0,
            limits.max_total_exposure
        ));
    }

    if snapshot.open_positions >= limits.max_open_positions && !snapshot.holds(&trade.symbol) {
        return Some(format!(
            "{} open positions at max {}",
            snapshot.open_positions, limits.max_open_positions
        ));
    }

    None
}

fn attach_stop(
    verdict: &mut RiskVerdict,
    limits: &RiskLimits,
    trade: &ProposedTrade,
    snapshot: &RiskSnapshot,
) {
    if let Some(entry) = trade.entry_price {
        verdict.stop_loss = stop_loss(
            trade.action,
            entry,
            snapshot.volatility,
            limits.stop_loss_multiplier,
        );
        if snapshot.volatility.is_none() && verdict.stop_loss.is_some() {
            verdict.concerns.push(format!(
                "Volatility unknown; stop uses default {:.0}%",
                DEFAULT_VOLATILITY * 100.0
            ));
        }
    }
}

fn veto(trade: &ProposedTrade, rule: RiskRule, confidence: f64, reasoning: String) -> RiskVerdict {
    verdict(trade, VerdictKind::Veto, rule, 0.0, confidence, reasoning)
}

pub(crate) fn verdict(
    trade: &ProposedTrade,
    kind: VerdictKind,
    rule: RiskRule,
    recommended_size: f64,
    confidence: f64,
    reasoning: String,
) -> RiskVerdict {
    RiskVerdict {
        symbol: trade.symbol.clone(),
        action: trade.action,
        kind,
        approved: kind != VerdictKind::Veto,
        rule,
        source: VerdictSource::Deterministic,
        requested_size: trade.size,
        recommended_size,
        stop_loss: None,
        take_profit: None,
        confidence,
        reasoning,
        concerns: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(action: Action, size: f64, confidence: f64) -> ProposedTrade {
        ProposedTrade {
            symbol: "BTC-USD".to_string(),
            action,
            size,
            confidence,
            entry_price: Some(40_000.0),
        }
    }

    fn calm() -> RiskSnapshot {
        RiskSnapshot {
            portfolio_value: 100_000.0,
            current_exposure: 5_000.0,
            open_positions: 2,
            volatility: Some(0.02),
            limits_utilization: 0.1,
            ..RiskSnapshot::default()
        }
    }

    #[test]
    fn drawdown_breaker_blocks_buy_but_not_sell() {
        let limits = RiskLimits::default();
        let snapshot = RiskSnapshot {
            current_drawdown_pct: 25.0,
            ..calm()
        };

        let buy = evaluate_rules(&limits, &trade(Action::Buy, 1_000.0, 0.9), &snapshot);
        assert!(buy.is_veto());
        assert_eq!(buy.rule, RiskRule::DrawdownCircuitBreaker);
        assert!(buy.confidence >= 0.95);
        assert!(buy.reasoning.contains("25.00%"));

        let sell = evaluate_rules(&limits, &trade(Action::Sell, 1_000.0, 0.9), &snapshot);
        assert!(sell.approved);
        assert_eq!(sell.rule, RiskRule::Approved);
        assert!(sell.stop_loss.unwrap() > 40_000.0);
    }

    #[test]
    fn drawdown_warning_fires_below_max() {
        let limits = RiskLimits::default();
        let snapshot = RiskSnapshot {
            current_drawdown_pct: 17.0,
            ..calm()
        };
        let v = evaluate_rules(&limits, &trade(Action::Buy, 1_000.0, 0.9), &snapshot);
        assert_eq!(v.rule, RiskRule::DrawdownWarning);
        assert!((v.confidence - DRAWDOWN_WARNING_CONFIDENCE).abs() < 1e-12);
    }

    #[test]
    fn portfolio_limits_come_first() {
        let limits = RiskLimits::default();
        let snapshot = RiskSnapshot {
            current_drawdown_pct: 25.0,
            ..calm()
        };
        let v = evaluate_rules(&limits, &trade(Action::Buy, 12_000.0, 0.9), &snapshot);
        assert_eq!(v.rule, RiskRule::PortfolioLimits);
        assert!((v.confidence - LIMITS_CONFIDENCE).abs() < 1e-12);
        assert_eq!(v.recommended_size, 0.0);
    }

    #[test]
    fn sell_still_respects_position_ceiling() {
        let limits = RiskLimits::default();
        let v = evaluate_rules(&limits, &trade(Action::Sell, 12_000.0, 0.9), &calm());
        assert!(v.is_veto());
        assert_eq!(v.rule, RiskRule::PortfolioLimits);
    }

    #[test]
    fn total_exposure_and_open_positions() {
        let limits = RiskLimits::default();
        let heavy = RiskSnapshot {
            current_exposure: 49_500.0,
            ..calm()
        };
        let v = evaluate_rules(&limits, &trade(Action::Buy, 1_000.0, 0.9), &heavy);
        assert_eq!(v.rule, RiskRule::PortfolioLimits);
        assert!(v.reasoning.contains("Total exposure"));

        let crowded = RiskSnapshot {
            open_positions: 10,
            ..calm()
        };
        let v = evaluate_rules(&limits, &trade(Action::Buy, 1_000.0, 0.9), &crowded);
        assert_eq!(v.rule, RiskRule::PortfolioLimits);
        assert!(v.reasoning.contains("open positions"));

        let mut adding = crowded.clone();
        adding.symbol_exposure.insert("BTC-USD".to_string(), 2_000.0);
        let v = evaluate_rules(&limits, &trade(Action::Buy, 1_000.0, 0.9), &adding);
        assert!(v.approved);
    }

    #[test]
    fn volatility_with_high_utilization_vetoes() {
        let limits = RiskLimits::default();
        let snapshot = RiskSnapshot {
            volatility: Some(0.06),
            limits_utilization: 0.9,
            current_exposure: 1_000.0,
            ..calm()
        };
        let v = evaluate_rules(&limits, &trade(Action::Buy, 1_000.0, 0.9), &snapshot);
        assert_eq!(v.rule, RiskRule::VolatilityUtilization);
        assert!((v.confidence - VOLATILITY_CONFIDENCE).abs() < 1e-12);

        let quiet = RiskSnapshot {
            volatility: Some(0.06),
            limits_utilization: 0.5,
            ..calm()
        };
        let v = evaluate_rules(&limits, &trade(Action::Buy, 1_000.0, 0.9), &quiet);
        assert!(v.approved);
    }

    #[test]
    fn oversized_request_is_resized_to_kelly() {
        let limits = RiskLimits::default();
        let v = evaluate_rules(&limits, &trade(Action::Buy, 4_000.0, 0.9), &calm());
        assert!(v.approved);
        assert!(v.is_resize());
        assert_eq!(v.rule, RiskRule::KellyResize);
        assert!((v.recommended_size - 1979.17).abs() < 1.0);
        assert!(v.reasoning.contains("Kelly"));
        assert!(v.stop_loss.is_some());
    }

    #[test]
    fn no_edge_resizes_buy_to_zero() {
        let limits = RiskLimits::default();
        let v = evaluate_rules(&limits, &trade(Action::Buy, 500.0, 0.4), &calm());
        assert!(!v.is_veto());
        assert!(v.is_resize());
        assert_eq!(v.rule, RiskRule::KellyResize);
        assert_eq!(v.recommended_size, 0.0);
        assert!((v.confidence - RESIZE_CONFIDENCE).abs() < 1e-12);
        assert!(v.reasoning.contains("no positive edge"));
    }

    #[test]
    fn typical_coordinated_buy_is_resized_not_vetoed() {
        // A two-agent weighted vote lands around 0.3 confidence.
        let limits = RiskLimits::default();
        let v = evaluate_rules(&limits, &trade(Action::Buy, 320.0, 0.32), &calm());
        assert_eq!(v.kind, VerdictKind::Resize);
        assert!(v.approved);
    }

    #[test]
    fn concentration_warning_below_hard_limit() {
        let limits = RiskLimits::default();
        let mut snapshot = calm();
        snapshot.symbol_exposure.insert("BTC-USD".to_string(), 9_000.0);
        // 9_000 + 1_500 = 10_500 > 0.8 * 12_500
        let v = evaluate_rules(&limits, &trade(Action::Buy, 1_500.0, 0.9), &snapshot);
        assert_eq!(v.rule, RiskRule::ConcentrationWarning);
        assert!((v.confidence - CONCENTRATION_CONFIDENCE).abs() < 1e-12);
    }

    #[test]
    fn approval_carries_stop_and_sharpe_concern() {
        let limits = RiskLimits::default();
        let snapshot = RiskSnapshot {
            sharpe_ratio: Some(0.2),
            ..calm()
        };
        let v = evaluate_rules(&limits, &trade(Action::Buy, 1_500.0, 0.9), &snapshot);
        assert_eq!(v.kind, VerdictKind::Approve);
        assert_eq!(v.recommended_size, 1_500.0);
        assert!((v.stop_loss.unwrap() - 38_400.0).abs() < 1e-9);
        assert!(v.concerns.iter().any(|c| c.contains("Sharpe")));
    }

    #[test]
    fn hold_is_approved_at_zero_size() {
        let limits = RiskLimits::default();
        let v = evaluate_rules(&limits, &trade(Action::Hold, 1_000.0, 0.5), &calm());
        assert!(v.approved);
        assert_eq!(v.rule, RiskRule::Hold);
        assert_eq!(v.recommended_size, 0.0);
    }

    #[test]
    fn realised_stats_replace_priors() {
        let limits = RiskLimits::default();
        let snapshot = RiskSnapshot {
            trade_stats: Some(quorum_models::risk::TradeStats {
                win_rate: 0.7,
                avg_win: 2.0,
                avg_loss: 1.0,
                samples: 40,
            }),
            ..calm()
        };
        // Priors leave no edge at confidence 0.5; realised stats give one.
        let v = evaluate_rules(&limits, &trade(Action::Buy, 500.0, 0.5), &snapshot);
        assert!(v.approved);
        assert!(v.recommended_size > 300.0);
    }
}
