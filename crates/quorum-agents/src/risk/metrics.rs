//! Portfolio metrics feeding the risk snapshot: drawdown, Sharpe ratio,
//! realised trade statistics.

use chrono::{DateTime, Utc};
use quorum_models::config::RiskLimits;
use quorum_models::portfolio::{EquityWatermark, MarketRegime, PortfolioSnapshot, RiskSnapshot};
use quorum_models::risk::TradeStats;
use quorum_store::{BeliefStore, TradeOutcome};
use rust_decimal::prelude::ToPrimitive;

/// Trading days per year; daily points annualise with this many periods.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;
const SECONDS_PER_DAY: f64 = 86_400.0;

pub const VOLATILITY_KEY: &str = "market.volatility";
pub const REGIME_KEY: &str = "market.regime";

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Drawdown {
    /// Decline of the last point from the running peak, in percent.
    pub current_pct: f64,
    /// Deepest peak-to-trough decline over the series, in percent.
    pub max_pct: f64,
    pub peak: f64,
}

/// Peak-to-trough drawdown over an equity series (oldest first).
pub fn drawdown(equity: &[f64]) -> Drawdown {
    let mut result = Drawdown::default();
    for &value in equity.iter().filter(|v| v.is_finite()) {
        if value > result.peak {
            result.peak = value;
        }
        let current = if result.peak > 0.0 {
            (result.peak - value) / result.peak * 100.0
        } else {
            0.0
        };
        result.current_pct = current;
        result.max_pct = result.max_pct.max(current);
    }
    result
}

/// Fold the all-time watermark into a drawdown measured over a bounded
/// window ending at `current`.
pub fn with_watermark(window: Drawdown, current: f64, mark: Option<&EquityWatermark>) -> Drawdown {
    let Some(mark) = mark else {
        return window;
    };
    let peak = mark.peak_equity.to_f64().unwrap_or(0.0);
    if peak <= window.peak {
        return Drawdown {
            max_pct: window.max_pct.max(mark.max_drawdown_pct),
            ..window
        };
    }
    let current_pct = mark.drawdown_pct(current);
    Drawdown {
        current_pct,
        max_pct: window.max_pct.max(mark.max_drawdown_pct).max(current_pct),
        peak,
    }
}

/// Simple period-over-period returns. Periods starting at non-positive equity are skipped.
pub fn returns(equity: &[f64]) -> Vec<f64> {
    equity
        .windows(2)
        .filter(|w| w[0] > 0.0 && w[0].is_finite() && w[1].is_finite())
        .map(|w| (w[1] - w[0]) / w[0])
        .collect()
}

fn mean_and_sample_stdev(values: &[f64]) -> Option<(f64, f64)> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some((mean, variance.sqrt()))
}

/// Per-period volatility (sample standard deviation of returns).
pub fn volatility(returns: &[f64]) -> Option<f64> {
    mean_and_sample_stdev(returns).map(|(_, sd)| sd)
}

/// Return periods per year implied by the mean spacing of `timestamps`
/// (oldest first), counting a year as 252 trading days. Daily points give
/// 252, ten-second points 252 * 8640. Falls back to daily spacing when the
/// spacing cannot be measured.
pub fn periods_per_year(timestamps: &[DateTime<Utc>]) -> f64 {
    let (Some(first), Some(last)) = (timestamps.first(), timestamps.last()) else {
        return TRADING_DAYS_PER_YEAR;
    };
    let intervals = timestamps.len().saturating_sub(1) as f64;
    let span = (*last - *first).num_milliseconds() as f64 / 1_000.0;
    if intervals < 1.0 || span <= 0.0 {
        return TRADING_DAYS_PER_YEAR;
    }
    TRADING_DAYS_PER_YEAR * SECONDS_PER_DAY / (span / intervals)
}

/// Annualised Sharpe ratio over returns sampled `periods_per_year` times a
/// year. None with fewer than two returns or zero variance.
pub fn sharpe_ratio(returns: &[f64], risk_free_rate: f64, periods_per_year: f64) -> Option<f64> {
    let (mean, sd) = mean_and_sample_stdev(returns)?;
    if sd <= f64::EPSILON || !periods_per_year.is_finite() || periods_per_year <= 0.0 {
        return None;
    }
    let excess = mean - risk_free_rate / periods_per_year;
    Some(excess / sd * periods_per_year.sqrt())
}

/// Win rate and average win/loss from closed trades.
///
/// Returns None until `min_trades_for_stats` outcomes exist; the risk gate
/// then keeps using the configured priors.
pub fn trade_stats(outcomes: &[TradeOutcome], limits: &RiskLimits) -> Option<TradeStats> {
    if outcomes.is_empty() || outcomes.len() < limits.min_trades_for_stats {
        return None;
    }
    let pnls: Vec<f64> = outcomes.iter().filter_map(|o| o.pnl.to_f64()).collect();
    let wins: Vec<f64> = pnls.iter().copied().filter(|p| *p > 0.0).collect();
    let losses: Vec<f64> = pnls.iter().copied().filter(|p| *p < 0.0).map(f64::abs).collect();

    let average = |xs: &[f64]| {
        if xs.is_empty() {
            0.0
        } else {
            xs.iter().sum::<f64>() / xs.len() as f64
        }
    };

    Some(TradeStats {
        win_rate: wins.len() as f64 / pnls.len().max(1) as f64,
        avg_win: average(&wins),
        // No losses yet: fall back to the prior so the payoff ratio stays meaningful.
        avg_loss: if losses.is_empty() {
            limits.avg_loss
        } else {
            average(&losses)
        },
        samples: pnls.len(),
    })
}

/// Build the live risk snapshot from the portfolio of record, the risk
/// agent's market beliefs and the recorded trade outcomes.
pub fn build_snapshot(
    portfolio: &PortfolioSnapshot,
    limits: &RiskLimits,
    beliefs: &BeliefStore,
    outcomes: &[TradeOutcome],
) -> RiskSnapshot {
    let mut equity: Vec<f64> = portfolio
        .equity_history
        .iter()
        .filter_map(|p| p.equity.to_f64())
        .collect();
    let current_equity = portfolio.equity_f64();
    equity.push(current_equity);
    let timestamps: Vec<DateTime<Utc>> = portfolio
        .equity_history
        .iter()
        .map(|p| p.recorded_at)
        .chain(std::iter::once(portfolio.taken_at))
        .collect();

    let dd = with_watermark(
        drawdown(&equity),
        current_equity,
        portfolio.high_water_mark.as_ref(),
    );
    let period_returns = returns(&equity);
    let current_exposure = portfolio.total_exposure();

    let volatility = beliefs
        .number(VOLATILITY_KEY)
        .filter(|v| v.is_finite() && *v >= 0.0)
        .or_else(|| volatility(&period_returns));
    let market_regime = beliefs
        .get(REGIME_KEY)
        .and_then(|b| b.value.as_str().map(MarketRegime::from_label))
        .unwrap_or_default();

    RiskSnapshot {
        portfolio_value: current_equity,
        current_exposure,
        open_positions: portfolio.open_positions(),
        symbol_exposure: portfolio.exposure_by_symbol(),
        current_drawdown_pct: dd.current_pct,
        max_drawdown_pct: dd.max_pct,
        volatility,
        market_regime,
        limits_utilization: current_exposure / limits.max_total_exposure,
        sharpe_ratio: sharpe_ratio(
            &period_returns,
            limits.risk_free_rate,
            periods_per_year(&timestamps),
        ),
        trade_stats: trade_stats(outcomes, limits),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use quorum_models::portfolio::{EquityPoint, EquityWatermark, Position};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    #[test]
    fn drawdown_tracks_peak_and_trough() {
        let dd = drawdown(&[100.0, 120.0, 90.0, 110.0]);
        assert_eq!(dd.peak, 120.0);
        assert!((dd.max_pct - 25.0).abs() < 1e-9);
        assert!((dd.current_pct - 100.0 * 10.0 / 120.0).abs() < 1e-9);
    }

    #[test]
    fn drawdown_of_rising_series_is_zero() {
        let dd = drawdown(&[100.0, 101.0, 105.0]);
        assert_eq!(dd.current_pct, 0.0);
        assert_eq!(dd.max_pct, 0.0);
        assert_eq!(drawdown(&[]), Drawdown::default());
    }

    #[test]
    fn sharpe_requires_variance() {
        let daily = TRADING_DAYS_PER_YEAR;
        assert_eq!(sharpe_ratio(&[0.01], 0.02, daily), None);
        assert_eq!(sharpe_ratio(&[0.01, 0.01, 0.01], 0.02, daily), None);

        let good = sharpe_ratio(&[0.01, 0.02, 0.015, 0.005], 0.02, daily).unwrap();
        let bad = sharpe_ratio(&[-0.01, -0.02, 0.0, -0.005], 0.02, daily).unwrap();
        assert!(good > 0.0);
        assert!(bad < 0.0);
    }

    #[test]
    fn periods_follow_point_spacing() {
        let t0 = Utc::now();
        let daily: Vec<_> = (0..5).map(|i| t0 + Duration::days(i)).collect();
        assert!((periods_per_year(&daily) - 252.0).abs() < 1e-6);

        let ticks: Vec<_> = (0..5).map(|i| t0 + Duration::seconds(10 * i)).collect();
        assert!((periods_per_year(&ticks) - 252.0 * 8_640.0).abs() < 1e-3);

        assert_eq!(periods_per_year(&[t0]), TRADING_DAYS_PER_YEAR);
        assert_eq!(periods_per_year(&[t0, t0]), TRADING_DAYS_PER_YEAR);
    }

    #[test]
    fn sub_daily_points_are_annualised_by_their_spacing() {
        let limits = RiskLimits {
            risk_free_rate: 0.0,
            ..RiskLimits::default()
        };
        let path = [dec!(100000), dec!(100010), dec!(100005), dec!(100020), dec!(100018)];
        let sharpe_at = |spacing: Duration| {
            let t0 = Utc::now() - spacing * 10;
            let mut portfolio = PortfolioSnapshot::empty(dec!(100030), t0 + spacing * 5);
            for (i, equity) in path.into_iter().enumerate() {
                portfolio.equity_history.push(EquityPoint {
                    recorded_at: t0 + spacing * i as i32,
                    equity,
                });
            }
            build_snapshot(&portfolio, &limits, &BeliefStore::new(), &[])
                .sharpe_ratio
                .unwrap()
        };

        let daily = sharpe_at(Duration::days(1));
        let ticks = sharpe_at(Duration::seconds(10));
        assert!((ticks / daily - 8_640f64.sqrt()).abs() < 1e-6);

        // With a risk-free rate, 10s returns only pay a 10s slice of it.
        let rf = RiskLimits::default();
        let returns = returns(&[100_000.0, 100_010.0, 100_005.0, 100_020.0]);
        let per_tick = sharpe_ratio(&returns, rf.risk_free_rate, 252.0 * 8_640.0).unwrap();
        let as_daily = sharpe_ratio(&returns, rf.risk_free_rate, 252.0).unwrap();
        assert!(per_tick > as_daily);
    }

    #[test]
    fn watermark_extends_a_short_window() {
        let now = Utc::now();
        let mut portfolio = PortfolioSnapshot::empty(dec!(75000), now);
        portfolio.equity_history.push(EquityPoint {
            recorded_at: now - Duration::seconds(10),
            equity: dec!(75000),
        });
        let windowed = build_snapshot(&portfolio, &RiskLimits::default(), &BeliefStore::new(), &[]);
        assert_eq!(windowed.current_drawdown_pct, 0.0);

        portfolio.high_water_mark = Some(EquityWatermark {
            peak_equity: dec!(100000),
            peak_at: now - Duration::hours(3),
            max_drawdown_pct: 25.0,
        });
        let marked = build_snapshot(&portfolio, &RiskLimits::default(), &BeliefStore::new(), &[]);
        assert!((marked.current_drawdown_pct - 25.0).abs() < 1e-9);
        assert!((marked.max_drawdown_pct - 25.0).abs() < 1e-9);

        // A new high inside the window supersedes an older, lower mark.
        portfolio.high_water_mark = Some(EquityWatermark {
            peak_equity: dec!(70000),
            peak_at: now - Duration::hours(3),
            max_drawdown_pct: 5.0,
        });
        let fresh = build_snapshot(&portfolio, &RiskLimits::default(), &BeliefStore::new(), &[]);
        assert_eq!(fresh.current_drawdown_pct, 0.0);
        assert!((fresh.max_drawdown_pct - 5.0).abs() < 1e-9);
    }

    #[test]
    fn returns_skip_nonpositive_bases() {
        let r = returns(&[0.0, 100.0, 110.0]);
        assert_eq!(r.len(), 1);
        assert!((r[0] - 0.1).abs() < 1e-12);
    }

    fn outcome(pnl: Decimal) -> TradeOutcome {
        TradeOutcome {
            symbol: "BTC-USD".to_string(),
            pnl,
            closed_at: Utc::now(),
        }
    }

    #[test]
    fn trade_stats_wait_for_enough_samples() {
        let limits = RiskLimits {
            min_trades_for_stats: 4,
            ..RiskLimits::default()
        };
        let few = vec![outcome(dec!(10)), outcome(dec!(-5))];
        assert!(trade_stats(&few, &limits).is_none());

        let enough = vec![
            outcome(dec!(30)),
            outcome(dec!(10)),
            outcome(dec!(-10)),
            outcome(dec!(20)),
        ];
        let stats = trade_stats(&enough, &limits).unwrap();
        assert!((stats.win_rate - 0.75).abs() < 1e-12);
        assert!((stats.avg_win - 20.0).abs() < 1e-12);
        assert!((stats.avg_loss - 10.0).abs() < 1e-12);
        assert_eq!(stats.samples, 4);
    }

    #[test]
    fn snapshot_from_portfolio_and_beliefs() {
        let now = Utc::now();
        let portfolio = PortfolioSnapshot {
            positions: vec![Position {
                symbol: "ETH-USD".to_string(),
                size: dec!(4),
                entry_price: dec!(2500),
            }],
            equity: dec!(90000),
            equity_history: vec![
                EquityPoint {
                    recorded_at: now - Duration::days(2),
                    equity: dec!(100000),
                },
                EquityPoint {
                    recorded_at: now - Duration::days(1),
                    equity: dec!(120000),
                },
            ],
            high_water_mark: None,
            taken_at: now,
        };
        let beliefs = BeliefStore::new();
        beliefs.update(VOLATILITY_KEY, 0.035, 0.8, "feed");
        beliefs.update(REGIME_KEY, "volatile", 0.6, "feed");

        let snapshot = build_snapshot(&portfolio, &RiskLimits::default(), &beliefs, &[]);
        assert_eq!(snapshot.portfolio_value, 90_000.0);
        assert!((snapshot.current_exposure - 10_000.0).abs() < 1e-9);
        assert!((snapshot.limits_utilization - 0.2).abs() < 1e-12);
        assert!((snapshot.current_drawdown_pct - 25.0).abs() < 1e-9);
        assert_eq!(snapshot.volatility, Some(0.035));
        assert_eq!(snapshot.market_regime, MarketRegime::Volatile);
        assert!(snapshot.holds("ETH-USD"));
        assert!(snapshot.trade_stats.is_none());
    }

    #[test]
    fn snapshot_volatility_falls_back_to_returns() {
        let now = Utc::now();
        let mut portfolio = PortfolioSnapshot::empty(dec!(103), now);
        for (i, equity) in [dec!(100), dec!(102), dec!(101)].into_iter().enumerate() {
            portfolio.equity_history.push(EquityPoint {
                recorded_at: now - Duration::hours(3 - i as i64),
                equity,
            });
        }
        let snapshot = build_snapshot(&portfolio, &RiskLimits::default(), &BeliefStore::new(), &[]);
        assert!(snapshot.volatility.unwrap() > 0.0);
        assert_eq!(snapshot.market_regime, MarketRegime::Unknown);
        assert!(snapshot.sharpe_ratio.is_some());
    }
}
