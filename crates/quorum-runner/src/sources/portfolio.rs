use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use quorum_agents::{AgentError, PortfolioSource};
use quorum_models::clock::Clock;
use quorum_models::portfolio::{EquityPoint, PortfolioSnapshot, Position};
use quorum_store::{EquityLedger, StoreError, TradeOutcome};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

/// Equity points handed to the risk metrics each cycle. Drawdown also
/// sees the ledger's watermark, so the peak survives beyond this window.
pub const DEFAULT_HISTORY_LEN: usize = 500;

/// Equity points older than this are pruned from the ledger.
pub const EQUITY_RETENTION_DAYS: i64 = 30;

/// Positions and equity as written by the execution side.
#[derive(Debug, Deserialize)]
struct PortfolioFile {
    #[serde(default)]
    positions: Vec<Position>,
    equity: Decimal,
}

/// Portfolio of record: a JSON file for positions and equity, plus the
/// SQLite ledger for equity history and closed trades.
///
/// Each snapshot appends the current equity to the ledger so drawdown and
/// Sharpe build up across cycles.
pub struct LedgerPortfolio {
    portfolio_path: PathBuf,
    ledger: Mutex<EquityLedger>,
    clock: Arc<dyn Clock>,
    history_len: usize,
}

impl LedgerPortfolio {
    pub fn new(
        portfolio_path: impl Into<PathBuf>,
        ledger: EquityLedger,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            portfolio_path: portfolio_path.into(),
            ledger: Mutex::new(ledger),
            clock,
            history_len: DEFAULT_HISTORY_LEN,
        }
    }

    fn with_ledger<T>(
        &self,
        f: impl FnOnce(&EquityLedger) -> Result<T, StoreError>,
    ) -> Result<T, AgentError> {
        let ledger = self.ledger.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(f(&ledger)?)
    }

    async fn read_file(&self) -> Result<PortfolioFile, AgentError> {
        let raw = tokio::fs::read_to_string(&self.portfolio_path)
            .await
            .map_err(|e| AgentError::Source {
                source_name: "portfolio".to_string(),
                reason: format!("{}: {e}", self.portfolio_path.display()),
            })?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[async_trait]
impl PortfolioSource for LedgerPortfolio {
    async fn snapshot(&self) -> Result<PortfolioSnapshot, AgentError> {
        let file = self.read_file().await?;
        let now = self.clock.now();
        let point = EquityPoint {
            recorded_at: now,
            equity: file.equity,
        };

        // History and watermark exclude the point being recorded; the
        // metrics append the current equity themselves.
        let (equity_history, high_water_mark) = self.with_ledger(|ledger| {
            ledger.prune_equity_before(now - chrono::Duration::days(EQUITY_RETENTION_DAYS))?;
            let history = ledger.equity_history(self.history_len)?;
            let mark = ledger.watermark()?;
            ledger.record_equity(&point)?;
            Ok((history, mark))
        })?;
        debug!(
            positions = file.positions.len(),
            equity = %file.equity,
            history = equity_history.len(),
            peak = ?high_water_mark.as_ref().map(|m| m.peak_equity),
            "Portfolio snapshot"
        );

        Ok(PortfolioSnapshot {
            positions: file.positions,
            equity: file.equity,
            equity_history,
            high_water_mark,
            taken_at: now,
        })
    }

    async fn trade_outcomes(&self, limit: usize) -> Result<Vec<TradeOutcome>, AgentError> {
        self.with_ledger(|ledger| ledger.recent_trades(limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use quorum_agents::risk::evaluate_rules;
    use quorum_agents::risk::metrics::build_snapshot;
    use quorum_models::action::Action;
    use quorum_models::clock::FixedClock;
    use quorum_models::config::RiskLimits;
    use quorum_models::risk::{ProposedTrade, RiskRule};
    use quorum_store::BeliefStore;
    use rust_decimal_macros::dec;

    fn write_portfolio(path: &std::path::Path, equity: &str) {
        let body = format!(
            r#"{{"positions": [{{"symbol": "BTC-USD", "size": "0.1", "entry_price": "40000"}}], "equity": "{equity}"}}"#
        );
        std::fs::write(path, body).unwrap();
    }

    #[tokio::test]
    async fn snapshots_accumulate_equity_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portfolio.json");
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let ledger = EquityLedger::open_in_memory().unwrap();
        let source = LedgerPortfolio::new(&path, ledger, clock.clone());

        write_portfolio(&path, "100000");
        let first = source.snapshot().await.unwrap();
        assert!(first.equity_history.is_empty());
        assert_eq!(first.positions.len(), 1);
        assert_eq!(first.equity, dec!(100000));

        clock.advance(Duration::minutes(1));
        write_portfolio(&path, "98000");
        let second = source.snapshot().await.unwrap();
        assert_eq!(second.equity, dec!(98000));
        assert_eq!(second.equity_history.len(), 1);
        assert_eq!(second.equity_history[0].equity, dec!(100000));
        assert_eq!(second.taken_at, clock.now());
    }

    #[tokio::test]
    async fn drawdown_holds_after_the_peak_leaves_the_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portfolio.json");
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let source =
            LedgerPortfolio::new(&path, EquityLedger::open_in_memory().unwrap(), clock.clone());
        let limits = RiskLimits::default();

        write_portfolio(&path, "100000");
        source.snapshot().await.unwrap();
        write_portfolio(&path, "75000");

        // One snapshot per 10s evaluation tick, well past the history window.
        let mut last = None;
        for _ in 0..(DEFAULT_HISTORY_LEN + 100) {
            clock.advance(Duration::seconds(10));
            last = Some(source.snapshot().await.unwrap());
        }
        let portfolio = last.unwrap();
        assert_eq!(portfolio.equity_history.len(), DEFAULT_HISTORY_LEN);
        assert!(portfolio
            .equity_history
            .iter()
            .all(|p| p.equity == dec!(75000)));

        let risk = build_snapshot(&portfolio, &limits, &BeliefStore::new(), &[]);
        assert!((risk.current_drawdown_pct - 25.0).abs() < 1e-9);
        assert!((risk.max_drawdown_pct - 25.0).abs() < 1e-9);

        let buy = ProposedTrade {
            symbol: "BTC-USD".to_string(),
            action: Action::Buy,
            size: 1_000.0,
            confidence: 0.9,
            entry_price: Some(40_000.0),
        };
        let verdict = evaluate_rules(&limits, &buy, &risk);
        assert_eq!(verdict.rule, RiskRule::DrawdownCircuitBreaker);
        assert!(!verdict.approved);
    }

    #[tokio::test]
    async fn old_equity_points_are_pruned() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portfolio.json");
        write_portfolio(&path, "100000");
        let now = Utc::now();
        let ledger = EquityLedger::open_in_memory().unwrap();
        ledger
            .record_equity(&EquityPoint {
                recorded_at: now - Duration::days(EQUITY_RETENTION_DAYS + 1),
                equity: dec!(90000),
            })
            .unwrap();
        let source = LedgerPortfolio::new(&path, ledger, Arc::new(FixedClock::new(now)));

        let snapshot = source.snapshot().await.unwrap();
        assert!(snapshot.equity_history.is_empty());
    }

    #[tokio::test]
    async fn trade_outcomes_come_from_the_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = EquityLedger::open_in_memory().unwrap();
        let now = Utc::now();
        for (i, pnl) in [dec!(120), dec!(-40), dec!(75)].into_iter().enumerate() {
            ledger
                .record_trade(&TradeOutcome {
                    symbol: "ETH-USD".to_string(),
                    pnl,
                    closed_at: now + Duration::minutes(i as i64),
                })
                .unwrap();
        }
        let source = LedgerPortfolio::new(
            dir.path().join("portfolio.json"),
            ledger,
            Arc::new(FixedClock::new(now)),
        );

        let trades = source.trade_outcomes(2).await.unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[1].pnl, dec!(75));
    }

    #[tokio::test]
    async fn missing_portfolio_file_is_a_source_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = LedgerPortfolio::new(
            dir.path().join("absent.json"),
            EquityLedger::open_in_memory().unwrap(),
            Arc::new(FixedClock::new(Utc::now())),
        );
        assert!(matches!(source.snapshot().await, Err(AgentError::Source { .. })));
    }
}
