use std::str::FromStr;

use chrono::{DateTime, Utc};
use quorum_models::portfolio::{EquityPoint, EquityWatermark};
use rusqlite::{Connection, OptionalExtension};
use rust_decimal::Decimal;

use crate::error::StoreError;

/// Minimal persisted state: equity history for drawdown/Sharpe, the
/// all-time equity watermark, and closed trade results for the Kelly
/// statistics. Decimals are stored as text.
pub const LEDGER_DDL: &str = "\
CREATE TABLE IF NOT EXISTS equity_history (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    recorded_at TEXT NOT NULL,
    equity      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_equity_recorded ON equity_history(recorded_at);
CREATE TABLE IF NOT EXISTS equity_watermark (
    id               INTEGER PRIMARY KEY CHECK (id = 1),
    peak_equity      TEXT NOT NULL,
    peak_at          TEXT NOT NULL,
    max_drawdown_pct REAL NOT NULL
);
CREATE TABLE IF NOT EXISTS trade_outcomes (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    symbol      TEXT NOT NULL,
    pnl         TEXT NOT NULL,
    closed_at   TEXT NOT NULL
);
";

/// A closed trade's realised profit or loss.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeOutcome {
    pub symbol: String,
    pub pnl: Decimal,
    pub closed_at: DateTime<Utc>,
}

/// SQLite-backed equity and trade ledger.
///
/// `rusqlite::Connection` is not `Sync`; share it behind a `Mutex`.
pub struct EquityLedger {
    conn: Connection,
}

impl EquityLedger {
    /// Open (or create) the ledger file in WAL mode.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(LEDGER_DDL)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        tracing::info!(path, "Opened equity ledger");
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(LEDGER_DDL)?;
        Ok(Self { conn })
    }

    /// Append an equity point and fold it into the watermark, atomically.
    pub fn record_equity(&self, point: &EquityPoint) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO equity_history (recorded_at, equity) VALUES (?1, ?2)",
            rusqlite::params![point.recorded_at, point.equity.to_string()],
        )?;
        let mark = match read_watermark(&tx)? {
            Some(mark) => mark.observe(point),
            None => EquityWatermark::start(point),
        };
        tx.execute(
            "INSERT OR REPLACE INTO equity_watermark (id, peak_equity, peak_at, max_drawdown_pct) \
             VALUES (1, ?1, ?2, ?3)",
            rusqlite::params![mark.peak_equity.to_string(), mark.peak_at, mark.max_drawdown_pct],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Peak equity and worst drawdown over everything ever recorded.
    /// Pruning the history leaves it untouched.
    pub fn watermark(&self) -> Result<Option<EquityWatermark>, StoreError> {
        read_watermark(&self.conn)
    }

    /// The most recent `limit` equity points, oldest first.
    pub fn equity_history(&self, limit: usize) -> Result<Vec<EquityPoint>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT recorded_at, equity FROM equity_history ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![limit as i64], |row| {
                Ok((row.get::<_, DateTime<Utc>>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut points = rows
            .into_iter()
            .map(|(recorded_at, equity)| {
                Ok(EquityPoint {
                    recorded_at,
                    equity: parse_decimal("equity", &equity)?,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;
        points.reverse();
        Ok(points)
    }

    pub fn record_trade(&self, outcome: &TradeOutcome) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO trade_outcomes (symbol, pnl, closed_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![outcome.symbol, outcome.pnl.to_string(), outcome.closed_at],
        )?;
        Ok(())
    }

    /// The most recent `limit` closed trades, oldest first.
    pub fn recent_trades(&self, limit: usize) -> Result<Vec<TradeOutcome>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT symbol, pnl, closed_at FROM trade_outcomes ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, DateTime<Utc>>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut trades = rows
            .into_iter()
            .map(|(symbol, pnl, closed_at)| {
                Ok(TradeOutcome {
                    symbol,
                    pnl: parse_decimal("pnl", &pnl)?,
                    closed_at,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;
        trades.reverse();
        Ok(trades)
    }

    /// Drop equity points recorded before `cutoff`. Returns the rows deleted.
    pub fn prune_equity_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let deleted = self.conn.execute(
            "DELETE FROM equity_history WHERE recorded_at < ?1",
            rusqlite::params![cutoff],
        )?;
        if deleted > 0 {
            tracing::debug!(deleted, %cutoff, "Pruned equity history");
        }
        Ok(deleted)
    }

    pub fn equity_count(&self) -> Result<usize, StoreError> {
        let count: usize =
            self.conn
                .query_row("SELECT COUNT(*) FROM equity_history", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn read_watermark(conn: &Connection) -> Result<Option<EquityWatermark>, StoreError> {
    let row = conn
        .query_row(
            "SELECT peak_equity, peak_at, max_drawdown_pct FROM equity_watermark WHERE id = 1",
            [],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, DateTime<Utc>>(1)?,
                    row.get::<_, f64>(2)?,
                ))
            },
        )
        .optional()?;
    row.map(|(peak, peak_at, max_drawdown_pct)| {
        Ok(EquityWatermark {
            peak_equity: parse_decimal("peak_equity", &peak)?,
            peak_at,
            max_drawdown_pct,
        })
    })
    .transpose()
}

fn parse_decimal(column: &'static str, raw: &str) -> Result<Decimal, StoreError> {
    Decimal::from_str(raw).map_err(|_| StoreError::Corrupt {
        column,
        value: raw.to_string(),
    })
}
