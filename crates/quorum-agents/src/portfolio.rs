use async_trait::async_trait;
use quorum_models::portfolio::PortfolioSnapshot;
use quorum_store::TradeOutcome;

use crate::error::AgentError;

/// Position-of-record collaborator. The decision core only reads from it.
#[async_trait]
pub trait PortfolioSource: Send + Sync {
    /// Current positions, equity and equity history (oldest first).
    async fn snapshot(&self) -> Result<PortfolioSnapshot, AgentError>;

    /// The most recent closed trades, oldest first.
    async fn trade_outcomes(&self, limit: usize) -> Result<Vec<TradeOutcome>, AgentError>;
}
