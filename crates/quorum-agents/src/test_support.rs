//! Deterministic doubles for the collaborators the decision core talks to.
//!
//! Used by the unit tests in this crate, by `tests/`, and by the runner's
//! lifecycle tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use quorum_models::advisory::{RiskAssessmentRequest, RiskAssessmentResponse};
use quorum_models::portfolio::PortfolioSnapshot;
use quorum_store::TradeOutcome;

use crate::error::AgentError;
use crate::observation::{Observation, ObservationSource};
use crate::portfolio::PortfolioSource;
use crate::risk::RiskAdvisor;

pub use quorum_models::clock::FixedClock;

type Responder = Box<dyn Fn(&str) -> Result<Observation, AgentError> + Send + Sync>;

/// An observation source answering from a closure.
pub struct ScriptedSource {
    name: String,
    responder: Responder,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    /// A source that fails until given a responder.
    pub fn new(name: &str) -> Self {
        let owned = name.to_string();
        Self {
            name: owned.clone(),
            responder: Box::new(move |_| {
                Err(AgentError::Source {
                    source_name: owned.clone(),
                    reason: "no responder scripted".to_string(),
                })
            }),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(name: &str) -> Self {
        let owned = name.to_string();
        Self::new(name).always(move |_| {
            Err(AgentError::Source {
                source_name: owned.clone(),
                reason: "connection refused".to_string(),
            })
        })
    }

    pub fn always<F>(mut self, responder: F) -> Self
    where
        F: Fn(&str) -> Result<Observation, AgentError> + Send + Sync + 'static,
    {
        self.responder = Box::new(responder);
        self
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObservationSource for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn observe(&self, symbol: &str) -> Result<Observation, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.responder)(symbol)
    }
}

/// An advisor that replays a fixed script of responses, one per call.
pub struct ScriptedAdvisor {
    script: Mutex<VecDeque<Result<RiskAssessmentResponse, AgentError>>>,
    always_fail: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedAdvisor {
    pub fn new(script: Vec<Result<RiskAssessmentResponse, AgentError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            always_fail: false,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Every call fails as if the CLI were missing.
    pub fn failing() -> Self {
        Self {
            always_fail: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RiskAdvisor for ScriptedAdvisor {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn assess(
        &self,
        _request: &RiskAssessmentRequest,
    ) -> Result<RiskAssessmentResponse, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.always_fail {
            return Err(AgentError::Cli("claude: command not found".to_string()));
        }
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| Err(AgentError::Advisory("script exhausted".to_string())))
    }
}

/// A portfolio of record that returns whatever it was last given.
pub struct StaticPortfolio {
    snapshot: Mutex<PortfolioSnapshot>,
    trades: Mutex<Vec<TradeOutcome>>,
}

impl StaticPortfolio {
    pub fn new(snapshot: PortfolioSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
            trades: Mutex::new(Vec::new()),
        }
    }

    pub fn with_trades(self, trades: Vec<TradeOutcome>) -> Self {
        *self.trades.lock().unwrap_or_else(PoisonError::into_inner) = trades;
        self
    }

    pub fn set_snapshot(&self, snapshot: PortfolioSnapshot) {
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }
}

#[async_trait]
impl PortfolioSource for StaticPortfolio {
    async fn snapshot(&self) -> Result<PortfolioSnapshot, AgentError> {
        Ok(self
            .snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn trade_outcomes(&self, limit: usize) -> Result<Vec<TradeOutcome>, AgentError> {
        let trades = self.trades.lock().unwrap_or_else(PoisonError::into_inner);
        let skip = trades.len().saturating_sub(limit);
        Ok(trades[skip..].to_vec())
    }
}
