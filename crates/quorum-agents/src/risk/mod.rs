//! The risk gate: final approve / veto / resize authority over proposed trades.

pub mod advisory;
pub mod breaker;
pub mod metrics;
pub mod rules;
pub mod sizing;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use quorum_models::action::Action;
use quorum_models::config::{AdvisoryConfig, QuorumConfig, RiskLimits};
use quorum_models::portfolio::RiskSnapshot;
use quorum_models::risk::{ProposedTrade, RiskRule, RiskVerdict};
use tracing::{debug, info, warn};

use crate::error::AgentError;

pub use advisory::{ClaudeAdvisor, RiskAdvisor};
pub use breaker::{BreakerState, CircuitBreaker};
pub use rules::evaluate_rules;

struct AdvisoryPath {
    advisor: Arc<dyn RiskAdvisor>,
    attempt_timeout: Duration,
    max_retries: u32,
    breaker: Mutex<CircuitBreaker>,
}

impl AdvisoryPath {
    fn breaker(&self) -> std::sync::MutexGuard<'_, CircuitBreaker> {
        self.breaker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Upper bound on one consultation: every attempt timing out.
    fn deadline(&self) -> Duration {
        self.attempt_timeout.saturating_mul(self.max_retries.saturating_add(1))
    }
}

/// Hands a half-open trial back if the consultation is dropped before it
/// records an outcome.
struct TrialRelease<'a> {
    path: &'a AdvisoryPath,
    armed: bool,
}

impl TrialRelease<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TrialRelease<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.path.breaker().release_trial();
        }
    }
}

/// Deterministic veto tree with an optional advisory strategy in front of it.
///
/// `evaluate` never fails: any advisory failure (timeout, malformed response,
/// open breaker) falls back to the deterministic verdict.
pub struct RiskGate {
    limits: RiskLimits,
    advisory: Option<AdvisoryPath>,
}

impl RiskGate {
    pub fn new(limits: RiskLimits) -> Self {
        Self {
            limits,
            advisory: None,
        }
    }

    pub fn with_advisor(
        limits: RiskLimits,
        advisor: Arc<dyn RiskAdvisor>,
        config: &AdvisoryConfig,
    ) -> Self {
        Self {
            limits,
            advisory: Some(AdvisoryPath {
                advisor,
                attempt_timeout: Duration::from_secs(config.timeout_seconds),
                max_retries: config.max_retries,
                breaker: Mutex::new(CircuitBreaker::new(&config.breaker)),
            }),
        }
    }

    /// Gate described by the configuration: deterministic, plus the Claude
    /// advisor when `advisory.enabled` is set.
    pub fn from_config(config: &QuorumConfig) -> Self {
        if config.advisory.enabled {
            info!(model = %config.advisory.model, "Advisory risk assessment enabled");
            Self::with_advisor(
                config.risk.clone(),
                Arc::new(ClaudeAdvisor::new(&config.advisory)),
                &config.advisory,
            )
        } else {
            Self::new(config.risk.clone())
        }
    }

    /// Override the per-attempt advisory timeout.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        if let Some(path) = self.advisory.as_mut() {
            path.attempt_timeout = timeout;
        }
        self
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    pub fn has_advisor(&self) -> bool {
        self.advisory.is_some()
    }

    /// Longest an advisory consultation may take, if an advisor is configured.
    pub fn advisory_deadline(&self) -> Option<Duration> {
        self.advisory.as_ref().map(AdvisoryPath::deadline)
    }

    pub fn breaker_state(&self) -> Option<BreakerState> {
        self.advisory.as_ref().map(|path| path.breaker().state())
    }

    pub fn evaluate_deterministic(
        &self,
        trade: &ProposedTrade,
        snapshot: &RiskSnapshot,
    ) -> RiskVerdict {
        evaluate_rules(&self.limits, trade, snapshot)
    }

    /// Evaluate a proposed trade.
    ///
    /// Hard limits and the drawdown breaker are never delegated: when they
    /// fire, the advisor is not consulted.
    pub async fn evaluate(&self, trade: &ProposedTrade, snapshot: &RiskSnapshot) -> RiskVerdict {
        self.evaluate_within(trade, snapshot, None).await
    }

    /// Evaluate with the advisor limited to `budget` on top of its own
    /// deadline. A zero budget skips the advisor. Returns within the
    /// smaller of the two plus the deterministic evaluation.
    pub async fn evaluate_within(
        &self,
        trade: &ProposedTrade,
        snapshot: &RiskSnapshot,
        budget: Option<Duration>,
    ) -> RiskVerdict {
        let deterministic = self.evaluate_deterministic(trade, snapshot);

        let Some(path) = &self.advisory else {
            return deterministic;
        };
        if trade.action == Action::Hold
            || matches!(
                deterministic.rule,
                RiskRule::PortfolioLimits | RiskRule::DrawdownCircuitBreaker
            )
        {
            return deterministic;
        }

        let deadline = budget.map_or(path.deadline(), |b| b.min(path.deadline()));
        if deadline.is_zero() {
            debug!(symbol = %trade.symbol, "No advisory budget left; using deterministic verdict");
            return deterministic;
        }

        let start = Instant::now();
        let consulted = match tokio::time::timeout(deadline, self.consult(path, trade, snapshot))
            .await
        {
            Ok(result) => result,
            Err(_) => {
                path.breaker().record_failure(Instant::now());
                Err(AgentError::Timeout(deadline.as_secs()))
            }
        };
        match consulted {
            Ok(verdict) => {
                info!(
                    symbol = %trade.symbol,
                    advisor = path.advisor.name(),
                    kind = ?verdict.kind,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Advisory verdict"
                );
                verdict
            }
            Err(e) => {
                if e.is_advisory_failure() {
                    warn!(symbol = %trade.symbol, error = %e, "Advisory unavailable; using deterministic verdict");
                } else {
                    warn!(symbol = %trade.symbol, error = %e, "Unexpected advisory error; using deterministic verdict");
                }
                deterministic
            }
        }
    }

    async fn consult(
        &self,
        path: &AdvisoryPath,
        trade: &ProposedTrade,
        snapshot: &RiskSnapshot,
    ) -> Result<RiskVerdict, AgentError> {
        if !path.breaker().allow(Instant::now()) {
            return Err(AgentError::CircuitOpen);
        }
        let mut trial = TrialRelease { path, armed: true };

        let request = advisory::build_request(trade, snapshot, &self.limits);
        let mut last_error = AgentError::Advisory("no attempt made".to_string());

        for attempt in 0..=path.max_retries {
            let outcome =
                match tokio::time::timeout(path.attempt_timeout, path.advisor.assess(&request))
                    .await
                {
                    Ok(Ok(response)) => response
                        .validate()
                        .map(|_| response)
                        .map_err(AgentError::Parse),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(AgentError::Timeout(path.attempt_timeout.as_secs())),
                };

            match outcome {
                Ok(response) => {
                    trial.disarm();
                    path.breaker().record_success(Instant::now());
                    return Ok(advisory::translate(
                        &response,
                        trade,
                        snapshot,
                        &self.limits,
                    ));
                }
                Err(e) => {
                    debug!(attempt, error = %e, "Advisory attempt failed");
                    last_error = e;
                }
            }
        }

        trial.disarm();
        path.breaker().record_failure(Instant::now());
        Err(last_error)
    }
}
