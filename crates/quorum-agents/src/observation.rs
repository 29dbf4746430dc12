//! Observation sources and the per-tick fan-out over (symbol x source).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quorum_models::candidate::Candidate;
use quorum_store::BeliefStore;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::AgentError;

/// Belief recording the share of sources that answered this tick.
pub const HEALTH_KEY: &str = "observation.health";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObservationData {
    /// Opportunities waiting to be scored.
    Opportunities { candidates: Vec<Candidate> },
    /// Named indicator readings (rsi, macd, macd_signal, sma_fast, sma_slow, momentum, ...).
    Indicators { readings: BTreeMap<String, f64> },
    /// Market-wide risk inputs.
    Market {
        #[serde(default)]
        volatility: Option<f64>,
        #[serde(default)]
        regime: Option<String>,
        /// Last traded price, used as the expected entry.
        #[serde(default)]
        price: Option<f64>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    pub symbol: String,
    pub source: String,
    pub observed_at: DateTime<Utc>,
    #[serde(flatten)]
    pub data: ObservationData,
}

impl Observation {
    pub fn belief_key(&self) -> String {
        format!("observation.{}.{}", self.symbol, self.source)
    }
}

/// A provider of raw observations. Mockable for testing.
#[async_trait]
pub trait ObservationSource: Send + Sync {
    fn name(&self) -> &str;

    async fn observe(&self, symbol: &str) -> Result<Observation, AgentError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Complete,
    /// Some sources failed; the tick continues with the rest.
    Degraded { failed: usize, total: usize },
}

#[derive(Debug, Clone)]
pub struct Gathered {
    /// Ordered by (symbol, source).
    pub observations: Vec<Observation>,
    pub outcome: CycleOutcome,
}

/// Query every (symbol, source) pair concurrently and wait for all of them.
///
/// Successful observations are written to `beliefs`. `observation.health`
/// records the successful fraction. When every pair fails the tick aborts
/// with `DataUnavailable`.
pub async fn gather_observations(
    agent: &str,
    sources: &[Arc<dyn ObservationSource>],
    symbols: &[String],
    beliefs: &BeliefStore,
) -> Result<Gathered, AgentError> {
    let start = Instant::now();
    let mut set = JoinSet::new();
    for source in sources {
        for symbol in symbols {
            let source = Arc::clone(source);
            let symbol = symbol.clone();
            set.spawn(async move {
                let result = source.observe(&symbol).await;
                (source.name().to_string(), symbol, result)
            });
        }
    }
    let total = set.len();

    let mut observations = Vec::with_capacity(total);
    let mut failed = 0usize;
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((_, _, Ok(observation))) => observations.push(observation),
            Ok((source, symbol, Err(e))) => {
                failed += 1;
                warn!(agent, source = %source, symbol = %symbol, error = %e, "Observation source failed");
            }
            Err(e) => {
                failed += 1;
                error!(agent, error = %e, "Observation task panicked");
            }
        }
    }

    let healthy = if total == 0 {
        0.0
    } else {
        (total - failed) as f64 / total as f64
    };
    beliefs.update(HEALTH_KEY, healthy, healthy, agent);

    if observations.is_empty() {
        error!(agent, total, "All observation sources failed");
        return Err(AgentError::DataUnavailable(total));
    }

    observations.sort_by(|a, b| {
        a.symbol
            .cmp(&b.symbol)
            .then_with(|| a.source.cmp(&b.source))
    });
    for observation in &observations {
        match serde_json::to_value(observation) {
            Ok(value) => beliefs.update(observation.belief_key(), value, healthy, &observation.source),
            Err(e) => debug!(error = %e, "Observation not representable as a belief"),
        }
    }

    let outcome = if failed == 0 {
        CycleOutcome::Complete
    } else {
        info!(agent, failed, total, "Degraded cycle");
        CycleOutcome::Degraded { failed, total }
    };
    debug!(
        agent,
        observations = observations.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Observations gathered"
    );

    Ok(Gathered {
        observations,
        outcome,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedSource;

    fn symbols() -> Vec<String> {
        vec!["BTC-USD".to_string(), "ETH-USD".to_string()]
    }

    fn market(symbol: &str, source: &str) -> Observation {
        Observation {
            symbol: symbol.to_string(),
            source: source.to_string(),
            observed_at: Utc::now(),
            data: ObservationData::Market {
                volatility: Some(0.03),
                regime: Some("trending".to_string()),
                price: Some(40_000.0),
            },
        }
    }

    #[tokio::test]
    async fn all_sources_healthy() {
        let beliefs = BeliefStore::new();
        let sources: Vec<Arc<dyn ObservationSource>> = vec![
            Arc::new(ScriptedSource::new("a").always(|s| Ok(market(s, "a")))),
            Arc::new(ScriptedSource::new("b").always(|s| Ok(market(s, "b")))),
        ];
        let gathered = gather_observations("risk", &sources, &symbols(), &beliefs)
            .await
            .unwrap();
        assert_eq!(gathered.outcome, CycleOutcome::Complete);
        assert_eq!(gathered.observations.len(), 4);
        assert_eq!(gathered.observations[0].symbol, "BTC-USD");
        assert_eq!(gathered.observations[0].source, "a");
        assert_eq!(beliefs.number(HEALTH_KEY), Some(1.0));
        assert!(beliefs.get("observation.ETH-USD.b").is_some());
    }

    #[tokio::test]
    async fn partial_failure_degrades() {
        let beliefs = BeliefStore::new();
        let sources: Vec<Arc<dyn ObservationSource>> = vec![
            Arc::new(ScriptedSource::new("ok").always(|s| Ok(market(s, "ok")))),
            Arc::new(ScriptedSource::failing("down")),
        ];
        let gathered = gather_observations("risk", &sources, &symbols(), &beliefs)
            .await
            .unwrap();
        assert_eq!(
            gathered.outcome,
            CycleOutcome::Degraded {
                failed: 2,
                total: 4
            }
        );
        let health = beliefs.get(HEALTH_KEY).unwrap();
        assert_eq!(health.confidence, 0.5);
    }

    #[tokio::test]
    async fn total_failure_is_data_unavailable() {
        let beliefs = BeliefStore::new();
        let sources: Vec<Arc<dyn ObservationSource>> = vec![Arc::new(ScriptedSource::failing("down"))];
        let err = gather_observations("risk", &sources, &symbols(), &beliefs)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::DataUnavailable(2)));
        assert_eq!(beliefs.number(HEALTH_KEY), Some(0.0));
    }

    #[test]
    fn observation_json_shape() {
        let raw = r#"{
            "symbol": "BTC-USD",
            "source": "ta_feed",
            "observed_at": "2026-01-05T14:30:00Z",
            "kind": "indicators",
            "readings": {"rsi": 27.5, "momentum": 0.8}
        }"#;
        let observation: Observation = serde_json::from_str(raw).unwrap();
        match observation.data {
            ObservationData::Indicators { readings } => assert_eq!(readings["rsi"], 27.5),
            other => panic!("unexpected {other:?}"),
        }
    }
}
