//! Inter-agent coordination: collapses the signals published by the agents
//! into one `Decision` per symbol.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use async_trait::async_trait;
use quorum_models::config::{AgentKind, QuorumConfig};
use quorum_models::decision::Decision;
use quorum_models::signal::{Signal, SignalMessage};
use quorum_store::SignalInbox;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agent::{Agent, AgentCore, StepReport};
use crate::aggregator::{aggregate, reconcile_pair, Opinion, WeightedVote};
use crate::bus::{publish_json, topics, Subscription};
use crate::error::AgentError;
use crate::observation::CycleOutcome;

const INBOX_CAPACITY: u64 = 10_000;

pub struct Coordinator {
    core: AgentCore,
    subscriptions: Vec<Subscription>,
    /// Trust weight per signal topic.
    weights: BTreeMap<String, f64>,
    inbox: SignalInbox,
    window: Duration,
}

impl Coordinator {
    /// Listen on `inputs` (topic, weight). Signals older than `window` at
    /// decision time are discarded.
    pub fn new(core: AgentCore, inputs: Vec<(String, f64)>, window: Duration) -> Self {
        let subscriptions = inputs
            .iter()
            .map(|(topic, _)| core.bus.subscribe(topic))
            .collect();
        Self {
            core,
            subscriptions,
            weights: inputs.into_iter().collect(),
            inbox: SignalInbox::new(INBOX_CAPACITY, window),
            window,
        }
    }

    /// Subscribe to every enabled signal-producing agent in `config`.
    pub fn from_config(core: AgentCore, config: &QuorumConfig) -> Self {
        let inputs = config
            .agents
            .iter()
            .filter(|a| a.enabled && a.kind != AgentKind::Risk)
            .map(|a| (a.topic(), a.weight))
            .collect();
        Self::new(
            core,
            inputs,
            Duration::from_secs(config.coordinator.cycle_window_seconds),
        )
    }

    pub fn topics(&self) -> Vec<String> {
        self.weights.keys().cloned().collect()
    }

    fn weight_for(&self, origin: &str) -> f64 {
        self.weights.get(origin).copied().unwrap_or(1.0)
    }

    /// Move everything delivered since the last step into the inbox.
    async fn collect(&mut self) -> usize {
        let mut received = 0;
        for subscription in &mut self.subscriptions {
            let topic = subscription.topic().to_string();
            for message in subscription.drain() {
                let signal = serde_json::from_value::<SignalMessage>(message.payload)
                    .map_err(AgentError::from)
                    .and_then(|m| m.into_signal(&topic).map_err(AgentError::from));
                match signal {
                    Ok(signal) => {
                        self.inbox.push(signal).await;
                        received += 1;
                    }
                    Err(e) => warn!(topic = %topic, error = %e, "Dropping malformed signal"),
                }
            }
        }
        received
    }

    /// One decision from the fresh signals for a symbol.
    pub fn decide(&self, symbol: &str, signals: &[Signal]) -> Decision {
        let based_on: Vec<String> = signals
            .iter()
            .map(|s| s.origin.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let (action, confidence, reasoning) = if let [first, second] = signals {
            let result = reconcile_pair(
                &Opinion::new(&first.origin, first.action, first.confidence),
                &Opinion::new(&second.origin, second.action, second.confidence),
            );
            (result.action, result.confidence, result.reasoning)
        } else {
            let votes: Vec<WeightedVote> = signals
                .iter()
                .map(|s| WeightedVote::new(s.action, s.confidence, self.weight_for(&s.origin)))
                .collect();
            let result = aggregate(&votes);
            let reasoning = format!(
                "Weighted vote over {} signals: {}",
                signals.len(),
                result.describe()
            );
            (result.action, result.confidence, reasoning)
        };

        Decision {
            id: Uuid::new_v4(),
            action,
            symbol: symbol.to_string(),
            confidence,
            reasoning,
            based_on,
            timestamp: self.core.now(),
        }
    }
}

#[async_trait]
impl Agent for Coordinator {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    async fn step(&mut self) -> Result<StepReport, AgentError> {
        let received = self.collect().await;
        let now = self.core.now();
        let window = chrono::Duration::from_std(self.window)
            .unwrap_or_else(|_| chrono::Duration::seconds(60));
        let cutoff = now - window;

        let mut decisions = Vec::new();
        for symbol in self.inbox.symbols() {
            let (fresh, stale): (Vec<Signal>, Vec<Signal>) = self
                .inbox
                .drain_symbol(&symbol)
                .await
                .into_iter()
                .partition(|s| s.timestamp >= cutoff);
            if !stale.is_empty() {
                debug!(symbol = %symbol, discarded = stale.len(), "Discarded stale signals");
            }
            if fresh.is_empty() {
                continue;
            }
            let decision = self.decide(&symbol, &fresh);
            info!(
                symbol = %symbol,
                action = %decision.action,
                confidence = decision.confidence,
                signals = fresh.len(),
                "Coordinated decision"
            );
            decisions.push(decision);
        }

        for decision in &decisions {
            publish_json(self.core.bus.as_ref(), topics::DECISIONS, decision).await?;
        }
        debug!(received, decisions = decisions.len(), "Coordination cycle complete");
        Ok(StepReport::new(decisions.len(), CycleOutcome::Complete))
    }
}
