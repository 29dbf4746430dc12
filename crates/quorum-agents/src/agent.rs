//! Agent lifecycle and the shared capability every agent holds.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quorum_models::clock::Clock;
use quorum_models::signal::Signal;
use quorum_store::BeliefStore;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bus::{publish_json, topics, MessageBus};
use crate::error::AgentError;
use crate::observation::CycleOutcome;

/// What one `step` did.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    /// Messages published on the bus.
    pub published: usize,
    pub outcome: CycleOutcome,
}

impl StepReport {
    pub fn new(published: usize, outcome: CycleOutcome) -> Self {
        Self { published, outcome }
    }
}

/// Liveness message published on `agents.heartbeat`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Heartbeat {
    pub agent: String,
    pub beliefs: usize,
    pub overall_confidence: f64,
    pub timestamp: DateTime<Utc>,
}

/// Name, belief store, bus and clock. Agents hold one by composition.
#[derive(Clone)]
pub struct AgentCore {
    pub name: String,
    pub beliefs: Arc<BeliefStore>,
    pub bus: Arc<dyn MessageBus>,
    pub clock: Arc<dyn Clock>,
}

impl AgentCore {
    pub fn new(name: impl Into<String>, bus: Arc<dyn MessageBus>, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.into(),
            beliefs: Arc::new(BeliefStore::with_clock(Arc::clone(&clock))),
            bus,
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Topic this agent's signals go out on.
    pub fn signal_topic(&self) -> String {
        topics::signals(&self.name)
    }

    pub async fn publish_signal(&self, signal: &Signal) -> Result<(), AgentError> {
        debug!(agent = %self.name, symbol = %signal.symbol, action = %signal.action, confidence = signal.confidence, "Publishing signal");
        publish_json(self.bus.as_ref(), &self.signal_topic(), &signal.to_message()).await
    }

    pub fn heartbeat(&self) -> Heartbeat {
        heartbeat_for(&self.name, &self.beliefs, self.now())
    }
}

pub fn heartbeat_for(agent: &str, beliefs: &BeliefStore, timestamp: DateTime<Utc>) -> Heartbeat {
    Heartbeat {
        agent: agent.to_string(),
        beliefs: beliefs.len(),
        overall_confidence: beliefs.overall_confidence(),
        timestamp,
    }
}

/// Lifecycle driven by the runner: `initialize` once, `step` every tick,
/// `shutdown` on cancellation.
///
/// A step publishes only after all of its work is done, so a step that is
/// abandoned on timeout publishes nothing.
#[async_trait]
pub trait Agent: Send {
    fn core(&self) -> &AgentCore;

    fn name(&self) -> &str {
        &self.core().name
    }

    async fn initialize(&mut self) -> Result<(), AgentError> {
        Ok(())
    }

    async fn step(&mut self) -> Result<StepReport, AgentError>;

    async fn shutdown(&mut self) -> Result<(), AgentError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBus;
    use quorum_models::action::Action;
    use quorum_models::clock::FixedClock;
    use quorum_models::signal::SignalMessage;

    #[tokio::test]
    async fn publish_signal_uses_agent_topic() {
        let bus = Arc::new(InMemoryBus::default());
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let core = AgentCore::new("technical", bus.clone(), clock.clone());
        let mut sub = bus.subscribe("signals.technical");

        let signal = Signal::new("technical", "BTC-USD", Action::Sell, 0.6, "RSI 78", clock.now());
        core.publish_signal(&signal).await.unwrap();

        let message = sub.recv().await.unwrap();
        let parsed: SignalMessage = serde_json::from_value(message.payload).unwrap();
        assert_eq!(parsed.signal, "SELL");
        assert_eq!(parsed.symbol, "BTC-USD");
    }

    #[test]
    fn heartbeat_reports_belief_state() {
        let bus = Arc::new(InMemoryBus::default());
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let core = AgentCore::new("risk", bus, clock.clone());
        core.beliefs.update("a", 1.0, 0.4, "test");
        core.beliefs.update("b", 2.0, 0.8, "test");

        let beat = core.heartbeat();
        assert_eq!(beat.agent, "risk");
        assert_eq!(beat.beliefs, 2);
        assert!((beat.overall_confidence - 0.6).abs() < 1e-12);
        assert_eq!(beat.timestamp, clock.now());
    }
}
