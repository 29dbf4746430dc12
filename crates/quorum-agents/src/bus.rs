//! Topic-addressed publish/subscribe between agents.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::AgentError;

pub mod topics {
    pub const DECISIONS: &str = "decisions";
    pub const RISK_VERDICTS: &str = "risk.verdicts";
    pub const HEARTBEAT: &str = "agents.heartbeat";
    pub const SIGNAL_PREFIX: &str = "signals.";

    pub fn signals(agent: &str) -> String {
        format!("{SIGNAL_PREFIX}{agent}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: serde_json::Value,
    pub published_at: DateTime<Utc>,
}

/// Receiving end of one topic subscription.
pub struct Subscription {
    topic: String,
    rx: broadcast::Receiver<BusMessage>,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next message, or None once the bus is gone. Lagged messages are
    /// skipped with a warning.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        loop {
            match self.rx.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(topic = %self.topic, skipped, "Subscriber lagged; messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next buffered message without waiting.
    pub fn try_recv(&mut self) -> Option<BusMessage> {
        loop {
            match self.rx.try_recv() {
                Ok(message) => return Some(message),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(topic = %self.topic, skipped, "Subscriber lagged; messages dropped");
                }
                Err(_) => return None,
            }
        }
    }

    /// Every message currently buffered.
    pub fn drain(&mut self) -> Vec<BusMessage> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

/// Transport used by agents and the coordinator. Mockable for testing.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<(), AgentError>;

    fn subscribe(&self, topic: &str) -> Subscription;
}

/// Serialize and publish a value.
pub async fn publish_json<T: Serialize + Sync>(
    bus: &dyn MessageBus,
    topic: &str,
    value: &T,
) -> Result<(), AgentError> {
    let payload = serde_json::to_value(value)?;
    bus.publish(topic, payload).await
}

/// In-process bus: one broadcast channel per topic, created on first use.
pub struct InMemoryBus {
    capacity: usize,
    channels: RwLock<HashMap<String, broadcast::Sender<BusMessage>>>,
}

impl InMemoryBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            channels: RwLock::new(HashMap::new()),
        }
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<BusMessage> {
        if let Some(sender) = self
            .channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
        {
            return sender.clone();
        }
        self.channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self
            .channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        topics.sort();
        topics
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<(), AgentError> {
        let message = BusMessage {
            topic: topic.to_string(),
            payload,
            published_at: Utc::now(),
        };
        // No subscribers is not an error; the message is simply dropped.
        if self.sender(topic).send(message).is_err() {
            debug!(topic, "Published with no subscribers");
        }
        Ok(())
    }

    fn subscribe(&self, topic: &str) -> Subscription {
        Subscription {
            topic: topic.to_string(),
            rx: self.sender(topic).subscribe(),
        }
    }
}
