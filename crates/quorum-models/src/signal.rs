use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::belief::clamp_unit;
use crate::error::ModelError;

/// A directional opinion emitted by one agent in one decision cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Signal {
    /// Publishing agent (or topic) the signal came from.
    pub origin: String,
    pub symbol: String,
    pub action: Action,
    pub confidence: f64,
    pub reasoning: String,
    pub timestamp: DateTime<Utc>,
}

impl Signal {
    pub fn new(
        origin: impl Into<String>,
        symbol: impl Into<String>,
        action: Action,
        confidence: f64,
        reasoning: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            origin: origin.into(),
            symbol: symbol.into(),
            action,
            confidence: clamp_unit(confidence),
            reasoning: reasoning.into(),
            timestamp,
        }
    }

    pub fn to_message(&self) -> SignalMessage {
        SignalMessage {
            symbol: self.symbol.clone(),
            signal: self.action.as_str().to_string(),
            confidence: self.confidence,
            reasoning: Some(self.reasoning.clone()),
            timestamp: self.timestamp,
        }
    }
}

/// JSON signal message as published on the bus.
///
/// Agent-specific extra fields are accepted and ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignalMessage {
    pub symbol: String,
    /// One of BUY, SELL, HOLD, BULLISH, BEARISH, LONG, SHORT.
    pub signal: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl SignalMessage {
    /// Validate the message and attach the origin it was received from.
    pub fn into_signal(self, origin: &str) -> Result<Signal, ModelError> {
        if self.symbol.trim().is_empty() {
            return Err(ModelError::InvalidSignal("empty symbol".to_string()));
        }
        if !self.confidence.is_finite() {
            return Err(ModelError::InvalidSignal(format!(
                "non-finite confidence for {}",
                self.symbol
            )));
        }
        let action = Action::from_wire(&self.signal)?;
        Ok(Signal::new(
            origin,
            self.symbol,
            action,
            self.confidence,
            self.reasoning.unwrap_or_default(),
            self.timestamp,
        ))
    }
}
