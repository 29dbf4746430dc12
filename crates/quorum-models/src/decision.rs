use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::action::Action;

/// Final output of intra-agent or inter-agent aggregation.
///
/// Serialized form is the decision message consumed by execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub id: Uuid,
    pub action: Action,
    pub symbol: String,
    pub confidence: f64,
    pub reasoning: String,
    /// Origins (topics) of the signals the decision was built from.
    pub based_on: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_message_fields() {
        let decision = Decision {
            id: Uuid::new_v4(),
            action: Action::Buy,
            symbol: "BTC-USD".to_string(),
            confidence: 0.32,
            reasoning: "weighted vote".to_string(),
            based_on: vec!["signals.technical".to_string(), "signals.arbitrage".to_string()],
            timestamp: Utc::now(),
        };

        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["action"], "BUY");
        assert_eq!(json["based_on"].as_array().unwrap().len(), 2);
        assert!(json["timestamp"].is_string());

        let parsed: Decision = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, decision);
    }
}
