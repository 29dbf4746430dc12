use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Typed payload of a belief.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum BeliefValue {
    Bool(bool),
    Number(f64),
    Text(String),
    /// Structured payload (indicator series, position lists, ...).
    Struct(serde_json::Value),
}

impl BeliefValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            BeliefValue::Number(n) => Some(*n),
            BeliefValue::Struct(v) => v.as_f64(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            BeliefValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            BeliefValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<f64> for BeliefValue {
    fn from(n: f64) -> Self {
        BeliefValue::Number(n)
    }
}

impl From<bool> for BeliefValue {
    fn from(b: bool) -> Self {
        BeliefValue::Bool(b)
    }
}

impl From<&str> for BeliefValue {
    fn from(s: &str) -> Self {
        BeliefValue::Text(s.to_string())
    }
}

impl From<String> for BeliefValue {
    fn from(s: String) -> Self {
        BeliefValue::Text(s)
    }
}

impl From<serde_json::Value> for BeliefValue {
    fn from(v: serde_json::Value) -> Self {
        BeliefValue::Struct(v)
    }
}

/// A confidence-rated, provenanced fact held by an agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Belief {
    pub key: String,
    pub value: BeliefValue,
    /// Always within [0, 1].
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    /// Who produced the observation (source name, agent, derived rule).
    pub source: String,
}

/// Clamp a probability-like value into [0, 1]. NaN maps to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn belief_value_accessors() {
        assert_eq!(BeliefValue::from(0.42).as_f64(), Some(0.42));
        assert_eq!(BeliefValue::from(true).as_bool(), Some(true));
        assert_eq!(BeliefValue::from("trending").as_str(), Some("trending"));
        assert_eq!(BeliefValue::from("trending").as_f64(), None);
        assert_eq!(
            BeliefValue::from(serde_json::json!(3.5)).as_f64(),
            Some(3.5)
        );
    }

    #[test]
    fn belief_value_is_tagged_on_the_wire() {
        let json = serde_json::to_value(BeliefValue::Number(1.5)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "number", "value": 1.5}));
    }

    #[test]
    fn clamp_unit_bounds() {
        assert_eq!(clamp_unit(1.7), 1.0);
        assert_eq!(clamp_unit(-0.2), 0.0);
        assert_eq!(clamp_unit(f64::NAN), 0.0);
        assert_eq!(clamp_unit(0.3), 0.3);
    }
}
