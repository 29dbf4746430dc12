use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::action::Action;

/// Request sent to the external risk-assessment advisor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskAssessmentRequest {
    pub request_id: Uuid,
    pub symbol: String,
    pub side: Action,
    pub confidence: f64,
    /// Volatility, regime, drawdown, exposure and the requested size.
    pub market_context: serde_json::Value,
    pub portfolio_value: f64,
    pub max_position_size: f64,
    pub open_positions: usize,
}

/// Structured verdict returned by the advisor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskAssessmentResponse {
    pub approved: bool,
    /// Fraction of portfolio value, in [0, 1].
    pub position_size: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    /// 0 = no risk, 1 = maximum risk.
    pub risk_score: f64,
    pub reasoning: String,
    #[serde(default)]
    pub concerns: Vec<String>,
}

impl RiskAssessmentResponse {
    /// Check the numeric contract. A response failing this is treated as a call failure.
    pub fn validate(&self) -> Result<(), String> {
        if !self.position_size.is_finite() || !(0.0..=1.0).contains(&self.position_size) {
            return Err(format!(
                "position_size {} outside [0, 1]",
                self.position_size
            ));
        }
        if !self.risk_score.is_finite() || !(0.0..=1.0).contains(&self.risk_score) {
            return Err(format!("risk_score {} outside [0, 1]", self.risk_score));
        }
        for (name, level) in [("stop_loss", self.stop_loss), ("take_profit", self.take_profit)] {
            if let Some(price) = level {
                if !price.is_finite() || price <= 0.0 {
                    return Err(format!("{name} {price} is not a positive price"));
                }
            }
        }
        if self.reasoning.trim().is_empty() {
            return Err("empty reasoning".to_string());
        }
        Ok(())
    }
}
