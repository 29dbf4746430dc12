use quorum_models::advisory::RiskAssessmentRequest;

use crate::error::AgentError;

/// Response shape the advisor must return, embedded in the system prompt.
fn response_schema() -> String {
    let example = serde_json::json!({
        "approved": true,
        "position_size": 0.02,
        "stop_loss": 41200.0,
        "take_profit": 46500.0,
        "risk_score": 0.35,
        "reasoning": "<which factors drove the verdict, with the metric values>",
        "concerns": ["<short risk notes>"]
    });
    serde_json::to_string_pretty(&example).unwrap_or_default()
}

pub fn risk_assessment_system_prompt() -> String {
    format!(
        "You are the risk assessor of an automated multi-agent trading pipeline. Each request \
         describes one proposed trade and the current portfolio. Decide whether it may proceed \
         and how large it may be.\n\n\
         ## INPUT\n\n\
         - `symbol`, `side` (BUY or SELL), `confidence` (0-1, strength of the upstream signal)\n\
         - `portfolio_value`, `max_position_size` (account currency), `open_positions`\n\
         - `market_context`: `volatility` (fraction, 0.02 = 2%), `market_regime`, \
         `current_drawdown_pct`, `max_drawdown_pct`, `current_exposure`, `limits_utilization`, \
         `requested_size`, `entry_price` (may be null)\n\n\
         ## RULES\n\n\
         - SELL reduces exposure; approve it unless the data is clearly inconsistent.\n\
         - Reject BUY when drawdown is above 80% of the allowed maximum.\n\
         - Reject BUY when volatility is above 4% and limits utilization above 85%.\n\
         - Never size above `max_position_size`; prefer smaller sizes for low confidence.\n\
         - `position_size` is a FRACTION of `portfolio_value` between 0 and 1.\n\
         - `stop_loss` and `take_profit` are absolute prices or null when no entry price is known.\n\
         - `risk_score` is 0 for no risk and 1 for maximum risk.\n\n\
         ## OUTPUT\n\n\
         Respond with ONLY a JSON object of this shape, no prose before or after:\n\n{}\n",
        response_schema()
    )
}

/// User prompt: the request serialized as pretty JSON.
pub fn risk_assessment_user_prompt(request: &RiskAssessmentRequest) -> Result<String, AgentError> {
    Ok(serde_json::to_string_pretty(request)?)
}
