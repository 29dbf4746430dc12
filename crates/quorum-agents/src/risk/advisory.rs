//! External risk-assessment advisor and translation of its verdicts.

use async_trait::async_trait;
use quorum_models::advisory::{RiskAssessmentRequest, RiskAssessmentResponse};
use quorum_models::belief::clamp_unit;
use quorum_models::config::{AdvisoryConfig, RiskLimits};
use quorum_models::portfolio::RiskSnapshot;
use quorum_models::risk::{ProposedTrade, RiskRule, RiskVerdict, VerdictKind, VerdictSource};
use uuid::Uuid;

use crate::claude_cli::{consult_cli, ClaudeCliConfig};
use crate::error::AgentError;
use crate::parser::parse_assessment;
use crate::prompts::{risk_assessment_system_prompt, risk_assessment_user_prompt};

use super::sizing::stop_loss;

/// Relative tolerance below which an advisory size counts as "as requested".
const RESIZE_TOLERANCE: f64 = 1e-6;

/// Something that can assess a proposed trade. Mockable for testing.
#[async_trait]
pub trait RiskAdvisor: Send + Sync {
    fn name(&self) -> &str;

    async fn assess(
        &self,
        request: &RiskAssessmentRequest,
    ) -> Result<RiskAssessmentResponse, AgentError>;
}

/// Advisor backed by the `claude` CLI.
pub struct ClaudeAdvisor {
    cli_config: ClaudeCliConfig,
}

impl ClaudeAdvisor {
    pub fn new(config: &AdvisoryConfig) -> Self {
        Self {
            cli_config: ClaudeCliConfig::from_advisory(config),
        }
    }

    pub fn with_cli_config(cli_config: ClaudeCliConfig) -> Self {
        Self { cli_config }
    }
}

#[async_trait]
impl RiskAdvisor for ClaudeAdvisor {
    fn name(&self) -> &str {
        "claude"
    }

    async fn assess(
        &self,
        request: &RiskAssessmentRequest,
    ) -> Result<RiskAssessmentResponse, AgentError> {
        let system_prompt = risk_assessment_system_prompt();
        let user_prompt = risk_assessment_user_prompt(request)?;
        let raw_output = consult_cli(&system_prompt, &user_prompt, &self.cli_config).await?;
        parse_assessment(&raw_output)
    }
}

/// Build the advisory request for a trade against the current snapshot.
pub fn build_request(
    trade: &ProposedTrade,
    snapshot: &RiskSnapshot,
    limits: &RiskLimits,
) -> RiskAssessmentRequest {
    RiskAssessmentRequest {
        request_id: Uuid::new_v4(),
        symbol: trade.symbol.clone(),
        side: trade.action,
        confidence: trade.confidence,
        market_context: serde_json::json!({
            "volatility": snapshot.volatility,
            "market_regime": snapshot.market_regime,
            "current_drawdown_pct": snapshot.current_drawdown_pct,
            "max_drawdown_pct": limits.max_drawdown_percent,
            "current_exposure": snapshot.current_exposure,
            "symbol_exposure": snapshot.exposure_for(&trade.symbol),
            "limits_utilization": snapshot.limits_utilization,
            "sharpe_ratio": snapshot.sharpe_ratio,
            "requested_size": trade.size,
            "entry_price": trade.entry_price,
        }),
        portfolio_value: snapshot.portfolio_value,
        max_position_size: limits.max_position_size,
        open_positions: snapshot.open_positions,
    }
}

/// Translate a validated advisory response into a verdict.
///
/// Rejection becomes a veto with confidence = risk score. Approval sizes the
/// trade at `position_size * portfolio_value`, never above the request or the
/// position ceiling; a smaller size is a resize.
pub fn translate(
    response: &RiskAssessmentResponse,
    trade: &ProposedTrade,
    snapshot: &RiskSnapshot,
    limits: &RiskLimits,
) -> RiskVerdict {
    let risk_score = clamp_unit(response.risk_score);
    let mut verdict = RiskVerdict {
        symbol: trade.symbol.clone(),
        action: trade.action,
        kind: VerdictKind::Veto,
        approved: false,
        rule: RiskRule::Advisory,
        source: VerdictSource::Advisory,
        requested_size: trade.size,
        recommended_size: 0.0,
        stop_loss: None,
        take_profit: None,
        confidence: risk_score,
        reasoning: response.reasoning.clone(),
        concerns: response.concerns.clone(),
    };

    if !response.approved {
        return verdict;
    }

    let advised = clamp_unit(response.position_size) * snapshot.portfolio_value.max(0.0);
    let allowed = advised.min(trade.size).min(limits.max_position_size);

    verdict.approved = true;
    verdict.confidence = 1.0 - risk_score;
    verdict.recommended_size = allowed;
    verdict.kind = if allowed < trade.size * (1.0 - RESIZE_TOLERANCE) {
        VerdictKind::Resize
    } else {
        VerdictKind::Approve
    };
    verdict.take_profit = response.take_profit;
    verdict.stop_loss = response.stop_loss.or_else(|| {
        trade.entry_price.and_then(|entry| {
            stop_loss(
                trade.action,
                entry,
                snapshot.volatility,
                limits.stop_loss_multiplier,
            )
        })
    });
    verdict
}
