pub mod action;
pub mod advisory;
pub mod belief;
pub mod candidate;
pub mod clock;
pub mod config;
pub mod decision;
pub mod error;
pub mod portfolio;
pub mod risk;
pub mod signal;

pub use action::Action;
pub use advisory::{RiskAssessmentRequest, RiskAssessmentResponse};
pub use belief::{clamp_unit, Belief, BeliefValue};
pub use candidate::{Candidate, RiskTier, ScoredCandidate};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{
    AdvisoryConfig, AgentConfig, AgentKind, BreakerConfig, CoordinatorConfig, QuorumConfig,
    RiskLimits, RunnerConfig, ScorerConfig, SourceConfig,
};
pub use decision::Decision;
pub use error::{ConfigError, ModelError};
pub use portfolio::{
    EquityPoint, EquityWatermark, MarketRegime, PortfolioSnapshot, Position, RiskSnapshot,
};
pub use risk::{ProposedTrade, RiskRule, RiskVerdict, TradeStats, VerdictKind, VerdictSource};
pub use signal::{Signal, SignalMessage};
