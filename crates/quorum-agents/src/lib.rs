pub mod agent;
pub mod agents;
pub mod aggregator;
pub mod bus;
pub mod claude_cli;
pub mod coordinator;
pub mod error;
pub mod observation;
pub mod parser;
pub mod portfolio;
pub mod prompts;
pub mod risk;
pub mod scorer;

pub mod test_support;

pub use agent::{Agent, AgentCore, Heartbeat, StepReport};
pub use agents::{OpportunityAgent, RiskAgent, TechnicalAgent};
pub use aggregator::{aggregate, reconcile_pair, Aggregation, Opinion, WeightedVote};
pub use bus::{InMemoryBus, MessageBus, Subscription};
pub use coordinator::Coordinator;
pub use error::AgentError;
pub use observation::{gather_observations, CycleOutcome, Observation, ObservationData, ObservationSource};
pub use portfolio::PortfolioSource;
pub use risk::{BreakerState, ClaudeAdvisor, RiskAdvisor, RiskGate};
pub use scorer::SignalScorer;
