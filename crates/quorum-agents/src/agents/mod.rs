//! Concrete agents driven by the runner.

pub mod opportunity;
pub mod risk;
pub mod technical;

pub use opportunity::OpportunityAgent;
pub use risk::RiskAgent;
pub use technical::TechnicalAgent;
