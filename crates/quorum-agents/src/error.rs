use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Claude CLI error: {0}")]
    Cli(String),

    #[error("Advisor response parse error: {0}")]
    Parse(String),

    #[error("Timed out after {0} seconds")]
    Timeout(u64),

    #[error("Advisory unavailable: {0}")]
    Advisory(String),

    #[error("Advisory circuit open")]
    CircuitOpen,

    #[error("All {0} observation sources failed")]
    DataUnavailable(usize),

    #[error("Observation source {source_name} failed: {reason}")]
    Source { source_name: String, reason: String },

    #[error("Cycle for {agent} exceeded {seconds}s and was abandoned")]
    CycleTimeout { agent: String, seconds: u64 },

    #[error("Bus error: {0}")]
    Bus(String),

    #[error("Invalid configuration: {0}")]
    Config(#[from] quorum_models::ConfigError),

    #[error("Invalid message: {0}")]
    Model(#[from] quorum_models::ModelError),

    #[error("Store error: {0}")]
    Store(#[from] quorum_store::StoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AgentError {
    /// Failures of the external advisor. These never reach callers of the risk gate.
    pub fn is_advisory_failure(&self) -> bool {
        matches!(
            self,
            AgentError::Cli(_)
                | AgentError::Parse(_)
                | AgentError::Timeout(_)
                | AgentError::Advisory(_)
                | AgentError::CircuitOpen
        )
    }
}
