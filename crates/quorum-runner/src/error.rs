use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Config(#[from] quorum_models::ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] quorum_store::StoreError),

    #[error("Agent error: {0}")]
    Agent(#[from] quorum_agents::AgentError),

    #[error("Cannot build agent {agent}: {reason}")]
    Build { agent: String, reason: String },
}
