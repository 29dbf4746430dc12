use std::path::Path;

use quorum_models::config::{AgentConfig, QuorumConfig};
use tracing::info;

use crate::error::RunnerError;

/// Parse and validate a TOML configuration.
pub fn parse_config(raw: &str) -> Result<QuorumConfig, RunnerError> {
    let config: QuorumConfig = toml::from_str(raw)?;
    config.validate()?;
    Ok(config)
}

/// Read, parse and validate the configuration file. Fails fast on any
/// out-of-range value.
pub fn load_config(path: impl AsRef<Path>) -> Result<QuorumConfig, RunnerError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)?;
    let config = parse_config(&raw)?;
    info!(
        path = %path.display(),
        agents = config.agents.len(),
        advisory = config.advisory.enabled,
        "Configuration loaded"
    );
    Ok(config)
}

/// Symbols an agent watches: its own list, else the coordinator's.
pub fn agent_symbols(agent: &AgentConfig, config: &QuorumConfig) -> Vec<String> {
    if agent.symbols.is_empty() {
        config.coordinator.symbols.clone()
    } else {
        agent.symbols.clone()
    }
}
