use std::path::PathBuf;

use async_trait::async_trait;
use quorum_agents::{AgentError, Observation, ObservationSource};
use tracing::debug;

/// Observation feed kept in a JSON file by an external collector.
///
/// The file holds an array of observations; the newest one for the
/// requested symbol is returned. The file is re-read on every call.
pub struct JsonFileSource {
    name: String,
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    fn failure(&self, reason: impl Into<String>) -> AgentError {
        AgentError::Source {
            source_name: self.name.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl ObservationSource for JsonFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn observe(&self, symbol: &str) -> Result<Observation, AgentError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| self.failure(format!("{}: {e}", self.path.display())))?;
        let observations: Vec<Observation> = serde_json::from_str(&raw)
            .map_err(|e| self.failure(format!("malformed feed {}: {e}", self.path.display())))?;

        let mut latest = observations
            .into_iter()
            .filter(|o| o.symbol == symbol)
            .max_by_key(|o| o.observed_at)
            .ok_or_else(|| self.failure(format!("no observation for {symbol}")))?;
        debug!(source = %self.name, symbol, observed_at = %latest.observed_at, "Read observation");
        // Belief keys and health accounting use the configured name.
        latest.source = self.name.clone();
        Ok(latest)
    }
}
