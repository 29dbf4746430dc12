use std::process::Output;
use std::time::Duration;

use quorum_models::config::AdvisoryConfig;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::AgentError;

/// How to invoke the `claude` CLI for one advisory attempt.
#[derive(Debug, Clone)]
pub struct ClaudeCliConfig {
    pub program: String,
    pub model: String,
    pub timeout: Duration,
}

impl Default for ClaudeCliConfig {
    fn default() -> Self {
        Self::from_advisory(&AdvisoryConfig::default())
    }
}

impl ClaudeCliConfig {
    pub fn from_advisory(config: &AdvisoryConfig) -> Self {
        Self {
            program: "claude".to_string(),
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_seconds),
        }
    }

    fn command(&self, system_prompt: &str, user_prompt: &str) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg("-p")
            .arg(user_prompt)
            .arg("--system-prompt")
            .arg(system_prompt)
            .arg("--model")
            .arg(&self.model)
            .arg("--output-format")
            .arg("text")
            .kill_on_drop(true);
        command
    }
}

/// Ask the advisor CLI for one risk assessment and return its raw stdout.
///
/// The child process is killed when the attempt times out or is dropped.
pub async fn consult_cli(
    system_prompt: &str,
    user_prompt: &str,
    config: &ClaudeCliConfig,
) -> Result<String, AgentError> {
    debug!(program = %config.program, model = %config.model, "Requesting risk assessment");

    let output = tokio::time::timeout(
        config.timeout,
        config.command(system_prompt, user_prompt).output(),
    )
    .await
    .map_err(|_| AgentError::Timeout(config.timeout.as_secs()))?
    .map_err(|e| {
        AgentError::Cli(format!(
            "risk advisor `{}` could not be started: {e}",
            config.program
        ))
    })?;

    assessment_text(&config.program, output)
}

fn assessment_text(program: &str, output: Output) -> Result<String, AgentError> {
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        warn!(program, status = %output.status, %stderr, "Risk advisor exited abnormally");
        return Err(AgentError::Cli(format!(
            "risk advisor `{program}` failed ({}): {stderr}",
            output.status
        )));
    }

    let text = String::from_utf8_lossy(&output.stdout).into_owned();
    if text.trim().is_empty() {
        return Err(AgentError::Advisory(format!(
            "risk advisor `{program}` produced no assessment"
        )));
    }
    Ok(text)
}

/// Whether `program --version` runs and exits cleanly.
pub async fn cli_available(program: &str) -> bool {
    Command::new(program)
        .arg("--version")
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}
