use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ModelError {
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Invalid signal message: {0}")]
    InvalidSignal(String),
}

/// Malformed limits or thresholds. Raised once at startup, never per cycle.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid config value for `{field}`: {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}
