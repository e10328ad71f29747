//! Error types for configuration loading and workflow resolution.

use thiserror::Error;

/// Result type alias for config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that can occur while loading or resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("service not configured: {0}")]
    UnknownService(String),

    #[error("workflow not configured: {0}")]
    UnknownWorkflow(String),

    #[error("invalid pool '{0}': expected canary or primary")]
    InvalidPool(String),

    #[error("action '{action}' is missing required field '{field}'")]
    MissingField { action: String, field: &'static str },

    #[error("invalid duration '{0}': expected e.g. 500ms, 30s, 5m, 1h")]
    InvalidDuration(String),

    #[error("service {service}: {reason}")]
    InvalidService { service: String, reason: String },
}
