//! Error types for release operations.

use thiserror::Error;

/// Result type alias for release operations.
pub type ReleaseResult<T> = Result<T, ReleaseError>;

/// Errors surfaced by a [`ReleaseApi`](crate::ReleaseApi) backend.
///
/// None of these are retried. The step that hit one fails.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReleaseError {
    #[error("{operation} failed: {message}")]
    Api {
        operation: &'static str,
        message: String,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rejected by backend: {0}")]
    Rejected(String),

    #[error("no release client registered for service {0}")]
    NoClient(String),
}

impl ReleaseError {
    pub fn api(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Api {
            operation,
            message: message.into(),
        }
    }
}
