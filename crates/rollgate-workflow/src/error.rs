//! Error types for workflow execution.

use std::time::Duration;

use thiserror::Error;

use rollgate_core::{ConfigError, PoolId};
use rollgate_release::ReleaseError;

/// Result type alias for workflow execution.
pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Why a single step failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepFailure {
    #[error(transparent)]
    Api(#[from] ReleaseError),

    #[error("deployment still in progress after {age:?}")]
    TimedOut { age: Duration },

    #[error("no in-progress deployment found")]
    NoInProgressDeployment,

    #[error("validation task failed")]
    TaskFailed,

    #[error("operator declined")]
    Declined,

    #[error("service has no validation task configured")]
    NoValidationTask,

    #[error("unknown validator")]
    UnknownValidator,

    #[error("failed to read operator input: {0}")]
    Input(String),
}

/// A workflow run that did not complete.
///
/// Step variants name the action kind and its target. The workflow has
/// already been rolled back to its checkpoint by the time one of them is
/// returned.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("update {pool} failed: {cause}")]
    UpdatePool { pool: PoolId, cause: StepFailure },

    #[error("traffic shift to {pool} failed: {cause}")]
    TrafficShift { pool: PoolId, cause: StepFailure },

    #[error("validation '{target}' failed: {cause}")]
    Validation { target: String, cause: StepFailure },

    #[error("unrecognized action '{0}'")]
    UnrecognizedAction(String),

    /// The starting state could not be read. Nothing was changed.
    #[error("failed to capture checkpoint: {0}")]
    Checkpoint(ReleaseError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Release(#[from] ReleaseError),
}

impl WorkflowError {
    /// Kind of the action that failed, if a step failed.
    pub fn action_kind(&self) -> Option<&str> {
        match self {
            WorkflowError::UpdatePool { .. } => Some(rollgate_core::workflow::UPDATE_TAG),
            WorkflowError::TrafficShift { .. } => Some(rollgate_core::workflow::SHIFT_TAG),
            WorkflowError::Validation { .. } => Some(rollgate_core::workflow::VALIDATE_TAG),
            WorkflowError::UnrecognizedAction(tag) => Some(tag),
            _ => None,
        }
    }

    /// Cause of a failed step.
    pub fn step_failure(&self) -> Option<&StepFailure> {
        match self {
            WorkflowError::UpdatePool { cause, .. }
            | WorkflowError::TrafficShift { cause, .. }
            | WorkflowError::Validation { cause, .. } => Some(cause),
            _ => None,
        }
    }
}
