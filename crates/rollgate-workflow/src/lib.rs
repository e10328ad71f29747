//! rollgate workflow executor.
//!
//! Takes a resolved [`WorkflowDefinition`](rollgate_core::WorkflowDefinition),
//! snapshots the service into a [`Checkpoint`], runs each step in order and
//! rolls back to the checkpoint on the first failure.

pub mod checkpoint;
pub mod error;
pub mod gate;
pub mod orchestrator;

pub use checkpoint::Checkpoint;
pub use error::{StepFailure, WorkflowError, WorkflowResult};
pub use gate::ValidationGate;
pub use orchestrator::{ExecutionMode, Orchestrator, RunSummary};
