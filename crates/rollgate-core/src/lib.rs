pub mod config;
pub mod error;
pub mod types;
pub mod workflow;

pub use config::{Config, PollingIntervals, ServiceConfig};
pub use error::{ConfigError, ConfigResult};
pub use types::*;
pub use workflow::{Action, ValidationTarget, WorkflowDefinition};
