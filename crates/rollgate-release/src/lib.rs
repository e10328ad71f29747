//! rollgate release operations — the cloud-facing half of a canary release.
//!
//! Everything here talks to the fleet manager and load balancer through
//! the [`ReleaseApi`] trait, one client per service.
//!
//! # Components
//!
//! - **`api`** — `ReleaseApi` trait and the data it exchanges
//! - **`deploy`** — deploy one pool and wait for it to stabilise, reverting on failure
//! - **`traffic`** — read and rewrite the canary/primary weight split
//! - **`task`** — launch a validation task and wait for its exit status
//! - **`clock`** — time source for the polling loops
//! - **`registry`** — per-service clients built from config
//! - **`simulate`** — in-memory `ReleaseApi` for rehearsals and tests

pub mod api;
pub mod clock;
pub mod deploy;
pub mod error;
pub mod registry;
pub mod simulate;
pub mod task;
pub mod traffic;

pub use api::{
    Deployment, DeploymentStatus, ListenerRule, ReleaseApi, RuleAction, ServiceInfo,
    TargetGroupWeight, TaskDescription, TaskSnapshot, TaskStatus,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use deploy::{DeployOutcome, DeploymentController};
pub use error::{ReleaseError, ReleaseResult};
pub use registry::ReleaseRegistry;
pub use simulate::SimulatedFleet;
pub use task::{TaskMonitor, classify_task};
pub use traffic::TrafficController;
