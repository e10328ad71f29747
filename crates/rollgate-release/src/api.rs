//! The cloud operations rollgate consumes.
//!
//! A [`ReleaseApi`] client is scoped to one service: it already knows the
//! cluster, the two pool services and the listener rule from config, so
//! every call names at most a pool. Production backends wrap the fleet
//! manager and load balancer; [`SimulatedFleet`](crate::SimulatedFleet)
//! implements the same surface in memory.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use rollgate_core::{DesiredState, PoolId};

use crate::error::ReleaseResult;

/// Status of a deployment revision within a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentStatus {
    /// The newest revision, the one being rolled out.
    Primary,
    /// An older revision still running tasks.
    Active,
    /// Fully drained.
    Inactive,
}

/// One deployment revision of a pool's service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: String,
    pub status: DeploymentStatus,
    pub task_definition: String,
    pub desired_count: u32,
    /// Unix timestamp (seconds) when the revision was created.
    pub created_at: u64,
}

impl Deployment {
    pub fn state(&self) -> DesiredState {
        DesiredState::new(&self.task_definition, self.desired_count)
    }
}

/// Snapshot of a pool's service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub desired_state: DesiredState,
    /// Revisions the backend still reports for the service.
    pub deployments: Vec<Deployment>,
}

impl ServiceInfo {
    /// The revision currently being rolled out, if any.
    pub fn in_progress(&self) -> Option<&Deployment> {
        self.deployments
            .iter()
            .find(|d| d.status == DeploymentStatus::Primary)
    }

    /// The most recent revision that is being replaced, if any.
    pub fn previous(&self) -> Option<&Deployment> {
        self.deployments
            .iter()
            .filter(|d| d.status == DeploymentStatus::Active)
            .max_by_key(|d| d.created_at)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Running,
    Stopped,
}

/// One task as reported by the fleet manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub task_id: String,
    pub last_status: TaskStatus,
    /// Exit code per container; `None` while a container has not exited.
    pub container_exit_codes: Vec<Option<i32>>,
}

/// Response to a task status query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescription {
    pub tasks: Vec<TaskSnapshot>,
    /// Backend-reported failures for the queried ids.
    pub failures: Vec<String>,
}

/// Weighted target inside a forward action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetGroupWeight {
    pub target_group_arn: String,
    pub weight: i64,
}

/// One action on a listener rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleAction {
    Forward {
        order: Option<u32>,
        target_groups: Vec<TargetGroupWeight>,
    },
    /// Any non-forward action (authenticate, fixed-response, redirect, ...).
    /// Carried through rewrites untouched.
    Other {
        action_type: String,
        order: Option<u32>,
        params: BTreeMap<String, String>,
    },
}

/// The listener rule that splits traffic between the pools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerRule {
    pub arn: String,
    pub actions: Vec<RuleAction>,
}

/// Operations rollgate needs from the fleet manager and load balancer.
///
/// Calls are issued one at a time and never retried by the caller.
#[async_trait]
pub trait ReleaseApi: Send + Sync {
    /// Current desired state and deployment revisions of a pool.
    async fn service_info(&self, pool: PoolId) -> ReleaseResult<ServiceInfo>;

    /// Set a pool's task definition and replica count.
    async fn update_desired_state(&self, pool: PoolId, state: &DesiredState)
    -> ReleaseResult<()>;

    /// Launch a one-off task, optionally overriding `container`'s command.
    /// Returns the task id.
    async fn run_task(
        &self,
        task_definition: &str,
        container: &str,
        command: &[String],
    ) -> ReleaseResult<String>;

    /// Status of a previously launched task.
    async fn describe_task(&self, task_id: &str) -> ReleaseResult<TaskDescription>;

    /// Fetch the service's listener rule.
    async fn describe_rule(&self) -> ReleaseResult<ListenerRule>;

    /// Replace the listener rule's actions.
    async fn modify_rule(&self, actions: Vec<RuleAction>) -> ReleaseResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deployment(id: &str, status: DeploymentStatus, created_at: u64) -> Deployment {
        Deployment {
            id: id.to_string(),
            status,
            task_definition: format!("api:{id}"),
            desired_count: 2,
            created_at,
        }
    }

    #[test]
    fn finds_in_progress_and_previous() {
        let info = ServiceInfo {
            desired_state: DesiredState::new("api:3", 2),
            deployments: vec![
                deployment("1", DeploymentStatus::Active, 100),
                deployment("3", DeploymentStatus::Primary, 300),
                deployment("2", DeploymentStatus::Active, 200),
            ],
        };

        assert_eq!(info.in_progress().unwrap().id, "3");
        assert_eq!(info.previous().unwrap().id, "2");
        assert_eq!(info.previous().unwrap().state(), DesiredState::new("api:2", 2));
    }

    #[test]
    fn no_in_progress_without_primary() {
        let info = ServiceInfo {
            desired_state: DesiredState::new("api:1", 2),
            deployments: vec![deployment("1", DeploymentStatus::Active, 100)],
        };
        assert!(info.in_progress().is_none());
    }
}
