//! In-memory fleet manager and load balancer.
//!
//! `SimulatedFleet` implements [`ReleaseApi`] against local state so the
//! whole release flow can be rehearsed without a cloud account, and so
//! tests can script slow rollouts, stuck rollouts, failing validation
//! tasks and API errors. Every call is recorded for later inspection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;

use rollgate_core::config::{PoolConfig, SimulationConfig};
use rollgate_core::{DesiredState, PoolId, ServiceConfig, Weights};

use crate::api::{
    Deployment, DeploymentStatus, ListenerRule, ReleaseApi, RuleAction, ServiceInfo,
    TargetGroupWeight, TaskDescription, TaskSnapshot, TaskStatus,
};
use crate::clock::Clock;
use crate::error::{ReleaseError, ReleaseResult};

/// Largest weight the simulated router accepts on a target group.
const MAX_TARGET_WEIGHT: i64 = 999;

/// How a pool behaves after its desired state changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloutBehavior {
    /// Old revisions drain on the n-th status read after the update.
    AfterPolls(u32),
    /// Old revisions never drain.
    Stuck,
    /// The new revision never shows up as in progress.
    Orphaned,
}

/// How the next launched validation task behaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskBehavior {
    /// Status reads that report `RUNNING` before the task stops.
    pub running_polls: u32,
    /// Container exit codes once stopped.
    pub exit_codes: Vec<Option<i32>>,
    /// Report the task twice in every status response.
    pub duplicate: bool,
}

impl Default for TaskBehavior {
    fn default() -> Self {
        Self {
            running_polls: 0,
            exit_codes: vec![Some(0)],
            duplicate: false,
        }
    }
}

/// Operation kinds, for failure injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FleetOp {
    ServiceInfo,
    UpdateDesiredState,
    RunTask,
    DescribeTask,
    DescribeRule,
    ModifyRule,
}

/// One recorded call, with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FleetCall {
    ServiceInfo(PoolId),
    UpdateDesiredState(PoolId, DesiredState),
    RunTask {
        task_definition: String,
        container: String,
        command: Vec<String>,
    },
    DescribeTask(String),
    DescribeRule,
    ModifyRule(Vec<RuleAction>),
}

impl FleetCall {
    pub fn op(&self) -> FleetOp {
        match self {
            FleetCall::ServiceInfo(_) => FleetOp::ServiceInfo,
            FleetCall::UpdateDesiredState(..) => FleetOp::UpdateDesiredState,
            FleetCall::RunTask { .. } => FleetOp::RunTask,
            FleetCall::DescribeTask(_) => FleetOp::DescribeTask,
            FleetCall::DescribeRule => FleetOp::DescribeRule,
            FleetCall::ModifyRule(_) => FleetOp::ModifyRule,
        }
    }
}

/// Starting state of a simulated service.
#[derive(Debug, Clone)]
pub struct FleetSeed {
    pub rule_arn: String,
    pub canary_target_group: String,
    pub primary_target_group: String,
    pub weights: Weights,
    pub canary: DesiredState,
    pub primary: DesiredState,
}

/// Injected failure for one operation.
#[derive(Debug, Clone)]
struct Failure {
    /// Calls that still succeed before the failure kicks in.
    remaining_ok: u32,
    message: String,
}

struct PoolSim {
    desired: DesiredState,
    deployments: Vec<Deployment>,
    polls_since_update: u32,
    rollout: RolloutBehavior,
}

struct TaskSim {
    behavior: TaskBehavior,
    polls: u32,
}

struct FleetState {
    pools: HashMap<PoolId, PoolSim>,
    rule: ListenerRule,
    canary_target_group: String,
    primary_target_group: String,
    next_task: TaskBehavior,
    tasks: HashMap<String, TaskSim>,
    next_id: u64,
    failures: HashMap<FleetOp, Failure>,
    calls: Vec<FleetCall>,
}

pub struct SimulatedFleet {
    clock: Arc<dyn Clock>,
    state: Mutex<FleetState>,
}

impl SimulatedFleet {
    pub const RULE_ARN: &'static str = "arn:sim:listener-rule/api";
    pub const CANARY_TG: &'static str = "arn:sim:targetgroup/api-canary";
    pub const PRIMARY_TG: &'static str = "arn:sim:targetgroup/api-primary";

    pub fn new(seed: FleetSeed, clock: Arc<dyn Clock>) -> Self {
        let created_at = clock.now_epoch_secs().saturating_sub(3600);
        let pool = |id: PoolId, desired: DesiredState| PoolSim {
            deployments: vec![Deployment {
                id: format!("{id}-0"),
                status: DeploymentStatus::Primary,
                task_definition: desired.task_definition.clone(),
                desired_count: desired.desired_count,
                created_at,
            }],
            desired,
            polls_since_update: 0,
            rollout: RolloutBehavior::AfterPolls(1),
        };

        let rule = ListenerRule {
            arn: seed.rule_arn,
            actions: vec![RuleAction::Forward {
                order: Some(1),
                target_groups: vec![
                    TargetGroupWeight {
                        target_group_arn: seed.canary_target_group.clone(),
                        weight: seed.weights.canary,
                    },
                    TargetGroupWeight {
                        target_group_arn: seed.primary_target_group.clone(),
                        weight: seed.weights.primary,
                    },
                ],
            }],
        };

        Self {
            clock,
            state: Mutex::new(FleetState {
                pools: HashMap::from([
                    (PoolId::Canary, pool(PoolId::Canary, seed.canary)),
                    (PoolId::Primary, pool(PoolId::Primary, seed.primary)),
                ]),
                rule,
                canary_target_group: seed.canary_target_group,
                primary_target_group: seed.primary_target_group,
                next_task: TaskBehavior::default(),
                tasks: HashMap::new(),
                next_id: 1,
                failures: HashMap::new(),
                calls: Vec::new(),
            }),
        }
    }

    /// Build a fleet for a configured service from its `simulation` table.
    pub fn from_config(service: &ServiceConfig, sim: &SimulationConfig, clock: Arc<dyn Clock>) -> Self {
        let fleet = Self::new(
            FleetSeed {
                rule_arn: service.listener_rule_arn.clone(),
                canary_target_group: service.canary.tg_arn.clone(),
                primary_target_group: service.primary.tg_arn.clone(),
                weights: Weights::new(sim.canary_weight, 100i64.saturating_sub(sim.canary_weight)),
                canary: DesiredState::new(&sim.canary_task, sim.canary_count),
                primary: DesiredState::new(&sim.primary_task, sim.primary_count),
            },
            clock,
        );
        for pool in PoolId::ALL {
            fleet.set_rollout(pool, RolloutBehavior::AfterPolls(sim.stabilize_after_polls));
        }
        fleet.set_task_behavior(TaskBehavior {
            exit_codes: vec![Some(sim.validation_exit_code)],
            ..Default::default()
        });
        fleet
    }

    /// A small service with all traffic on primary: canary `api:1 x1`,
    /// primary `api:1 x2`.
    pub fn sample(clock: Arc<dyn Clock>) -> Self {
        Self::new(
            FleetSeed {
                rule_arn: Self::RULE_ARN.to_string(),
                canary_target_group: Self::CANARY_TG.to_string(),
                primary_target_group: Self::PRIMARY_TG.to_string(),
                weights: Weights::new(0, 100),
                canary: DesiredState::new("api:1", 1),
                primary: DesiredState::new("api:1", 2),
            },
            clock,
        )
    }

    /// Service config matching [`SimulatedFleet::sample`].
    pub fn sample_service() -> ServiceConfig {
        ServiceConfig {
            listener_rule_arn: Self::RULE_ARN.to_string(),
            deploy_timeout: "10m".to_string(),
            validation_task: Some("api-smoke:1".to_string()),
            validation_task_container: Some("smoke".to_string()),
            canary: PoolConfig {
                tg_arn: Self::CANARY_TG.to_string(),
                ecs_service: "api-canary".to_string(),
            },
            primary: PoolConfig {
                tg_arn: Self::PRIMARY_TG.to_string(),
                ecs_service: "api".to_string(),
            },
            ..Default::default()
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FleetState> {
        self.state.lock().expect("fleet lock")
    }

    // ── Knobs ─────────────────────────────────────────────────────

    pub fn set_rollout(&self, pool: PoolId, rollout: RolloutBehavior) {
        if let Some(sim) = self.lock().pools.get_mut(&pool) {
            sim.rollout = rollout;
        }
    }

    pub fn set_task_behavior(&self, behavior: TaskBehavior) {
        self.lock().next_task = behavior;
    }

    /// Fail every call of `op` from now on.
    pub fn fail_on(&self, op: FleetOp, message: &str) {
        self.fail_after(op, 0, message);
    }

    /// Let `ok_calls` calls of `op` succeed, then fail every later one.
    pub fn fail_after(&self, op: FleetOp, ok_calls: u32, message: &str) {
        self.lock().failures.insert(
            op,
            Failure {
                remaining_ok: ok_calls,
                message: message.to_string(),
            },
        );
    }

    pub fn clear_failure(&self, op: FleetOp) {
        self.lock().failures.remove(&op);
    }

    pub fn set_rule(&self, rule: ListenerRule) {
        self.lock().rule = rule;
    }

    // ── Inspection ────────────────────────────────────────────────

    pub fn weights(&self) -> Weights {
        let state = self.lock();
        let mut weights = Weights::default();
        for action in &state.rule.actions {
            if let RuleAction::Forward { target_groups, .. } = action {
                for target in target_groups {
                    if target.target_group_arn == state.canary_target_group {
                        weights.canary = target.weight;
                    } else if target.target_group_arn == state.primary_target_group {
                        weights.primary = target.weight;
                    }
                }
            }
        }
        weights
    }

    pub fn rule(&self) -> ListenerRule {
        self.lock().rule.clone()
    }

    pub fn desired_state(&self, pool: PoolId) -> DesiredState {
        self.lock().pools[&pool].desired.clone()
    }

    pub fn deployments(&self, pool: PoolId) -> Vec<Deployment> {
        self.lock().pools[&pool].deployments.clone()
    }

    pub fn calls(&self) -> Vec<FleetCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, op: FleetOp) -> usize {
        self.lock().calls.iter().filter(|c| c.op() == op).count()
    }

    /// Arguments of the most recent task launch.
    pub fn last_task_launch(&self) -> Option<(String, String, Vec<String>)> {
        self.lock().calls.iter().rev().find_map(|c| match c {
            FleetCall::RunTask {
                task_definition,
                container,
                command,
            } => Some((task_definition.clone(), container.clone(), command.clone())),
            _ => None,
        })
    }

    /// Record a call and apply any injected failure for it.
    fn enter(&self, state: &mut FleetState, call: FleetCall) -> ReleaseResult<()> {
        let op = call.op();
        state.calls.push(call);
        match state.failures.get_mut(&op) {
            Some(failure) if failure.remaining_ok > 0 => {
                failure.remaining_ok -= 1;
                Ok(())
            }
            Some(failure) => Err(ReleaseError::api(op_name(op), failure.message.clone())),
            None => Ok(()),
        }
    }
}

fn op_name(op: FleetOp) -> &'static str {
    match op {
        FleetOp::ServiceInfo => "describe services",
        FleetOp::UpdateDesiredState => "update service",
        FleetOp::RunTask => "run task",
        FleetOp::DescribeTask => "describe tasks",
        FleetOp::DescribeRule => "describe rules",
        FleetOp::ModifyRule => "modify rule",
    }
}

#[async_trait]
impl ReleaseApi for SimulatedFleet {
    async fn service_info(&self, pool: PoolId) -> ReleaseResult<ServiceInfo> {
        let mut state = self.lock();
        self.enter(&mut state, FleetCall::ServiceInfo(pool))?;

        let sim = state
            .pools
            .get_mut(&pool)
            .ok_or_else(|| ReleaseError::NotFound(format!("{pool} service")))?;

        if sim.deployments.len() > 1 {
            sim.polls_since_update += 1;
            if let RolloutBehavior::AfterPolls(n) = sim.rollout
                && sim.polls_since_update >= n
            {
                sim.deployments
                    .retain(|d| d.status == DeploymentStatus::Primary);
                debug!(%pool, "simulated deployment drained old revisions");
            }
        }

        Ok(ServiceInfo {
            desired_state: sim.desired.clone(),
            deployments: sim.deployments.clone(),
        })
    }

    async fn update_desired_state(
        &self,
        pool: PoolId,
        desired: &DesiredState,
    ) -> ReleaseResult<()> {
        let now = self.clock.now_epoch_secs();
        let mut state = self.lock();
        self.enter(
            &mut state,
            FleetCall::UpdateDesiredState(pool, desired.clone()),
        )?;

        let id = state.next_id;
        state.next_id += 1;

        let sim = state
            .pools
            .get_mut(&pool)
            .ok_or_else(|| ReleaseError::NotFound(format!("{pool} service")))?;

        let status = match sim.rollout {
            RolloutBehavior::Orphaned => DeploymentStatus::Active,
            _ => DeploymentStatus::Primary,
        };
        for deployment in &mut sim.deployments {
            if deployment.status == DeploymentStatus::Primary {
                deployment.status = DeploymentStatus::Active;
            }
        }
        sim.deployments.push(Deployment {
            id: format!("{pool}-{id}"),
            status,
            task_definition: desired.task_definition.clone(),
            desired_count: desired.desired_count,
            created_at: now,
        });
        sim.desired = desired.clone();
        sim.polls_since_update = 0;
        Ok(())
    }

    async fn run_task(
        &self,
        task_definition: &str,
        container: &str,
        command: &[String],
    ) -> ReleaseResult<String> {
        let mut state = self.lock();
        self.enter(
            &mut state,
            FleetCall::RunTask {
                task_definition: task_definition.to_string(),
                container: container.to_string(),
                command: command.to_vec(),
            },
        )?;

        let task_id = format!("task-{}", state.next_id);
        state.next_id += 1;
        let behavior = state.next_task.clone();
        state.tasks.insert(task_id.clone(), TaskSim { behavior, polls: 0 });
        Ok(task_id)
    }

    async fn describe_task(&self, task_id: &str) -> ReleaseResult<TaskDescription> {
        let mut state = self.lock();
        self.enter(&mut state, FleetCall::DescribeTask(task_id.to_string()))?;

        let Some(task) = state.tasks.get_mut(task_id) else {
            return Ok(TaskDescription {
                tasks: vec![],
                failures: vec![format!("MISSING {task_id}")],
            });
        };

        let snapshot = if task.polls < task.behavior.running_polls {
            task.polls += 1;
            TaskSnapshot {
                task_id: task_id.to_string(),
                last_status: TaskStatus::Running,
                container_exit_codes: vec![None; task.behavior.exit_codes.len()],
            }
        } else {
            TaskSnapshot {
                task_id: task_id.to_string(),
                last_status: TaskStatus::Stopped,
                container_exit_codes: task.behavior.exit_codes.clone(),
            }
        };

        let copies = if task.behavior.duplicate { 2 } else { 1 };
        Ok(TaskDescription {
            tasks: vec![snapshot; copies],
            failures: vec![],
        })
    }

    async fn describe_rule(&self) -> ReleaseResult<ListenerRule> {
        let mut state = self.lock();
        self.enter(&mut state, FleetCall::DescribeRule)?;
        Ok(state.rule.clone())
    }

    async fn modify_rule(&self, actions: Vec<RuleAction>) -> ReleaseResult<()> {
        let mut state = self.lock();
        self.enter(&mut state, FleetCall::ModifyRule(actions.clone()))?;

        for action in &actions {
            if let RuleAction::Forward { target_groups, .. } = action {
                for target in target_groups {
                    if !(0..=MAX_TARGET_WEIGHT).contains(&target.weight) {
                        return Err(ReleaseError::Rejected(format!(
                            "weight {} for {} outside 0..={MAX_TARGET_WEIGHT}",
                            target.weight, target.target_group_arn
                        )));
                    }
                }
            }
        }

        state.rule.actions = actions;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn fleet() -> SimulatedFleet {
        SimulatedFleet::sample(Arc::new(ManualClock::new(50_000)))
    }

    #[tokio::test]
    async fn update_adds_in_progress_revision() {
        let fleet = fleet();
        fleet.set_rollout(PoolId::Canary, RolloutBehavior::AfterPolls(2));
        fleet
            .update_desired_state(PoolId::Canary, &DesiredState::new("api:2", 1))
            .await
            .unwrap();

        let info = fleet.service_info(PoolId::Canary).await.unwrap();
        assert_eq!(info.deployments.len(), 2);
        assert_eq!(info.in_progress().unwrap().task_definition, "api:2");
        assert_eq!(info.in_progress().unwrap().created_at, 50_000);

        let info = fleet.service_info(PoolId::Canary).await.unwrap();
        assert_eq!(info.deployments.len(), 1);
    }

    #[tokio::test]
    async fn failure_injection_counts_down() {
        let fleet = fleet();
        fleet.fail_after(FleetOp::DescribeRule, 1, "boom");

        assert!(fleet.describe_rule().await.is_ok());
        let err = fleet.describe_rule().await.unwrap_err();
        assert_eq!(err, ReleaseError::api("describe rules", "boom"));

        fleet.clear_failure(FleetOp::DescribeRule);
        assert!(fleet.describe_rule().await.is_ok());
        assert_eq!(fleet.call_count(FleetOp::DescribeRule), 3);
    }

    #[tokio::test]
    async fn duplicate_tasks_are_reported_twice() {
        let fleet = fleet();
        fleet.set_task_behavior(TaskBehavior {
            duplicate: true,
            ..Default::default()
        });
        let id = fleet.run_task("smoke:1", "smoke", &[]).await.unwrap();
        let description = fleet.describe_task(&id).await.unwrap();
        assert_eq!(description.tasks.len(), 2);
    }

    #[tokio::test]
    async fn unknown_task_reports_failure() {
        let fleet = fleet();
        let description = fleet.describe_task("task-404").await.unwrap();
        assert!(description.tasks.is_empty());
        assert_eq!(description.failures.len(), 1);
    }

    #[test]
    fn from_config_seeds_state() {
        let sim = SimulationConfig {
            canary_task: "api:4".to_string(),
            canary_count: 1,
            primary_task: "api:4".to_string(),
            primary_count: 3,
            canary_weight: 10,
            stabilize_after_polls: 2,
            validation_exit_code: 0,
        };
        let fleet = SimulatedFleet::from_config(
            &SimulatedFleet::sample_service(),
            &sim,
            Arc::new(ManualClock::new(1_000)),
        );

        assert_eq!(fleet.weights(), Weights::new(10, 90));
        assert_eq!(fleet.desired_state(PoolId::Primary), DesiredState::new("api:4", 3));
    }

    #[test]
    fn extreme_seed_weight_does_not_overflow() {
        let sim = SimulationConfig {
            canary_task: "api:1".to_string(),
            canary_count: 0,
            primary_task: "api:1".to_string(),
            primary_count: 2,
            canary_weight: i64::MIN,
            stabilize_after_polls: 1,
            validation_exit_code: 0,
        };
        let fleet = SimulatedFleet::from_config(
            &SimulatedFleet::sample_service(),
            &sim,
            Arc::new(ManualClock::new(1_000)),
        );

        assert_eq!(fleet.weights(), Weights::new(i64::MIN, i64::MAX));
    }
}
