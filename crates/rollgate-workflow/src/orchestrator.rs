//! Orchestrator — runs a resolved workflow step by step.
//!
//! The service's weights and pool states are captured once before the
//! first step. The first step that fails triggers a rollback to that
//! checkpoint and ends the run; later steps never execute.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use rollgate_core::{
    Action, Config, DesiredState, PoolId, ServiceConfig, Weights, WorkflowDefinition,
};
use rollgate_release::{
    Clock, DeployOutcome, DeploymentController, ReleaseRegistry, TaskMonitor, TrafficController,
};

use crate::checkpoint::Checkpoint;
use crate::error::{StepFailure, WorkflowError, WorkflowResult};
use crate::gate::ValidationGate;

/// What to do with an action tag this version does not understand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Fail the step, which rolls the workflow back.
    #[default]
    Strict,
    /// Log a warning and move on to the next step.
    Lenient,
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub service: String,
    pub total_steps: usize,
    pub executed: usize,
    /// Unrecognized steps passed over in lenient mode.
    pub skipped: usize,
    pub checkpoint: Checkpoint,
}

enum StepOutcome {
    Done,
    Skipped,
}

/// Controllers for the service a workflow targets.
struct ServiceRelease<'a> {
    name: &'a str,
    config: &'a ServiceConfig,
    deployer: DeploymentController,
    traffic: TrafficController,
    monitor: TaskMonitor,
}

pub struct Orchestrator {
    registry: Arc<ReleaseRegistry>,
    config: Arc<Config>,
    clock: Arc<dyn Clock>,
    mode: ExecutionMode,
    gate: ValidationGate,
    last_checkpoint: Option<Checkpoint>,
}

impl Orchestrator {
    /// Orchestrator in strict mode, prompting on stdin.
    pub fn new(registry: Arc<ReleaseRegistry>, config: Arc<Config>, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry,
            config,
            clock,
            mode: ExecutionMode::default(),
            gate: ValidationGate::stdin(),
            last_checkpoint: None,
        }
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_gate(mut self, gate: ValidationGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Checkpoint taken by the most recent run, if it got that far.
    pub fn last_checkpoint(&self) -> Option<&Checkpoint> {
        self.last_checkpoint.as_ref()
    }

    /// Run `workflow` to completion or roll it back.
    pub async fn process_workflow(&mut self, workflow: &WorkflowDefinition) -> WorkflowResult<()> {
        self.run(workflow).await.map(|_| ())
    }

    /// Like [`process_workflow`](Self::process_workflow), returning a
    /// summary of what ran.
    pub async fn run(&mut self, workflow: &WorkflowDefinition) -> WorkflowResult<RunSummary> {
        let config = Arc::clone(&self.config);
        let release = self.release_for(&config, &workflow.service)?;

        self.last_checkpoint = None;
        let checkpoint = Checkpoint::capture(&release.traffic, &release.deployer)
            .await
            .map_err(WorkflowError::Checkpoint)?;
        self.last_checkpoint = Some(checkpoint.clone());

        let total = workflow.steps.len();
        let mut executed = 0;
        let mut skipped = 0;

        for (index, action) in workflow.steps.iter().enumerate() {
            let step = index + 1;
            info!(service = %release.name, step, total, %action, "executing step");

            match self.execute(&release, workflow, action).await {
                Ok(StepOutcome::Done) => executed += 1,
                Ok(StepOutcome::Skipped) => skipped += 1,
                Err(err) => {
                    error!(service = %release.name, step, total, error = %err, "step failed, rolling back");
                    rollback(&release, &checkpoint).await;
                    return Err(err);
                }
            }
        }

        info!(service = %release.name, executed, skipped, "workflow completed");
        Ok(RunSummary {
            service: workflow.service.clone(),
            total_steps: total,
            executed,
            skipped,
            checkpoint,
        })
    }

    fn release_for<'a>(&self, config: &'a Config, service: &'a str) -> WorkflowResult<ServiceRelease<'a>> {
        let service_config = config.service(service)?;
        let api = self.registry.client(service)?;
        let intervals = config.polling.intervals()?;

        Ok(ServiceRelease {
            name: service,
            config: service_config,
            deployer: DeploymentController::new(
                service,
                Arc::clone(&api),
                Arc::clone(&self.clock),
                intervals.deploy,
                service_config.deploy_timeout()?,
            ),
            traffic: TrafficController::new(service, Arc::clone(&api), service_config),
            monitor: TaskMonitor::new(api, Arc::clone(&self.clock), intervals),
        })
    }

    async fn execute(
        &mut self,
        release: &ServiceRelease<'_>,
        workflow: &WorkflowDefinition,
        action: &Action,
    ) -> WorkflowResult<StepOutcome> {
        match action {
            Action::UpdatePool { target, .. } => {
                let desired = workflow
                    .effective_state(action)
                    .unwrap_or_else(|| workflow.default_state.clone());
                update_pool(release, *target, &desired)
                    .await
                    .map_err(|cause| WorkflowError::UpdatePool {
                        pool: *target,
                        cause,
                    })?;
            }
            Action::TrafficShift { target, ratio } => {
                let weights = Weights::shifted_to(*target, *ratio);
                release
                    .traffic
                    .update_weights(weights)
                    .await
                    .map_err(|e| WorkflowError::TrafficShift {
                        pool: *target,
                        cause: e.into(),
                    })?;
            }
            Action::ValidatePool { target, command } => {
                self.gate
                    .validate(release.name, target, command, release.config, &release.monitor)
                    .await
                    .map_err(|cause| WorkflowError::Validation {
                        target: target.to_string(),
                        cause,
                    })?;
            }
            Action::Unrecognized { tag } => match self.mode {
                ExecutionMode::Strict => {
                    return Err(WorkflowError::UnrecognizedAction(tag.clone()));
                }
                ExecutionMode::Lenient => {
                    warn!(service = %release.name, action = %tag, "skipping unrecognized action");
                    return Ok(StepOutcome::Skipped);
                }
            },
        }
        Ok(StepOutcome::Done)
    }
}

/// Restore the checkpoint: weights first, then canary, then primary.
/// Each part is attempted once; failures are logged and the rest still
/// runs.
async fn rollback(release: &ServiceRelease<'_>, checkpoint: &Checkpoint) {
    warn!(service = %release.name, weights = %checkpoint.weights, "rolling back to checkpoint");

    if let Err(e) = release.traffic.update_weights(checkpoint.weights).await {
        error!(service = %release.name, error = %e, "failed to restore traffic weights");
    }

    for pool in PoolId::ALL {
        let state = checkpoint.state(pool);
        match release.deployer.deploy(pool, state).await {
            Ok(DeployOutcome::Stabilized) => {
                info!(service = %release.name, %pool, %state, "pool restored");
            }
            Ok(outcome) => {
                error!(service = %release.name, %pool, ?outcome, "pool restore did not stabilize");
            }
            Err(e) => {
                error!(service = %release.name, %pool, error = %e, "failed to restore pool");
            }
        }
    }
}

async fn update_pool(
    release: &ServiceRelease<'_>,
    pool: PoolId,
    desired: &DesiredState,
) -> Result<(), StepFailure> {
    match release.deployer.deploy(pool, desired).await? {
        DeployOutcome::Stabilized => Ok(()),
        DeployOutcome::TimedOut { age } => Err(StepFailure::TimedOut { age }),
        DeployOutcome::NoInProgressDeployment => Err(StepFailure::NoInProgressDeployment),
    }
}
