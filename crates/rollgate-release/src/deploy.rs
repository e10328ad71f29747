//! Deployment controller — push a desired state to one pool and wait for
//! the pool to settle on a single deployment revision.
//!
//! A deploy that does not settle is reverted with one best-effort write of
//! the state the pool had before the deploy. That write is not monitored.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use rollgate_core::{DesiredState, PoolId};

use crate::api::ReleaseApi;
use crate::clock::Clock;
use crate::error::ReleaseResult;

/// How a monitored deploy ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployOutcome {
    /// Exactly one deployment revision remains.
    Stabilized,
    /// The in-progress revision is older than the deploy timeout.
    TimedOut { age: Duration },
    /// Several revisions exist and none of them is in progress.
    NoInProgressDeployment,
}

impl DeployOutcome {
    pub fn is_stabilized(&self) -> bool {
        matches!(self, DeployOutcome::Stabilized)
    }
}

/// Drives deploys for the pools of one service.
pub struct DeploymentController {
    service: String,
    api: Arc<dyn ReleaseApi>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    timeout: Duration,
}

impl DeploymentController {
    pub fn new(
        service: &str,
        api: Arc<dyn ReleaseApi>,
        clock: Arc<dyn Clock>,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            service: service.to_string(),
            api,
            clock,
            poll_interval,
            timeout,
        }
    }

    /// Current desired state of a pool.
    pub async fn current_state(&self, pool: PoolId) -> ReleaseResult<DesiredState> {
        Ok(self.api.service_info(pool).await?.desired_state)
    }

    /// Deploy `desired` to `pool` and wait for it to stabilise.
    ///
    /// On any outcome other than [`DeployOutcome::Stabilized`], and on an
    /// API error while polling, the pool's pre-deploy state is written back
    /// once before returning.
    pub async fn deploy(&self, pool: PoolId, desired: &DesiredState) -> ReleaseResult<DeployOutcome> {
        let rollback_state = self.current_state(pool).await?;

        info!(service = %self.service, %pool, from = %rollback_state, to = %desired, "deploying");
        self.api.update_desired_state(pool, desired).await?;

        let outcome = self.wait_for_stable(pool).await;
        match &outcome {
            Ok(DeployOutcome::Stabilized) => {
                info!(service = %self.service, %pool, "deployment stabilized");
            }
            Ok(failed) => {
                warn!(service = %self.service, %pool, outcome = ?failed, "deployment failed, reverting pool");
                self.revert(pool, &rollback_state).await;
            }
            Err(e) => {
                warn!(service = %self.service, %pool, error = %e, "lost track of deployment, reverting pool");
                self.revert(pool, &rollback_state).await;
            }
        }
        outcome
    }

    /// Poll the pool until a single revision remains, the in-progress
    /// revision exceeds the timeout, or no in-progress revision exists.
    pub async fn wait_for_stable(&self, pool: PoolId) -> ReleaseResult<DeployOutcome> {
        loop {
            let info = self.api.service_info(pool).await?;
            debug!(service = %self.service, %pool, deployments = ?info.deployments, "deployment status");

            if info.deployments.len() == 1 {
                return Ok(DeployOutcome::Stabilized);
            }

            let Some(in_progress) = info.in_progress() else {
                error!(service = %self.service, %pool, deployments = ?info.deployments, "failed to locate the in-progress deployment");
                return Ok(DeployOutcome::NoInProgressDeployment);
            };

            let age = Duration::from_secs(
                self.clock
                    .now_epoch_secs()
                    .saturating_sub(in_progress.created_at),
            );
            if age > self.timeout {
                error!(service = %self.service, %pool, timeout = ?self.timeout, "deployment timed out");
                return Ok(DeployOutcome::TimedOut { age });
            }

            info!(service = %self.service, %pool, "waiting for deployment to complete, sleeping");
            self.clock.sleep(self.poll_interval).await;
        }
    }

    /// Revert an in-flight rollout to the revision it is replacing.
    ///
    /// Looks at the pool's revisions rather than a checkpoint. Returns
    /// `false` without writing when there is no in-progress revision or
    /// no previous one to return to.
    pub async fn rollback_in_progress(&self, pool: PoolId) -> ReleaseResult<bool> {
        let info = self.api.service_info(pool).await?;
        let (Some(current), Some(previous)) = (info.in_progress(), info.previous()) else {
            error!(service = %self.service, %pool, deployments = ?info.deployments, "failed to locate the previous or new revision");
            return Ok(false);
        };

        info!(service = %self.service, %pool, from = %current.state(), to = %previous.state(), "rolling back in-progress deployment");
        self.api.update_desired_state(pool, &previous.state()).await?;
        Ok(true)
    }

    async fn revert(&self, pool: PoolId, state: &DesiredState) {
        if let Err(e) = self.api.update_desired_state(pool, state).await {
            error!(service = %self.service, %pool, error = %e, "failed to revert pool");
        }
    }
}
