//! Pre-run snapshot of a service, used as the rollback target.

use serde::Serialize;
use tracing::info;

use rollgate_core::{DesiredState, PoolId, Weights};
use rollgate_release::{DeploymentController, ReleaseResult, TrafficController};

/// Weights and both pools' desired states as they were before the first
/// step ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Checkpoint {
    pub weights: Weights,
    pub canary: DesiredState,
    pub primary: DesiredState,
}

impl Checkpoint {
    pub async fn capture(
        traffic: &TrafficController,
        deployer: &DeploymentController,
    ) -> ReleaseResult<Self> {
        let checkpoint = Self {
            weights: traffic.current_weights().await?,
            canary: deployer.current_state(PoolId::Canary).await?,
            primary: deployer.current_state(PoolId::Primary).await?,
        };
        info!(
            weights = %checkpoint.weights,
            canary = %checkpoint.canary,
            primary = %checkpoint.primary,
            "checkpoint captured"
        );
        Ok(checkpoint)
    }

    pub fn state(&self, pool: PoolId) -> &DesiredState {
        match pool {
            PoolId::Canary => &self.canary,
            PoolId::Primary => &self.primary,
        }
    }
}
