//! rollgate.toml configuration parser.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::types::{DesiredState, PoolId};
use crate::workflow::{Action, WorkflowDefinition};

const DEFAULT_DEPLOY_TIMEOUT: &str = "10m";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Cluster used by services that don't set their own.
    #[serde(default)]
    pub cluster_arn: String,
    /// Region used by services that don't set their own.
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,
    #[serde(default)]
    pub workflows: BTreeMap<String, Vec<Action>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServiceConfig {
    pub cluster_arn: Option<String>,
    pub region: Option<String>,
    pub listener_rule_arn: String,
    #[serde(default = "default_deploy_timeout")]
    pub deploy_timeout: String,
    pub validation_task: Option<String>,
    pub validation_task_container: Option<String>,
    pub canary: PoolConfig,
    pub primary: PoolConfig,
    /// Starting state for the simulated fleet backend.
    pub simulation: Option<SimulationConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PoolConfig {
    pub tg_arn: String,
    pub ecs_service: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PollingConfig {
    #[serde(default = "default_deploy_interval")]
    pub deploy_interval: String,
    #[serde(default = "default_task_grace")]
    pub task_grace: String,
    #[serde(default = "default_task_interval")]
    pub task_interval: String,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            deploy_interval: default_deploy_interval(),
            task_grace: default_task_grace(),
            task_interval: default_task_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SimulationConfig {
    pub canary_task: String,
    #[serde(default)]
    pub canary_count: u32,
    pub primary_task: String,
    #[serde(default = "default_primary_count")]
    pub primary_count: u32,
    #[serde(default)]
    pub canary_weight: i64,
    /// Status polls before a new deployment drains the old one.
    #[serde(default = "default_stabilize_after")]
    pub stabilize_after_polls: u32,
    /// Exit code the simulated validation task stops with.
    #[serde(default)]
    pub validation_exit_code: i32,
}

fn default_deploy_timeout() -> String {
    DEFAULT_DEPLOY_TIMEOUT.to_string()
}
fn default_deploy_interval() -> String {
    "30s".to_string()
}
fn default_task_grace() -> String {
    "30s".to_string()
}
fn default_task_interval() -> String {
    "60s".to_string()
}
fn default_primary_count() -> u32 {
    2
}
fn default_stabilize_after() -> u32 {
    1
}

/// Parsed polling cadence for deployments and validation tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingIntervals {
    /// Sleep between deployment status checks.
    pub deploy: Duration,
    /// Wait after launching a task before the first status check.
    pub task_grace: Duration,
    /// Sleep between task status checks.
    pub task: Duration,
}

impl Default for PollingIntervals {
    fn default() -> Self {
        Self {
            deploy: Duration::from_secs(30),
            task_grace: Duration::from_secs(30),
            task: Duration::from_secs(60),
        }
    }
}

impl PollingConfig {
    pub fn intervals(&self) -> ConfigResult<PollingIntervals> {
        Ok(PollingIntervals {
            deploy: parse_duration(&self.deploy_interval)?,
            task_grace: parse_duration(&self.task_grace)?,
            task: parse_duration(&self.task_interval)?,
        })
    }
}

impl Config {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a config document.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check everything that serde can't: durations and pool wiring.
    pub fn validate(&self) -> ConfigResult<()> {
        self.polling.intervals()?;
        for (name, service) in &self.services {
            service.validate(name)?;
        }
        Ok(())
    }

    pub fn service(&self, name: &str) -> ConfigResult<&ServiceConfig> {
        self.services
            .get(name)
            .ok_or_else(|| ConfigError::UnknownService(name.to_string()))
    }

    pub fn workflow(&self, name: &str) -> ConfigResult<&[Action]> {
        self.workflows
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| ConfigError::UnknownWorkflow(name.to_string()))
    }

    /// Region for a service, falling back to the root region.
    pub fn region_for(&self, service: &str) -> &str {
        self.services
            .get(service)
            .and_then(|s| s.region.as_deref())
            .filter(|r| !r.is_empty())
            .unwrap_or(self.region.as_str())
    }

    /// Cluster for a service, falling back to the root cluster.
    pub fn cluster_for(&self, service: &str) -> &str {
        self.services
            .get(service)
            .and_then(|s| s.cluster_arn.as_deref())
            .filter(|c| !c.is_empty())
            .unwrap_or(self.cluster_arn.as_str())
    }

    /// Build the workflow the orchestrator runs for one deploy.
    pub fn resolve(
        &self,
        service: &str,
        workflow: &str,
        default_state: DesiredState,
    ) -> ConfigResult<WorkflowDefinition> {
        self.service(service)?;
        let steps = self.workflow(workflow)?.to_vec();
        Ok(WorkflowDefinition::new(service, steps, default_state))
    }
}

impl ServiceConfig {
    pub fn pool(&self, pool: PoolId) -> &PoolConfig {
        match pool {
            PoolId::Canary => &self.canary,
            PoolId::Primary => &self.primary,
        }
    }

    pub fn target_group(&self, pool: PoolId) -> &str {
        &self.pool(pool).tg_arn
    }

    pub fn ecs_service(&self, pool: PoolId) -> &str {
        &self.pool(pool).ecs_service
    }

    pub fn is_canary_target_group(&self, arn: &str) -> bool {
        self.canary.tg_arn == arn
    }

    pub fn is_primary_target_group(&self, arn: &str) -> bool {
        self.primary.tg_arn == arn
    }

    /// The pool a target group belongs to, if either.
    pub fn pool_for_target_group(&self, arn: &str) -> Option<PoolId> {
        if self.is_canary_target_group(arn) {
            Some(PoolId::Canary)
        } else if self.is_primary_target_group(arn) {
            Some(PoolId::Primary)
        } else {
            None
        }
    }

    pub fn deploy_timeout(&self) -> ConfigResult<Duration> {
        parse_duration(&self.deploy_timeout)
    }

    fn validate(&self, name: &str) -> ConfigResult<()> {
        let invalid = |reason: &str| ConfigError::InvalidService {
            service: name.to_string(),
            reason: reason.to_string(),
        };

        if self.listener_rule_arn.is_empty() {
            return Err(invalid("listener-rule-arn is required"));
        }
        if self.canary.tg_arn.is_empty() || self.primary.tg_arn.is_empty() {
            return Err(invalid("both pools need a tg-arn"));
        }
        if self.canary.tg_arn == self.primary.tg_arn {
            return Err(invalid("canary and primary share a target group"));
        }
        self.deploy_timeout()?;
        Ok(())
    }
}

/// Parse a duration string like "500ms", "30s", "5m" or "1h".
/// A bare number is taken as seconds.
pub fn parse_duration(s: &str) -> ConfigResult<Duration> {
    let s = s.trim();
    let invalid = || ConfigError::InvalidDuration(s.to_string());

    let (digits, unit_secs) = if let Some(ms) = s.strip_suffix("ms") {
        return ms.parse::<u64>().map(Duration::from_millis).map_err(|_| invalid());
    } else if let Some(secs) = s.strip_suffix('s') {
        (secs, 1)
    } else if let Some(mins) = s.strip_suffix('m') {
        (mins, 60)
    } else if let Some(hours) = s.strip_suffix('h') {
        (hours, 3600)
    } else {
        (s, 1)
    };

    let n = digits.parse::<u64>().map_err(|_| invalid())?;
    n.checked_mul(unit_secs)
        .map(Duration::from_secs)
        .ok_or_else(invalid)
}
