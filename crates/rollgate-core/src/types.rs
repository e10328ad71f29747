//! Shared domain types used across rollgate crates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// One of the two deployment pools behind the listener rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolId {
    Canary,
    Primary,
}

impl PoolId {
    pub const ALL: [PoolId; 2] = [PoolId::Canary, PoolId::Primary];

    pub fn as_str(&self) -> &'static str {
        match self {
            PoolId::Canary => "canary",
            PoolId::Primary => "primary",
        }
    }

    /// The pool on the other side of the traffic split.
    pub fn other(&self) -> PoolId {
        match self {
            PoolId::Canary => PoolId::Primary,
            PoolId::Primary => PoolId::Canary,
        }
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PoolId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "canary" => Ok(PoolId::Canary),
            "primary" => Ok(PoolId::Primary),
            _ => Err(ConfigError::InvalidPool(s.to_string())),
        }
    }
}

/// Target task definition plus replica count for a pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredState {
    pub task_definition: String,
    pub desired_count: u32,
}

impl DesiredState {
    pub fn new(task_definition: &str, desired_count: u32) -> Self {
        Self {
            task_definition: task_definition.to_string(),
            desired_count,
        }
    }

    /// Apply per-step overrides on top of this state.
    ///
    /// A zero count or an empty task definition never overrides, so an
    /// override cannot request `desired_count = 0`.
    pub fn merged(&self, count: Option<u32>, task_definition: Option<&str>) -> DesiredState {
        let mut result = self.clone();
        if let Some(count) = count.filter(|c| *c != 0) {
            result.desired_count = count;
        }
        if let Some(task) = task_definition.filter(|t| !t.is_empty()) {
            result.task_definition = task.to_string();
        }
        result
    }
}

impl fmt::Display for DesiredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} x{}", self.task_definition, self.desired_count)
    }
}

/// Traffic split between the two pools, in percent.
///
/// Signed on purpose: an out-of-range shift ratio is passed through
/// unchanged and rejected by the router, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Weights {
    pub canary: i64,
    pub primary: i64,
}

impl Weights {
    pub fn new(canary: i64, primary: i64) -> Self {
        Self { canary, primary }
    }

    /// Give `ratio` percent to `target` and the remainder to the other pool.
    pub fn shifted_to(target: PoolId, ratio: i64) -> Self {
        let mut weights = Weights::default();
        weights.set(target, ratio);
        weights.set(target.other(), 100i64.saturating_sub(ratio));
        weights
    }

    pub fn get(&self, pool: PoolId) -> i64 {
        match pool {
            PoolId::Canary => self.canary,
            PoolId::Primary => self.primary,
        }
    }

    pub fn set(&mut self, pool: PoolId, weight: i64) {
        match pool {
            PoolId::Canary => self.canary = weight,
            PoolId::Primary => self.primary = weight,
        }
    }

    pub fn total(&self) -> i64 {
        self.canary.saturating_add(self.primary)
    }
}

impl fmt::Display for Weights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "canary={} primary={}", self.canary, self.primary)
    }
}

/// Classification of a validation task at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskResult {
    pub running: bool,
    pub failed: bool,
}

impl TaskResult {
    pub const RUNNING: TaskResult = TaskResult {
        running: true,
        failed: false,
    };

    pub fn stopped(failed: bool) -> Self {
        Self {
            running: false,
            failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !self.running
    }
}
