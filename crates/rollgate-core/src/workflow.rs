//! Workflow actions and the resolved workflow handed to the orchestrator.
//!
//! Actions are written in config as flat tables tagged by `action`:
//!
//! ```toml
//! [[workflows.default]]
//! action = "shift"
//! target = "canary"
//! ratio = 10
//! ```
//!
//! The flat [`ActionSpec`] is converted into the typed [`Action`] on load.
//! Unknown tags are kept as [`Action::Unrecognized`] so the executor can
//! decide whether they are fatal.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{DesiredState, PoolId};

pub const UPDATE_TAG: &str = "update";
pub const SHIFT_TAG: &str = "shift";
pub const VALIDATE_TAG: &str = "validate";

/// Which validator a `validate` step runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationTarget {
    /// Ask the operator on stdin.
    Prompt,
    /// Run the service's validation task.
    Task,
    /// Anything else. Always fails without touching the cloud.
    Other(String),
}

impl ValidationTarget {
    pub fn as_str(&self) -> &str {
        match self {
            ValidationTarget::Prompt => "prompt",
            ValidationTarget::Task => "task",
            ValidationTarget::Other(s) => s,
        }
    }
}

impl From<&str> for ValidationTarget {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "prompt" => ValidationTarget::Prompt,
            "task" => ValidationTarget::Task,
            _ => ValidationTarget::Other(s.to_string()),
        }
    }
}

impl fmt::Display for ValidationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single workflow step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ActionSpec", into = "ActionSpec")]
pub enum Action {
    /// Deploy the default state (with overrides) to a pool.
    UpdatePool {
        target: PoolId,
        count: Option<u32>,
        task_definition: Option<String>,
        command: Vec<String>,
    },
    /// Move `ratio` percent of traffic to `target`.
    TrafficShift { target: PoolId, ratio: i64 },
    /// Block until the validator passes.
    ValidatePool {
        target: ValidationTarget,
        command: Vec<String>,
    },
    /// An action tag this version does not know.
    Unrecognized { tag: String },
}

impl Action {
    /// Short tag naming the kind of action.
    pub fn kind(&self) -> &str {
        match self {
            Action::UpdatePool { .. } => UPDATE_TAG,
            Action::TrafficShift { .. } => SHIFT_TAG,
            Action::ValidatePool { .. } => VALIDATE_TAG,
            Action::Unrecognized { tag } => tag,
        }
    }

    /// The pool or validator the action targets, for logs and errors.
    pub fn target_label(&self) -> String {
        match self {
            Action::UpdatePool { target, .. } | Action::TrafficShift { target, .. } => {
                target.to_string()
            }
            Action::ValidatePool { target, .. } => target.to_string(),
            Action::Unrecognized { .. } => String::new(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::UpdatePool {
                target,
                count,
                task_definition,
                ..
            } => {
                write!(f, "update {target}")?;
                if let Some(count) = count {
                    write!(f, " count={count}")?;
                }
                if let Some(task) = task_definition {
                    write!(f, " task={task}")?;
                }
                Ok(())
            }
            Action::TrafficShift { target, ratio } => write!(f, "shift {target} ratio={ratio}"),
            Action::ValidatePool { target, .. } => write!(f, "validate {target}"),
            Action::Unrecognized { tag } => write!(f, "unrecognized '{tag}'"),
        }
    }
}

/// Flat on-disk form of an [`Action`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSpec {
    pub action: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ratio: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
}

impl TryFrom<ActionSpec> for Action {
    type Error = ConfigError;

    fn try_from(spec: ActionSpec) -> Result<Self, Self::Error> {
        let tag = spec.action.trim().to_ascii_lowercase();
        match tag.as_str() {
            UPDATE_TAG => Ok(Action::UpdatePool {
                target: spec.target.parse()?,
                count: spec.count,
                task_definition: spec.task,
                command: spec.command,
            }),
            SHIFT_TAG => Ok(Action::TrafficShift {
                target: spec.target.parse()?,
                ratio: spec.ratio.ok_or(ConfigError::MissingField {
                    action: tag.clone(),
                    field: "ratio",
                })?,
            }),
            VALIDATE_TAG => Ok(Action::ValidatePool {
                target: ValidationTarget::from(spec.target.as_str()),
                command: spec.command,
            }),
            _ => Ok(Action::Unrecognized { tag: spec.action }),
        }
    }
}

impl From<Action> for ActionSpec {
    fn from(action: Action) -> Self {
        match action {
            Action::UpdatePool {
                target,
                count,
                task_definition,
                command,
            } => ActionSpec {
                action: UPDATE_TAG.to_string(),
                target: target.to_string(),
                count,
                task: task_definition,
                command,
                ..Default::default()
            },
            Action::TrafficShift { target, ratio } => ActionSpec {
                action: SHIFT_TAG.to_string(),
                target: target.to_string(),
                ratio: Some(ratio),
                ..Default::default()
            },
            Action::ValidatePool { target, command } => ActionSpec {
                action: VALIDATE_TAG.to_string(),
                target: target.to_string(),
                command,
                ..Default::default()
            },
            Action::Unrecognized { tag } => ActionSpec {
                action: tag,
                ..Default::default()
            },
        }
    }
}

/// A fully resolved workflow for one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowDefinition {
    pub service: String,
    pub steps: Vec<Action>,
    /// State deployed by `update` steps unless the step overrides it.
    pub default_state: DesiredState,
}

impl WorkflowDefinition {
    pub fn new(service: &str, steps: Vec<Action>, default_state: DesiredState) -> Self {
        Self {
            service: service.to_string(),
            steps,
            default_state,
        }
    }

    /// The state an `update` step deploys: the default with the step's
    /// non-zero overrides applied. `None` for any other kind of step.
    pub fn effective_state(&self, action: &Action) -> Option<DesiredState> {
        match action {
            Action::UpdatePool {
                count,
                task_definition,
                ..
            } => Some(
                self.default_state
                    .merged(*count, task_definition.as_deref()),
            ),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Steps {
        steps: Vec<Action>,
    }

    fn parse(toml_str: &str) -> Result<Vec<Action>, toml::de::Error> {
        toml::from_str::<Steps>(toml_str).map(|s| s.steps)
    }

    #[test]
    fn parses_all_known_actions() {
        let steps = parse(
            r#"
[[steps]]
action = "validate"
target = "task"
command = ["./smoke.sh", "--fast"]

[[steps]]
action = "SHIFT"
target = "primary"
ratio = 100

[[steps]]
action = "update"
target = "canary"
count = 1
task = "api:7"
"#,
        )
        .unwrap();

        assert_eq!(
            steps,
            vec![
                Action::ValidatePool {
                    target: ValidationTarget::Task,
                    command: vec!["./smoke.sh".into(), "--fast".into()],
                },
                Action::TrafficShift {
                    target: PoolId::Primary,
                    ratio: 100,
                },
                Action::UpdatePool {
                    target: PoolId::Canary,
                    count: Some(1),
                    task_definition: Some("api:7".into()),
                    command: vec![],
                },
            ]
        );
    }

    #[test]
    fn unknown_tag_is_kept() {
        let steps = parse("[[steps]]\naction = \"pause\"\ntarget = \"canary\"\n").unwrap();
        assert_eq!(
            steps,
            vec![Action::Unrecognized {
                tag: "pause".into()
            }]
        );
        assert_eq!(steps[0].kind(), "pause");
    }

    #[test]
    fn bad_pool_is_rejected() {
        let err = parse("[[steps]]\naction = \"update\"\ntarget = \"blue\"\n").unwrap_err();
        assert!(err.to_string().contains("invalid pool"));
    }

    #[test]
    fn shift_requires_ratio() {
        let err = parse("[[steps]]\naction = \"shift\"\ntarget = \"canary\"\n").unwrap_err();
        assert!(err.to_string().contains("ratio"));
    }

    #[test]
    fn odd_validator_is_other() {
        let steps = parse("[[steps]]\naction = \"validate\"\ntarget = \"metrics\"\n").unwrap();
        assert_eq!(
            steps[0],
            Action::ValidatePool {
                target: ValidationTarget::Other("metrics".into()),
                command: vec![],
            }
        );
    }

    #[test]
    fn effective_state_applies_overrides() {
        let workflow = WorkflowDefinition::new(
            "api",
            vec![],
            DesiredState::new("A", 2),
        );
        let bump = Action::UpdatePool {
            target: PoolId::Canary,
            count: Some(5),
            task_definition: None,
            command: vec![],
        };
        let bare = Action::UpdatePool {
            target: PoolId::Canary,
            count: None,
            task_definition: None,
            command: vec![],
        };

        assert_eq!(
            workflow.effective_state(&bump),
            Some(DesiredState::new("A", 5))
        );
        assert_eq!(
            workflow.effective_state(&bare),
            Some(DesiredState::new("A", 2))
        );
        assert_eq!(
            workflow.effective_state(&Action::TrafficShift {
                target: PoolId::Canary,
                ratio: 5
            }),
            None
        );
    }

    #[test]
    fn flat_form_converts_back() {
        let action = Action::TrafficShift {
            target: PoolId::Canary,
            ratio: 25,
        };
        let spec = ActionSpec::from(action.clone());
        assert_eq!(spec.action, "shift");
        assert_eq!(spec.ratio, Some(25));
        assert_eq!(Action::try_from(spec).unwrap(), action);
    }
}
