use std::path::Path;

use anyhow::Context;
use serde::Serialize;

use rollgate_core::{Action, Config, DesiredState, WorkflowDefinition};

use crate::OutputFormat;

#[derive(Debug, Serialize)]
pub struct PlannedStep<'a> {
    pub step: usize,
    pub action: &'a Action,
    /// State an update step will deploy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deploys: Option<DesiredState>,
}

pub fn plan(
    path: &Path,
    service: &str,
    workflow: &str,
    task_def: &str,
    count: u32,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let config = Config::from_file(path)
        .with_context(|| format!("invalid config {}", path.display()))?;
    let workflow = config.resolve(service, workflow, DesiredState::new(task_def, count))?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&steps(&workflow))?),
        OutputFormat::Text => print!("{}", render(&workflow)),
    }
    Ok(())
}

pub fn steps(workflow: &WorkflowDefinition) -> Vec<PlannedStep<'_>> {
    workflow
        .steps
        .iter()
        .enumerate()
        .map(|(i, action)| PlannedStep {
            step: i + 1,
            action,
            deploys: workflow.effective_state(action),
        })
        .collect()
}

pub fn render(workflow: &WorkflowDefinition) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{} ({} steps, default {}):\n",
        workflow.service,
        workflow.steps.len(),
        workflow.default_state
    ));
    for planned in steps(workflow) {
        let line = match &planned.deploys {
            Some(state) => format!("  {}. {} -> {state}\n", planned.step, planned.action),
            None => format!("  {}. {}\n", planned.step, planned.action),
        };
        out.push_str(&line);
    }
    out
}
