//! Validation task monitor — launch one task and poll it to a terminal state.

use std::sync::Arc;

use tracing::{debug, info, warn};

use rollgate_core::{PollingIntervals, TaskResult};

use crate::api::{ReleaseApi, TaskDescription, TaskStatus};
use crate::clock::Clock;
use crate::error::ReleaseResult;

/// Runs validation tasks and waits for their exit status.
pub struct TaskMonitor {
    api: Arc<dyn ReleaseApi>,
    clock: Arc<dyn Clock>,
    intervals: PollingIntervals,
}

impl TaskMonitor {
    pub fn new(api: Arc<dyn ReleaseApi>, clock: Arc<dyn Clock>, intervals: PollingIntervals) -> Self {
        Self {
            api,
            clock,
            intervals,
        }
    }

    /// Launch `task_definition` and block until it stops.
    ///
    /// Returns `true` if the task failed. There is no upper bound on how
    /// long this waits; the loop ends when the backend reports a terminal
    /// state or an API call errors.
    pub async fn run_and_monitor(
        &self,
        task_definition: &str,
        container: &str,
        command: &[String],
    ) -> ReleaseResult<bool> {
        let task_id = self
            .api
            .run_task(task_definition, container, command)
            .await?;
        info!(task = %task_id, task_definition, "validation task launched");

        // Freshly launched tasks may not be visible yet.
        self.clock.sleep(self.intervals.task_grace).await;

        loop {
            let description = self.api.describe_task(&task_id).await?;
            let result = classify_task(&description);
            if result.is_terminal() {
                info!(task = %task_id, failed = result.failed, "validation task finished");
                return Ok(result.failed);
            }

            debug!(task = %task_id, "validation task still running, sleeping");
            self.clock.sleep(self.intervals.task).await;
        }
    }
}

/// Classify a status response for a single requested task.
///
/// `STOPPED` passes only when exactly one container reports exit code 0.
/// Anything indeterminate (backend failures, no task, or more than one
/// task for one id) is terminal and failed.
pub fn classify_task(description: &TaskDescription) -> TaskResult {
    if !description.failures.is_empty() {
        warn!(failures = ?description.failures, "backend reported task failures");
        return TaskResult::stopped(true);
    }

    let task = match description.tasks.as_slice() {
        [task] => task,
        [] => {
            warn!("no task returned for the requested id");
            return TaskResult::stopped(true);
        }
        tasks => {
            warn!(count = tasks.len(), "expected exactly one task");
            return TaskResult::stopped(true);
        }
    };

    match task.last_status {
        TaskStatus::Pending | TaskStatus::Running => TaskResult::RUNNING,
        TaskStatus::Stopped => {
            let passed = matches!(task.container_exit_codes.as_slice(), [Some(0)]);
            TaskResult::stopped(!passed)
        }
    }
}
