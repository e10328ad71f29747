//! Validation gates — block the workflow until a check passes or fails.
//!
//! A `prompt` gate reads one line of operator input. A `task` gate runs the
//! service's validation task to completion. Any other validator fails
//! without calling the cloud.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use rollgate_core::{ServiceConfig, ValidationTarget};
use rollgate_release::TaskMonitor;

use crate::error::StepFailure;

type LineSource = Box<dyn AsyncBufRead + Unpin + Send>;
type QuestionSink = Box<dyn AsyncWrite + Unpin + Send>;

pub struct ValidationGate {
    input: LineSource,
    output: QuestionSink,
}

impl ValidationGate {
    /// Gate reading operator answers from `input`, one line per prompt.
    /// Questions are discarded until an output is attached.
    pub fn new<R>(input: R) -> Self
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        Self {
            input: Box::new(input),
            output: Box::new(tokio::io::sink()),
        }
    }

    /// Gate asking on stderr and reading answers from stdin.
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin())).with_output(tokio::io::stderr())
    }

    /// Write each question to `output` before waiting for the answer.
    pub fn with_output<W>(mut self, output: W) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        self.output = Box::new(output);
        self
    }

    pub async fn validate(
        &mut self,
        service_name: &str,
        target: &ValidationTarget,
        command: &[String],
        service: &ServiceConfig,
        monitor: &TaskMonitor,
    ) -> Result<(), StepFailure> {
        match target {
            ValidationTarget::Prompt => self.prompt(service_name).await,
            ValidationTarget::Task => run_validation_task(service_name, service, command, monitor).await,
            ValidationTarget::Other(name) => {
                warn!(service = %service_name, validator = %name, "unknown validator");
                Err(StepFailure::UnknownValidator)
            }
        }
    }

    /// Ask the operator to confirm. Only `y` (any case, surrounding
    /// whitespace ignored) passes. End of input is a refusal.
    pub async fn prompt(&mut self, service_name: &str) -> Result<(), StepFailure> {
        info!(service = %service_name, "continue with the release? answer y to proceed");
        self.ask(&format!("Continue with the release of {service_name}? [y/N] "))
            .await
            .map_err(|e| StepFailure::Input(e.to_string()))?;

        let mut line = String::new();
        self.input
            .read_line(&mut line)
            .await
            .map_err(|e| StepFailure::Input(e.to_string()))?;

        if line.trim().eq_ignore_ascii_case("y") {
            info!(service = %service_name, "operator confirmed");
            Ok(())
        } else {
            warn!(service = %service_name, answer = %line.trim(), "operator declined");
            Err(StepFailure::Declined)
        }
    }

    async fn ask(&mut self, question: &str) -> std::io::Result<()> {
        self.output.write_all(question.as_bytes()).await?;
        self.output.flush().await
    }
}

async fn run_validation_task(
    service_name: &str,
    service: &ServiceConfig,
    command: &[String],
    monitor: &TaskMonitor,
) -> Result<(), StepFailure> {
    let Some(task_definition) = service.validation_task.as_deref().filter(|t| !t.is_empty()) else {
        return Err(StepFailure::NoValidationTask);
    };
    let container = service.validation_task_container.as_deref().unwrap_or_default();

    info!(service = %service_name, task_definition, container, "running validation task");
    if monitor.run_and_monitor(task_definition, container, command).await? {
        Err(StepFailure::TaskFailed)
    } else {
        Ok(())
    }
}
