use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use rollgate_core::{Config, DesiredState, ServiceConfig};
use rollgate_release::{
    Clock, ReleaseApi, ReleaseError, ReleaseRegistry, ReleaseResult, SimulatedFleet, SystemClock,
};
use rollgate_workflow::{ExecutionMode, Orchestrator, RunSummary};

use crate::OutputFormat;

pub struct DeployArgs {
    pub config: PathBuf,
    pub service: String,
    pub workflow: String,
    pub task_def: String,
    pub count: u32,
    pub lenient: bool,
    pub format: OutputFormat,
}

pub async fn deploy(args: DeployArgs) -> anyhow::Result<()> {
    let config = Config::from_file(&args.config)
        .with_context(|| format!("invalid config {}", args.config.display()))?;
    let workflow = config.resolve(
        &args.service,
        &args.workflow,
        DesiredState::new(&args.task_def, args.count),
    )?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let registry = ReleaseRegistry::from_config(&config, |name, service, region| {
        simulated_client(name, service, region, clock.clone())
    })?;

    let mode = if args.lenient {
        ExecutionMode::Lenient
    } else {
        ExecutionMode::Strict
    };
    info!(service = %args.service, workflow = %args.workflow, ?mode, "starting release");

    let mut orchestrator = Orchestrator::new(Arc::new(registry), Arc::new(config), clock).with_mode(mode);
    let summary = orchestrator
        .run(&workflow)
        .await
        .with_context(|| format!("release of {} failed and was rolled back", args.service))?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Text => println!("{}", report(&summary)),
    }
    Ok(())
}

fn simulated_client(
    name: &str,
    service: &ServiceConfig,
    region: &str,
    clock: Arc<dyn Clock>,
) -> ReleaseResult<Arc<dyn ReleaseApi>> {
    let sim = service.simulation.as_ref().ok_or_else(|| {
        ReleaseError::NotFound(format!("[services.{name}.simulation] table"))
    })?;
    info!(service = %name, region, "using simulated fleet backend");
    Ok(Arc::new(SimulatedFleet::from_config(service, sim, clock)))
}

pub fn report(summary: &RunSummary) -> String {
    let mut line = format!(
        "✓ {} released: {}/{} steps executed",
        summary.service, summary.executed, summary.total_steps
    );
    if summary.skipped > 0 {
        line.push_str(&format!(", {} skipped", summary.skipped));
    }
    line
}
