//! End-to-end workflow runs against the simulated fleet.
//!
//! Config is parsed from TOML, clients are built through the registry
//! factory, and workflows are resolved from the config the way the CLI
//! does it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rollgate_core::{Config, DesiredState, PoolId, Weights};
use rollgate_release::simulate::{FleetCall, FleetOp, RolloutBehavior};
use rollgate_release::{ManualClock, ReleaseApi, ReleaseError, ReleaseRegistry, SimulatedFleet};
use rollgate_workflow::{ExecutionMode, Orchestrator, StepFailure, ValidationGate, WorkflowError};

const CONFIG: &str = r#"
cluster-arn = "arn:aws:ecs:us-east-1:123456789012:cluster/main"
region = "us-east-1"

[polling]
deploy-interval = "15s"

[services.checkout]
listener-rule-arn = "arn:aws:elasticloadbalancing:us-east-1:123456789012:listener-rule/app/main/1/2/3"
deploy-timeout = "5m"
validation-task = "checkout-smoke:3"
validation-task-container = "smoke"
canary = { tg-arn = "arn:aws:elasticloadbalancing:us-east-1:123456789012:targetgroup/checkout-canary/1", ecs-service = "checkout-canary" }
primary = { tg-arn = "arn:aws:elasticloadbalancing:us-east-1:123456789012:targetgroup/checkout/2", ecs-service = "checkout" }

[services.checkout.simulation]
canary-task = "checkout:41"
canary-count = 0
primary-task = "checkout:41"
primary-count = 4
validation-exit-code = 7

[[workflows.gated]]
action = "validate"
target = "task"
command = ["./smoke", "--critical"]

[[workflows.gated]]
action = "shift"
target = "primary"
ratio = 100

[[workflows.gated]]
action = "update"
target = "canary"
count = 1

[[workflows.canary]]
action = "update"
target = "canary"
count = 1

[[workflows.canary]]
action = "shift"
target = "canary"
ratio = 10

[[workflows.canary]]
action = "validate"
target = "prompt"

[[workflows.canary]]
action = "update"
target = "primary"

[[workflows.canary]]
action = "shift"
target = "primary"
ratio = 100

[[workflows.canary]]
action = "update"
target = "canary"
count = 0
task = ""

[[workflows.future]]
action = "shift"
target = "canary"
ratio = 25

[[workflows.future]]
action = "bake"
target = "canary"
"#;

struct Setup {
    config: Arc<Config>,
    clock: Arc<ManualClock>,
    fleet: Arc<SimulatedFleet>,
    registry: Arc<ReleaseRegistry>,
}

fn setup() -> Setup {
    let config = Config::from_toml_str(CONFIG).unwrap();
    let clock = Arc::new(ManualClock::new(1_700_000_000));
    let fleets: Mutex<HashMap<String, Arc<SimulatedFleet>>> = Mutex::new(HashMap::new());

    let registry = ReleaseRegistry::from_config(&config, |name, service, _region| {
        let sim = service
            .simulation
            .as_ref()
            .ok_or_else(|| ReleaseError::NotFound(format!("simulation for {name}")))?;
        let fleet = Arc::new(SimulatedFleet::from_config(service, sim, clock.clone()));
        fleets.lock().unwrap().insert(name.to_string(), fleet.clone());
        let client: Arc<dyn ReleaseApi> = fleet;
        Ok(client)
    })
    .unwrap();

    let fleet = fleets.lock().unwrap()["checkout"].clone();
    Setup {
        config: Arc::new(config),
        clock,
        fleet,
        registry: Arc::new(registry),
    }
}

fn orchestrator(setup: &Setup, input: &'static str, mode: ExecutionMode) -> Orchestrator {
    Orchestrator::new(
        setup.registry.clone(),
        setup.config.clone(),
        setup.clock.clone(),
    )
    .with_mode(mode)
    .with_gate(ValidationGate::new(input.as_bytes()))
}

#[tokio::test]
async fn failed_validation_task_rolls_back_once_and_stops() {
    let setup = setup();
    let workflow = setup
        .config
        .resolve("checkout", "gated", DesiredState::new("checkout:42", 2))
        .unwrap();

    let err = orchestrator(&setup, "", ExecutionMode::Strict)
        .process_workflow(&workflow)
        .await
        .unwrap_err();

    match &err {
        WorkflowError::Validation { target, cause } => {
            assert_eq!(target, "task");
            assert_eq!(cause, &StepFailure::TaskFailed);
        }
        other => panic!("expected validation failure, got {other:?}"),
    }
    assert!(err.to_string().contains("validation 'task' failed"));

    let fleet = &setup.fleet;
    assert_eq!(
        fleet.last_task_launch(),
        Some((
            "checkout-smoke:3".to_string(),
            "smoke".to_string(),
            vec!["./smoke".to_string(), "--critical".to_string()],
        ))
    );

    // The only rule write is the rollback restoring the checkpoint, so the
    // shift to primary never ran.
    let rule_writes: Vec<_> = fleet
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            FleetCall::ModifyRule(actions) => Some(actions),
            _ => None,
        })
        .collect();
    assert_eq!(rule_writes.len(), 1);

    // The canary update never ran: the only pool writes are the rollback's
    // two redeploys, canary first.
    let pool_writes: Vec<_> = fleet
        .calls()
        .into_iter()
        .filter(|c| c.op() == FleetOp::UpdateDesiredState)
        .collect();
    assert_eq!(
        pool_writes,
        vec![
            FleetCall::UpdateDesiredState(PoolId::Canary, DesiredState::new("checkout:41", 0)),
            FleetCall::UpdateDesiredState(PoolId::Primary, DesiredState::new("checkout:41", 4)),
        ]
    );

    assert_eq!(fleet.weights(), Weights::new(0, 100));
}

#[tokio::test]
async fn confirmed_canary_release_promotes_new_revision() {
    let setup = setup();
    let workflow = setup
        .config
        .resolve("checkout", "canary", DesiredState::new("checkout:42", 4))
        .unwrap();
    let mut orchestrator = orchestrator(&setup, "Y\n", ExecutionMode::Strict);

    let summary = orchestrator.run(&workflow).await.unwrap();

    assert_eq!(summary.total_steps, 6);
    assert_eq!(summary.executed, 6);
    assert_eq!(summary.checkpoint.weights, Weights::new(0, 100));
    assert_eq!(
        summary.checkpoint.canary,
        DesiredState::new("checkout:41", 0)
    );

    let fleet = &setup.fleet;
    assert_eq!(fleet.weights(), Weights::new(0, 100));
    assert_eq!(
        fleet.desired_state(PoolId::Primary),
        DesiredState::new("checkout:42", 4)
    );
    // Zero count and empty task never override the default.
    assert_eq!(
        fleet.desired_state(PoolId::Canary),
        DesiredState::new("checkout:42", 4)
    );
}

#[tokio::test]
async fn declined_prompt_restores_checkpoint() {
    let setup = setup();
    let workflow = setup
        .config
        .resolve("checkout", "canary", DesiredState::new("checkout:42", 4))
        .unwrap();
    let mut orchestrator = orchestrator(&setup, "no\n", ExecutionMode::Strict);

    let err = orchestrator.process_workflow(&workflow).await.unwrap_err();

    assert_eq!(err.step_failure(), Some(&StepFailure::Declined));
    let checkpoint = orchestrator.last_checkpoint().unwrap().clone();
    assert_eq!(setup.fleet.weights(), checkpoint.weights);
    assert_eq!(setup.fleet.desired_state(PoolId::Canary), checkpoint.canary);
    assert_eq!(setup.fleet.desired_state(PoolId::Primary), checkpoint.primary);
}

#[tokio::test]
async fn primary_timeout_uses_configured_interval_and_timeout() {
    let setup = setup();
    setup.fleet.set_rollout(PoolId::Primary, RolloutBehavior::Stuck);
    let workflow = setup
        .config
        .resolve("checkout", "canary", DesiredState::new("checkout:42", 4))
        .unwrap();
    let mut orchestrator = orchestrator(&setup, "y\n", ExecutionMode::Strict);

    let err = orchestrator.process_workflow(&workflow).await.unwrap_err();

    assert!(matches!(
        err,
        WorkflowError::UpdatePool {
            pool: PoolId::Primary,
            cause: StepFailure::TimedOut { .. }
        }
    ));
    let sleeps = setup.clock.sleeps();
    assert!(sleeps.iter().all(|d| d.as_secs() == 15));
    // 5m timeout at 15s per poll, once for the step and once for the
    // rollback redeploy of primary.
    assert_eq!(sleeps.len(), 2 * 21);
    assert_eq!(setup.fleet.weights(), Weights::new(0, 100));
}

#[tokio::test]
async fn unknown_action_depends_on_execution_mode() {
    let setup = setup();
    let workflow = setup
        .config
        .resolve("checkout", "future", DesiredState::new("checkout:42", 4))
        .unwrap();

    let err = orchestrator(&setup, "", ExecutionMode::Strict)
        .process_workflow(&workflow)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::UnrecognizedAction(ref tag) if tag == "bake"));
    assert_eq!(setup.fleet.weights(), Weights::new(0, 100));

    let summary = orchestrator(&setup, "", ExecutionMode::Lenient)
        .run(&workflow)
        .await
        .unwrap();
    assert_eq!((summary.executed, summary.skipped), (1, 1));
    assert_eq!(setup.fleet.weights(), Weights::new(25, 75));
}
