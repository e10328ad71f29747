use std::path::Path;

use anyhow::Context;
use rollgate_core::{Action, Config, PoolId};

pub fn check(path: &Path) -> anyhow::Result<()> {
    let config = Config::from_file(path)
        .with_context(|| format!("invalid config {}", path.display()))?;

    println!("✓ {} is valid", path.display());
    print!("{}", summarize(&config));
    Ok(())
}

/// Human-readable overview of services and workflows.
pub fn summarize(config: &Config) -> String {
    let mut out = String::new();

    out.push_str(&format!("services ({}):\n", config.services.len()));
    for (name, service) in &config.services {
        out.push_str(&format!(
            "  {name}: region={} cluster={} timeout={}\n",
            or_unset(config.region_for(name)),
            or_unset(config.cluster_for(name)),
            service.deploy_timeout
        ));
        for pool in PoolId::ALL {
            out.push_str(&format!(
                "    {pool}: {} -> {}\n",
                service.ecs_service(pool),
                service.target_group(pool)
            ));
        }
        out.push_str(&format!(
            "    validation task: {}\n",
            service.validation_task.as_deref().unwrap_or("none")
        ));
    }

    out.push_str(&format!("workflows ({}):\n", config.workflows.len()));
    for (name, steps) in &config.workflows {
        out.push_str(&format!("  {name}: {} steps\n", steps.len()));
        for (i, step) in steps.iter().enumerate() {
            let marker = match step {
                Action::Unrecognized { .. } => "  ⚠ fails unless --lenient",
                _ => "",
            };
            out.push_str(&format!("    {}. {step}{marker}\n", i + 1));
        }
    }
    out
}

fn or_unset(value: &str) -> &str {
    if value.is_empty() { "<unset>" } else { value }
}
