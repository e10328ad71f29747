//! rollgate — canary releases across a canary and a primary pool.
//!
//! # Usage
//!
//! ```text
//! rollgate check --config rollgate.toml
//! rollgate plan --service checkout --task-def checkout:42
//! rollgate deploy --service checkout --task-def checkout:42 --count 4
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "rollgate",
    about = "rollgate — gated canary releases with automatic rollback",
    version,
    propagate_version = true
)]
struct Cli {
    /// Log output format.
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate a config file, then summarise it.
    Check {
        #[arg(short, long, default_value = "rollgate.toml")]
        config: PathBuf,
    },
    /// Show the steps a deploy would run and what each update deploys.
    Plan {
        #[arg(short, long, default_value = "rollgate.toml")]
        config: PathBuf,
        #[arg(short, long)]
        service: String,
        #[arg(short, long, default_value = "default")]
        workflow: String,
        /// Task definition deployed by update steps.
        #[arg(short, long)]
        task_def: String,
        /// Replica count deployed by update steps.
        #[arg(long, default_value = "2")]
        count: u32,
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Run a workflow. Any failing step rolls the service back.
    ///
    /// Uses the simulated fleet backend seeded from the service's
    /// [services.NAME.simulation] table.
    Deploy {
        #[arg(short, long, default_value = "rollgate.toml")]
        config: PathBuf,
        #[arg(short, long)]
        service: String,
        #[arg(short, long, default_value = "default")]
        workflow: String,
        #[arg(short, long)]
        task_def: String,
        #[arg(long, default_value = "2")]
        count: u32,
        /// Skip unrecognized actions instead of failing on them.
        #[arg(long)]
        lenient: bool,
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,rollgate=debug"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Commands::Check { config } => commands::check::check(&config),
        Commands::Plan {
            config,
            service,
            workflow,
            task_def,
            count,
            format,
        } => commands::plan::plan(&config, &service, &workflow, &task_def, count, format),
        Commands::Deploy {
            config,
            service,
            workflow,
            task_def,
            count,
            lenient,
            format,
        } => {
            commands::deploy::deploy(commands::deploy::DeployArgs {
                config,
                service,
                workflow,
                task_def,
                count,
                lenient,
                format,
            })
            .await
        }
    }
}
