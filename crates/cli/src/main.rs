mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing::debug;

use crate::cli::{CliArgs, Command};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    microq_core::config::load_dotenv();
    let args = CliArgs::parse();
    debug!(command = ?args.command, "Starting");
    let config = args.config.as_deref();

    match args.command {
        Command::Qsmrjobs(jobs) => commands::qsmrjobs(config, jobs).await,
        Command::Qsmrprojects(project) => commands::qsmrprojects(config, project).await,
        Command::DeleteClaims {
            project,
            force,
            workers,
        } => commands::delete_claims(config, &project, force, workers).await,
        Command::DeleteProject { project } => commands::delete_project(config, &project).await,
        Command::AddProductionJobs => commands::add_production_jobs(config).await,
    }
}
