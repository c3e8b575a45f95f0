//! Binary entry point for the cftest CLI.

use std::io;
use std::process;

use clap::Parser;
use thiserror::Error;
use tracing::{error, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cftest::{
    CloudFormationBackend, CloudFormationError, ConfigError, Connector, ProcessCommandRunner,
    RunConfig, RunError, RunOrchestrator, SshConfig,
};

#[derive(Debug, Parser)]
#[command(
    name = "cftest",
    about = "Deploy a DC/OS CloudFormation stack and run the integration suite against it",
    arg_required_else_help = true
)]
enum Cli {
    #[command(
        name = "run",
        about = "Provision (or attach), run the remote suite, and clean up on success"
    )]
    Run,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Run(#[from] RunError<CloudFormationError>),
}

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            error!("{err}");
            1
        }
    };

    process::exit(exit_code);
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

async fn dispatch(cli: Cli) -> Result<i32, CliError> {
    match cli {
        Cli::Run => run_command().await,
    }
}

async fn run_command() -> Result<i32, CliError> {
    let config = RunConfig::from_env()?;

    let backend = CloudFormationBackend::new(config.aws_region.clone());
    let ssh_config = SshConfig::new(config.ssh_user.clone(), config.ssh_key_path.clone());
    let connector = Connector::new(ssh_config, ProcessCommandRunner);
    let orchestrator = RunOrchestrator::new(backend, connector);

    let outcome = orchestrator.execute(&config).await?;
    if config.ci_mode() && !outcome.result.passed() {
        warn!(
            status = outcome.result.status,
            "CI flags set; reporting success despite the test failure"
        );
    }
    Ok(outcome.exit_code(config.ci_mode()))
}
