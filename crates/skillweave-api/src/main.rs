//! Skillweave CLI entry point.
//!
//! Binary name: `skw`
//!
//! Parses CLI arguments, loads configuration and skill manifests, then
//! dispatches to the appropriate command handler.

mod cli;
mod state;

use clap::Parser;

use skillweave_observe::{LogFormat, init_tracing, shutdown_tracing};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let format = if cli.log_json { LogFormat::Json } else { LogFormat::Pretty };
    init_tracing(cli::log_filter(cli.verbose, cli.quiet), format, cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let state = AppState::init(cli.config.as_deref(), cli.command.needs_generator()).await?;

    match cli.command {
        Commands::Skills => cli::skill::list_skills(&state, cli.json)?,

        Commands::Detect { request } => cli::skill::detect(&state, &request, cli.json)?,

        Commands::Run { request, input, chain } => {
            if chain {
                cli::workflow::run_chain_workflow(&state, &request, cli.json).await?;
            } else {
                cli::skill::run(&state, &request, input.as_deref(), cli.json).await?;
            }
        }

        Commands::Workflow { file, check } => {
            cli::workflow::run_workflow_file(&state, &file, check, cli.json).await?;
        }
    }

    Ok(())
}
