//! CLI command definitions and dispatch for the `skw` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod skill;
pub mod workflow;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Detect, run, and orchestrate skills.
#[derive(Parser)]
#[command(name = "skw", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to config.toml (defaults to the data directory).
    #[arg(long, global = true, env = "SKILLWEAVE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Write logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true, hide = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List registered skills.
    #[command(alias = "ls")]
    Skills,

    /// Rank skills against a request without running anything.
    Detect {
        /// Free-text request.
        request: String,
    },

    /// Dispatch a request to the best skill (or a chain of skills).
    Run {
        /// Free-text request.
        request: String,

        /// Structured input as a JSON object.
        #[arg(long)]
        input: Option<String>,

        /// Run the detected skill chain as a tracked workflow.
        #[arg(long, conflicts_with = "input")]
        chain: bool,
    },

    /// Create and execute a workflow from a YAML definition file.
    Workflow {
        /// Path to the workflow YAML file.
        file: PathBuf,

        /// Validate the file and report unknown skills without running it.
        #[arg(long)]
        check: bool,
    },
}

impl Commands {
    /// Whether the command calls the text generation service.
    pub fn needs_generator(&self) -> bool {
        match self {
            Commands::Skills | Commands::Detect { .. } => false,
            Commands::Run { .. } => true,
            Commands::Workflow { check, .. } => !check,
        }
    }
}

/// Map `-v` counts to a default log filter.
pub fn log_filter(verbose: u8, quiet: bool) -> &'static str {
    match verbose {
        0 if quiet => "error",
        0 => "warn",
        1 => "info,skillweave=debug",
        _ => "trace",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["skw", "detect", "make a quiz", "--json", "-vv"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Detect { ref request } if request == "make a quiz"));
    }

    #[test]
    fn workflow_check_does_not_need_generator() {
        let cli = Cli::try_parse_from(["skw", "workflow", "game.yaml", "--check"]).unwrap();
        assert!(!cli.command.needs_generator());

        let cli = Cli::try_parse_from(["skw", "run", "tell a story", "--input", "{}"]).unwrap();
        assert!(cli.command.needs_generator());
    }

    #[test]
    fn verbosity_maps_to_filters() {
        assert_eq!(log_filter(0, true), "error");
        assert_eq!(log_filter(0, false), "warn");
        assert_eq!(log_filter(1, false), "info,skillweave=debug");
        assert_eq!(log_filter(3, false), "trace");
    }

    #[test]
    fn cli_definition_is_consistent() {
        <Cli as clap::CommandFactory>::command().debug_assert();
    }
}
