//! # kyc CLI entry point
//!
//! Parses arguments, installs the tracing subscriber, loads the engine
//! configuration and dispatches to the subcommand handlers.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use kyc_cli::config::{run_config, ConfigArgs};
use kyc_cli::flow::{run_flow, FlowArgs};
use kyc_cli::score::{run_score, ScoreArgs};
use kyc_cli::simulate::{run_simulate, SimulateArgs};

/// KYC verification engine CLI.
///
/// Inspects scoring and flow selection under a given configuration and
/// replays verification scenarios against static collaborators.
#[derive(Parser, Debug)]
#[command(name = "kyc", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    /// Engine configuration file. Defaults to `KYC_CONFIG_PATH`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Aggregate component scores and report the decision band.
    Score(ScoreArgs),

    /// Select a verification flow from a trust score or device context.
    Flow(FlowArgs),

    /// Run a scenario file through the orchestrator.
    Simulate(SimulateArgs),

    /// Validate or print the engine configuration.
    Config(ConfigArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let config = match kyc_cli::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{e:#}");
            return ExitCode::from(2);
        }
    };

    let result = match cli.command {
        Commands::Score(args) => run_score(&args, &config),
        Commands::Flow(args) => run_flow(&args, &config),
        Commands::Simulate(args) => run_simulate(&args, &config),
        Commands::Config(args) => run_config(&args, &config),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}
