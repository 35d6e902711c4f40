//! flowforge CLI - validate and run ML workflow graphs.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

/// flowforge: workflow graph validator and execution engine.
#[derive(Debug, Parser)]
#[command(name = "flowforge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output (can be repeated: -v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Configuration file path.
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Validate a workflow graph JSON file.
    #[command(visible_alias = "v")]
    Validate(commands::ValidateArgs),

    /// Submit and execute a workflow graph.
    #[command(visible_alias = "r")]
    Run(commands::RunArgs),

    /// List persisted jobs.
    Jobs(commands::JobsArgs),

    /// Show version information.
    Version,
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Command::Validate(args) => commands::validate::execute(args),
        Command::Run(args) => commands::run::execute(args, cli.config.as_deref()),
        Command::Jobs(args) => commands::jobs::execute(args, cli.config.as_deref()),
        Command::Version => {
            print_version();
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Print version information.
fn print_version() {
    println!("flowforge {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Target: {}", std::env::consts::ARCH);
    println!("OS: {}", std::env::consts::OS);
}
