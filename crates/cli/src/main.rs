use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cmd;
mod output;

use cmd::{BuildArgs, CleanArgs, PlanArgs};

/// fl-build - incremental build orchestration for C/C++ targets
#[derive(Parser)]
#[command(name = "fl-build")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build the requested targets and everything they depend on
  Build(BuildArgs),

  /// Show what a build would do without running the toolchain
  Plan(PlanArgs),

  /// Delete build state and outputs
  Clean(CleanArgs),
}

fn main() -> Result<ExitCode> {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match cli.command {
    Commands::Build(args) => cmd::cmd_build(&args, cli.verbose),
    Commands::Plan(args) => cmd::cmd_plan(&args).map(|()| ExitCode::SUCCESS),
    Commands::Clean(args) => cmd::cmd_clean(&args).map(|()| ExitCode::SUCCESS),
  }
}
