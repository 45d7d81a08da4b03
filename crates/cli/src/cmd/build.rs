//! Implementation of the `fl-build build` command.

use std::num::NonZeroUsize;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use flbuild_lib::platform::paths::state_store;
use flbuild_lib::{BuildOptions, CommandToolchain, run};

use super::RuleArgs;
use crate::output::{OutputFormat, print_error, print_json, print_report};

#[derive(Debug, Args)]
pub struct BuildArgs {
  #[command(flatten)]
  pub rules: RuleArgs,

  /// Maximum number of compile/link operations at once [default: available parallelism]
  #[arg(short, long)]
  pub jobs: Option<NonZeroUsize>,

  /// Rebuild every target regardless of what changed
  #[arg(long)]
  pub force: bool,

  /// Keep building targets unaffected by a failure
  #[arg(short, long)]
  pub keep_going: bool,

  /// Skip rehashing inputs whose modification time and size are unchanged
  #[arg(long)]
  pub trust_mtime: bool,

  /// Compiler to invoke
  #[arg(long, env = "CC", default_value = "cc")]
  pub cc: String,

  /// Archiver to invoke
  #[arg(long, env = "AR", default_value = "ar")]
  pub ar: String,

  #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
  pub format: OutputFormat,
}

impl BuildArgs {
  fn options(&self) -> BuildOptions {
    let mut options = BuildOptions {
      force: self.force,
      keep_going: self.keep_going,
      mode: self.rules.mode,
      trust_mtime: self.trust_mtime,
      ..BuildOptions::default()
    };
    if let Some(jobs) = self.jobs {
      options.jobs = jobs.get();
    }
    options
  }
}

pub fn cmd_build(args: &BuildArgs, verbose: bool) -> Result<ExitCode> {
  let project = args.rules.load()?;
  let options = args.options();
  let store = state_store(&project.dir, options.mode);

  let toolchain = CommandToolchain::new(store.out_dir())
    .with_cc(&args.cc)
    .with_ar(&args.ar);

  info!(
    roots = project.roots.len(),
    jobs = options.jobs,
    mode = %options.mode,
    state = %store.dir().display(),
    "starting build"
  );

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let report = rt
    .block_on(run(&store, &project.registry, &project.roots, Arc::new(toolchain), &options))
    .context("Build aborted")?;

  if args.format.is_json() {
    print_json(&report)?;
  } else {
    print_report(&report, verbose);
  }

  if report.is_success() {
    Ok(ExitCode::SUCCESS)
  } else {
    if !args.format.is_json() {
      print_error("Build failed");
    }
    Ok(ExitCode::FAILURE)
  }
}
