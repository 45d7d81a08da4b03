//! Implementation of the `fl-build plan` command.
//!
//! Resolves the requested targets against the saved build state and prints
//! the batches a build would run, with the reason each stale target would be
//! rebuilt. The toolchain is never invoked.

use anyhow::{Context, Result};
use clap::Args;

use flbuild_lib::consts::APP_NAME;
use flbuild_lib::platform::paths::state_store;
use flbuild_lib::state::LockMode;
use flbuild_lib::{BuildOptions, plan};

use super::RuleArgs;
use crate::output::{OutputFormat, print_json, print_plan};

#[derive(Debug, Args)]
pub struct PlanArgs {
  #[command(flatten)]
  pub rules: RuleArgs,

  /// Plan as if every target had to be rebuilt
  #[arg(long)]
  pub force: bool,

  /// Skip rehashing inputs whose modification time and size are unchanged
  #[arg(long)]
  pub trust_mtime: bool,

  #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
  pub format: OutputFormat,
}

pub fn cmd_plan(args: &PlanArgs) -> Result<()> {
  let project = args.rules.load()?;
  let options = BuildOptions {
    force: args.force,
    mode: args.rules.mode,
    trust_mtime: args.trust_mtime,
    ..BuildOptions::default()
  };

  let store = state_store(&project.dir, options.mode);
  let _lock = store
    .lock(LockMode::Shared, &format!("{} plan", APP_NAME))
    .context("Failed to lock build state")?;
  let state = store.load().context("Failed to load build state")?;

  let plan = plan(&project.registry, &project.roots, &state, &options).context("Invalid build request")?;

  if args.format.is_json() {
    print_json(&plan)?;
  } else {
    print_plan(&plan);
  }

  Ok(())
}
