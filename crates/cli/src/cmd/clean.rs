//! Implementation of the `fl-build clean` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use flbuild_lib::BuildMode;
use flbuild_lib::consts::APP_NAME;
use flbuild_lib::platform::paths::state_store;
use flbuild_lib::state::LockMode;

use crate::output::{print_info, print_success};

#[derive(Debug, Args)]
pub struct CleanArgs {
  /// Project directory holding the build state
  #[arg(default_value = ".")]
  pub project: PathBuf,

  /// Only clean this build mode; every mode when omitted
  #[arg(short, long)]
  pub mode: Option<BuildMode>,
}

pub fn cmd_clean(args: &CleanArgs) -> Result<()> {
  let project = dunce::canonicalize(&args.project)
    .with_context(|| format!("Failed to locate project directory: {}", args.project.display()))?;

  let modes = match args.mode {
    Some(mode) => vec![mode],
    None => BuildMode::ALL.to_vec(),
  };

  let mut removed = 0;
  for mode in modes {
    let store = state_store(&project, mode);
    if !store.dir().exists() {
      continue;
    }

    // Fail while another build holds the store.
    {
      let _lock = store
        .lock(LockMode::Exclusive, &format!("{} clean", APP_NAME))
        .with_context(|| format!("Failed to lock build state for mode {}", mode))?;
    }

    if store
      .clean()
      .with_context(|| format!("Failed to remove {}", store.dir().display()))?
    {
      print_success(&format!("Removed {} build state: {}", mode, store.dir().display()));
      removed += 1;
    }
  }

  if removed == 0 {
    print_info("Nothing to clean");
  }

  Ok(())
}
