use std::path::{Path, PathBuf};

use crate::consts::{BUILD_DIR_NAME, BUILD_HOME_ENV};
use crate::state::StateStore;
use crate::toolchain::BuildMode;

/// Returns the root of all build state and outputs for a project.
///
/// `FLBUILD_HOME` overrides the default `<project>/.fl-build`.
pub fn build_root(project: &Path) -> PathBuf {
  match std::env::var_os(BUILD_HOME_ENV) {
    Some(home) if !home.is_empty() => PathBuf::from(home),
    _ => project.join(BUILD_DIR_NAME),
  }
}

/// Returns the directory holding one build mode's state and outputs.
pub fn mode_dir(project: &Path, mode: BuildMode) -> PathBuf {
  build_root(project).join(mode.as_str())
}

/// Returns the state store for a project and build mode.
pub fn state_store(project: &Path, mode: BuildMode) -> StateStore {
  StateStore::new(mode_dir(project, mode))
}
