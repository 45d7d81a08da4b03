//! Build state storage.
//!
//! # Storage Layout
//!
//! ```text
//! {build_root}/{mode}/
//! ├── .lock           # advisory lock, held for one build
//! ├── state.json      # BuildState
//! └── out/            # artifacts written by the process toolchain
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::consts::{OUT_DIR_NAME, STATE_FILENAME, STATE_VERSION};

use super::lock::{LockMode, StoreLock, StoreLockError};
use super::types::{BuildState, StateError};

/// Reads and writes the build state for one build mode.
#[derive(Debug, Clone)]
pub struct StateStore {
  dir: PathBuf,
}

impl StateStore {
  /// Create a store rooted at `dir`. Nothing is touched on disk until the
  /// first save or lock.
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into() }
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  pub fn state_path(&self) -> PathBuf {
    self.dir.join(STATE_FILENAME)
  }

  /// Directory for toolchain outputs belonging to this store.
  pub fn out_dir(&self) -> PathBuf {
    self.dir.join(OUT_DIR_NAME)
  }

  fn ensure_dir(&self) -> Result<(), StateError> {
    fs::create_dir_all(&self.dir).map_err(StateError::CreateDir)
  }

  /// Load the build state.
  ///
  /// Returns an empty state if the file doesn't exist (first build).
  pub fn load(&self) -> Result<BuildState, StateError> {
    let path = self.state_path();

    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        debug!(path = %path.display(), "no build state, starting fresh");
        return Ok(BuildState::new());
      }
      Err(e) => return Err(StateError::Read(e)),
    };

    let state: BuildState = serde_json::from_str(&content).map_err(StateError::Parse)?;

    if state.version != STATE_VERSION {
      return Err(StateError::UnsupportedVersion(state.version));
    }

    debug!(path = %path.display(), targets = state.len(), "loaded build state");
    Ok(state)
  }

  /// Save the build state.
  ///
  /// Uses atomic write (write to temp, then rename) to prevent corruption.
  pub fn save(&self, state: &BuildState) -> Result<(), StateError> {
    self.ensure_dir()?;

    let path = self.state_path();
    let temp_path = self.dir.join(format!("{}.tmp", STATE_FILENAME));

    let content = serde_json::to_string_pretty(state).map_err(StateError::Serialize)?;
    fs::write(&temp_path, &content).map_err(StateError::Write)?;
    fs::rename(&temp_path, &path).map_err(StateError::Write)?;

    debug!(path = %path.display(), targets = state.len(), "saved build state");
    Ok(())
  }

  /// Lock this store. Builds hold it exclusively; read-only commands share it.
  pub fn lock(&self, mode: LockMode, command: &str) -> Result<StoreLock, StoreLockError> {
    StoreLock::acquire(&self.dir, mode, command)
  }

  /// Delete the state file and every artifact under this store.
  ///
  /// Returns whether anything was removed.
  pub fn clean(&self) -> Result<bool, StateError> {
    match fs::remove_dir_all(&self.dir) {
      Ok(()) => Ok(true),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
      Err(e) => Err(StateError::Write(e)),
    }
  }
}
