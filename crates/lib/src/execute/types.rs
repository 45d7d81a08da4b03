//! Types for target execution.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::detect::DetectOptions;
use crate::state::ObjectRecord;
use crate::toolchain::{BuildMode, Diagnostic};

/// The step of a target's build that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum BuildStep {
  /// Checking that the target's declared headers exist.
  Headers,
  /// Compiling one source into an object.
  Compile { source: PathBuf },
  /// Archiving a library's objects.
  Archive,
  /// Linking a binary.
  Link,
  /// The worker task itself died.
  Worker,
}

impl fmt::Display for BuildStep {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BuildStep::Headers => write!(f, "header check"),
      BuildStep::Compile { source } => write!(f, "compile {}", source.display()),
      BuildStep::Archive => write!(f, "archive"),
      BuildStep::Link => write!(f, "link"),
      BuildStep::Worker => write!(f, "worker"),
    }
  }
}

/// A compile or link failure of one target.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{target}: {step} failed: {diagnostic}")]
pub struct BuildError {
  pub target: String,
  pub step: BuildStep,
  pub diagnostic: Diagnostic,
}

impl BuildError {
  pub fn new(target: impl Into<String>, step: BuildStep, diagnostic: Diagnostic) -> Self {
    Self {
      target: target.into(),
      step,
      diagnostic,
    }
  }
}

/// What a successful target build produced.
#[derive(Debug, Clone, Default)]
pub struct TargetArtifacts {
  pub objects: BTreeMap<PathBuf, ObjectRecord>,
  /// `None` for header-only libraries.
  pub artifact: Option<PathBuf>,
  pub compiled: usize,
  pub reused: usize,
  pub linked: bool,
}

/// Configuration for a build invocation.
#[derive(Debug, Clone)]
pub struct BuildOptions {
  /// Maximum number of compile/link operations in flight at once.
  pub jobs: usize,

  /// Rebuild every target regardless of change detection.
  pub force: bool,

  /// Keep dispatching targets unaffected by a failure.
  pub keep_going: bool,

  pub mode: BuildMode,

  /// Trust matching modification time and size instead of rehashing.
  pub trust_mtime: bool,
}

impl Default for BuildOptions {
  fn default() -> Self {
    Self {
      jobs: num_cpus(),
      force: false,
      keep_going: false,
      mode: BuildMode::default(),
      trust_mtime: false,
    }
  }
}

impl BuildOptions {
  pub fn detect_options(&self) -> DetectOptions {
    DetectOptions {
      force: self.force,
      trust_mtime: self.trust_mtime,
    }
  }
}

/// Get the number of CPUs for default parallelism.
fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn build_options_default() {
    let options = BuildOptions::default();
    assert!(options.jobs >= 1);
    assert!(!options.force);
    assert!(!options.keep_going);
    assert_eq!(options.mode, BuildMode::Check);
  }

  #[test]
  fn build_error_display() {
    let err = BuildError::new(
      "fastlib/col:col",
      BuildStep::Compile {
        source: PathBuf::from("col/heap.cc"),
      },
      Diagnostic::new("heap.cc:10: error: 'T' was not declared"),
    );
    assert_eq!(
      err.to_string(),
      "fastlib/col:col: compile col/heap.cc failed: heap.cc:10: error: 'T' was not declared"
    );
    assert_eq!(BuildStep::Link.to_string(), "link");
    assert_eq!(BuildStep::Headers.to_string(), "header check");
  }
}
