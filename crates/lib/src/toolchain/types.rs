use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rule::TargetKind;
use crate::util::hash::hash_bytes;

/// Compilation profile. Each mode keeps separate state and outputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
  /// Debug info with runtime checks enabled.
  #[default]
  Check,
  Debug,
  /// Optimized, checks compiled out.
  Fast,
  /// Optimized with profiling instrumentation.
  Profile,
}

impl BuildMode {
  pub const ALL: [BuildMode; 4] = [BuildMode::Check, BuildMode::Debug, BuildMode::Fast, BuildMode::Profile];

  pub fn as_str(&self) -> &'static str {
    match self {
      BuildMode::Check => "check",
      BuildMode::Debug => "debug",
      BuildMode::Fast => "fast",
      BuildMode::Profile => "profile",
    }
  }
}

impl fmt::Display for BuildMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for BuildMode {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    BuildMode::ALL
      .into_iter()
      .find(|mode| mode.as_str().eq_ignore_ascii_case(s))
      .ok_or_else(|| format!("unknown build mode '{}' (expected check, debug, fast or profile)", s))
  }
}

/// One source to compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileRequest {
  /// Qualified name of the owning target.
  pub target: String,
  pub source: PathBuf,
  pub include_paths: Vec<PathBuf>,
  pub mode: BuildMode,
}

impl CompileRequest {
  /// Object file name for this source, `<stem>-<hash of source path>.o`.
  ///
  /// Depends only on the source path, so a reused object can never be
  /// overwritten by another source of the same target.
  pub fn object_name(&self) -> String {
    let stem = self
      .source
      .file_stem()
      .map(|s| s.to_string_lossy().into_owned())
      .unwrap_or_else(|| "source".to_string());
    let tag = hash_bytes(self.source.to_string_lossy().as_bytes());
    format!("{}-{}.o", stem, tag.short())
  }
}

/// One artifact to produce from compiled objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRequest {
  pub target: String,
  pub kind: TargetKind,
  pub objects: Vec<PathBuf>,
  /// Library artifacts of the dependency closure, dependencies first.
  /// Always empty for libraries.
  pub libraries: Vec<PathBuf>,
  pub mode: BuildMode,
}

/// Toolchain output explaining a failed step.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct Diagnostic {
  pub message: String,
  pub exit_code: Option<i32>,
}

impl Diagnostic {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
      exit_code: None,
    }
  }

  pub fn with_exit_code(mut self, code: Option<i32>) -> Self {
    self.exit_code = code;
    self
  }
}
