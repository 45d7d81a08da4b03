use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::STATE_VERSION;
use crate::util::hash::ContentHash;

/// Errors reading or writing the persisted build state.
#[derive(Debug, Error)]
pub enum StateError {
  #[error("failed to create state directory: {0}")]
  CreateDir(#[source] io::Error),

  #[error("failed to read state file: {0}")]
  Read(#[source] io::Error),

  #[error("failed to parse state file: {0}")]
  Parse(#[source] serde_json::Error),

  #[error("failed to serialize state: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("failed to write state file: {0}")]
  Write(#[source] io::Error),

  #[error("unsupported state file version: {0}")]
  UnsupportedVersion(u32),
}

/// What was observed about an input file when a target last built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStamp {
  /// Modification time, when the filesystem reports one.
  pub modified: Option<SystemTime>,
  pub size: u64,
  /// Content hash; authoritative over `modified`.
  pub hash: ContentHash,
}

/// A compiled object and the compile key it was produced under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRecord {
  pub key: ContentHash,
  pub object: PathBuf,
}

/// Fingerprint record of the last successful build of one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRecord {
  /// Fingerprint of the declaration (kind, sources, headers, deps).
  pub declaration: ContentHash,

  /// Own sources plus the whole header invalidation set.
  #[serde(default)]
  pub inputs: BTreeMap<PathBuf, FileStamp>,

  /// Per-source objects, keyed by source path.
  #[serde(default)]
  pub objects: BTreeMap<PathBuf, ObjectRecord>,

  /// Library archive or executable. `None` for header-only libraries.
  #[serde(default)]
  pub artifact: Option<PathBuf>,

  /// `built_at` of each direct dependency when this target was built.
  #[serde(default)]
  pub dependencies: BTreeMap<String, SystemTime>,

  pub built_at: SystemTime,
}

/// Persisted per-target fingerprints, keyed by qualified name.
///
/// Entries for targets that are no longer declared are carried along
/// untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildState {
  pub version: u32,
  #[serde(default)]
  pub targets: BTreeMap<String, TargetRecord>,
}

impl Default for BuildState {
  fn default() -> Self {
    Self::new()
  }
}

impl BuildState {
  pub fn new() -> Self {
    Self {
      version: STATE_VERSION,
      targets: BTreeMap::new(),
    }
  }

  pub fn get(&self, name: &str) -> Option<&TargetRecord> {
    self.targets.get(name)
  }

  /// Record a successful build of `name`, replacing any previous record.
  pub fn record(&mut self, name: impl Into<String>, record: TargetRecord) {
    self.targets.insert(name.into(), record);
  }

  pub fn len(&self) -> usize {
    self.targets.len()
  }

  pub fn is_empty(&self) -> bool {
    self.targets.is_empty()
  }
}
