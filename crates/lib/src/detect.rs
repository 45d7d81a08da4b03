//! Change detection against the persisted build state.
//!
//! Decisions are made in one pass over the resolved graph in dependency
//! order, memoized per target, so a dependent reads its dependencies'
//! results instead of recomputing them.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use petgraph::graph::NodeIndex;
use serde::Serialize;
use tracing::{debug, trace};

use crate::graph::ResolvedGraph;
use crate::state::{BuildState, FileStamp, ObjectRecord, TargetRecord};
use crate::util::hash::{ContentHash, hash_file};

/// Why a target has to be rebuilt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum RebuildReason {
  /// Force-rebuild was requested.
  Forced,
  /// No successful build is on record.
  NeverBuilt,
  /// Kind, sources, headers or dependencies changed.
  DeclarationChanged,
  /// The set of tracked input files differs from the recorded one.
  InputsChanged,
  /// An input file's content changed or it disappeared.
  InputChanged(PathBuf),
  /// The recorded artifact is gone from disk.
  ArtifactMissing,
  /// A direct dependency is being rebuilt.
  DependencyRebuilt(String),
}

impl fmt::Display for RebuildReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RebuildReason::Forced => write!(f, "forced"),
      RebuildReason::NeverBuilt => write!(f, "never built"),
      RebuildReason::DeclarationChanged => write!(f, "declaration changed"),
      RebuildReason::InputsChanged => write!(f, "input set changed"),
      RebuildReason::InputChanged(path) => write!(f, "{} changed", path.display()),
      RebuildReason::ArtifactMissing => write!(f, "artifact missing"),
      RebuildReason::DependencyRebuilt(name) => write!(f, "dependency {} rebuilt", name),
    }
  }
}

/// Knobs for change detection.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetectOptions {
  /// Treat every target as needing a rebuild.
  pub force: bool,
  /// Reuse the recorded hash when modification time and size both match.
  pub trust_mtime: bool,
}

/// Files a target's rebuild decision depends on: its own sources plus its
/// whole header invalidation set.
pub fn target_inputs(graph: &ResolvedGraph, idx: NodeIndex) -> BTreeSet<PathBuf> {
  graph
    .target(idx)
    .sources
    .iter()
    .chain(graph.invalidation_headers(idx).iter())
    .cloned()
    .collect()
}

/// Per-invocation cache of file stamps, so a header shared by many targets
/// is read once.
struct StampCache {
  trust_mtime: bool,
  entries: HashMap<PathBuf, Option<FileStamp>>,
}

impl StampCache {
  fn stamp(&mut self, path: &Path, recorded: Option<&FileStamp>) -> Option<FileStamp> {
    if let Some(entry) = self.entries.get(path) {
      return entry.clone();
    }

    let stamp = self.read(path, recorded);
    self.entries.insert(path.to_path_buf(), stamp.clone());
    stamp
  }

  fn read(&self, path: &Path, recorded: Option<&FileStamp>) -> Option<FileStamp> {
    let metadata = fs::metadata(path).ok()?;
    let modified = metadata.modified().ok();
    let size = metadata.len();

    if self.trust_mtime
      && let Some(recorded) = recorded
      && modified.is_some()
      && recorded.modified == modified
      && recorded.size == size
    {
      trace!(path = %path.display(), "mtime and size unchanged, reusing hash");
      return Some(recorded.clone());
    }

    let hash = hash_file(path).ok()?;
    Some(FileStamp { modified, size, hash })
  }
}

/// Rebuild decisions for every target of a resolved graph.
#[derive(Debug, Clone)]
pub struct ChangeSet {
  reasons: Vec<Option<RebuildReason>>,
  fingerprints: Vec<Option<ContentHash>>,
  stamps: HashMap<PathBuf, FileStamp>,
}

impl ChangeSet {
  /// Decide, for every target in `graph`, whether it needs a rebuild.
  ///
  /// Records in `state` for targets outside the graph are ignored.
  pub fn detect(graph: &ResolvedGraph, state: &BuildState, options: DetectOptions) -> Self {
    let mut cache = StampCache {
      trust_mtime: options.trust_mtime,
      entries: HashMap::new(),
    };
    let mut reasons: Vec<Option<RebuildReason>> = vec![None; graph.len()];
    let mut fingerprints = vec![None; graph.len()];

    for &idx in graph.topological_order() {
      let target = graph.target(idx);
      let record = state.get(&target.name);
      let fingerprint = target.fingerprint().ok();

      // Stamp every input up front; the executor records these on success.
      let inputs = target_inputs(graph, idx);
      let mut changed_input = None;
      for path in &inputs {
        let recorded = record.and_then(|r| r.inputs.get(path));
        let current = cache.stamp(path, recorded);
        let same = matches!((&current, recorded), (Some(c), Some(r)) if c.hash == r.hash);
        if !same && changed_input.is_none() {
          changed_input = Some(path.clone());
        }
      }

      let reason = if options.force {
        Some(RebuildReason::Forced)
      } else if let Some(record) = record {
        if fingerprint.as_ref() != Some(&record.declaration) {
          Some(RebuildReason::DeclarationChanged)
        } else if record.artifact.as_ref().is_some_and(|artifact| !artifact.exists()) {
          Some(RebuildReason::ArtifactMissing)
        } else if !inputs.iter().eq(record.inputs.keys()) {
          Some(RebuildReason::InputsChanged)
        } else if let Some(path) = changed_input {
          Some(RebuildReason::InputChanged(path))
        } else {
          // A dependency rebuilt now, or rebuilt in an earlier run after
          // this target was last built.
          graph
            .dependencies(idx)
            .into_iter()
            .find(|dep| {
              let name = graph.name(*dep);
              reasons[dep.index()].is_some()
                || state.get(name).map(|r| r.built_at) != record.dependencies.get(name).copied()
            })
            .map(|dep| RebuildReason::DependencyRebuilt(graph.name(dep).to_string()))
        }
      } else {
        Some(RebuildReason::NeverBuilt)
      };

      match &reason {
        Some(reason) => debug!(target = %target.name, reason = %reason, "needs rebuild"),
        None => debug!(target = %target.name, "up to date"),
      }

      reasons[idx.index()] = reason;
      fingerprints[idx.index()] = fingerprint;
    }

    let stamps = cache
      .entries
      .into_iter()
      .filter_map(|(path, stamp)| stamp.map(|s| (path, s)))
      .collect();

    Self {
      reasons,
      fingerprints,
      stamps,
    }
  }

  pub fn needs_rebuild(&self, idx: NodeIndex) -> bool {
    self.reasons[idx.index()].is_some()
  }

  pub fn reason(&self, idx: NodeIndex) -> Option<&RebuildReason> {
    self.reasons[idx.index()].as_ref()
  }

  /// Number of targets that need a rebuild.
  pub fn rebuild_count(&self) -> usize {
    self.reasons.iter().filter(|r| r.is_some()).count()
  }

  /// Declaration fingerprint computed during detection.
  pub fn fingerprint(&self, idx: NodeIndex) -> Option<&ContentHash> {
    self.fingerprints[idx.index()].as_ref()
  }

  /// Stamp of an input file as observed during detection. `None` if the
  /// file was missing or unreadable.
  pub fn stamp(&self, path: &Path) -> Option<&FileStamp> {
    self.stamps.get(path)
  }

  /// Fingerprint record for a successful build of `idx`, using the stamps
  /// observed before the build started.
  ///
  /// `state` must already hold the records of every dependency. Returns
  /// `None` when the declaration could not be fingerprinted; such a target
  /// is simply rebuilt next time.
  pub fn record(
    &self,
    graph: &ResolvedGraph,
    idx: NodeIndex,
    state: &BuildState,
    objects: BTreeMap<PathBuf, ObjectRecord>,
    artifact: Option<PathBuf>,
  ) -> Option<TargetRecord> {
    let declaration = self.fingerprint(idx)?.clone();
    let inputs = target_inputs(graph, idx)
      .into_iter()
      .filter_map(|path| self.stamp(&path).cloned().map(|stamp| (path, stamp)))
      .collect();
    let dependencies = graph
      .dependencies(idx)
      .into_iter()
      .filter_map(|dep| {
        let name = graph.name(dep);
        state.get(name).map(|r| (name.to_string(), r.built_at))
      })
      .collect();

    Some(TargetRecord {
      declaration,
      inputs,
      objects,
      artifact,
      dependencies,
      built_at: SystemTime::now(),
    })
  }
}
