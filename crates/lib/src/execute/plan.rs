//! Dry run: what a build would do, without touching the toolchain.

use serde::Serialize;

use crate::detect::{ChangeSet, RebuildReason};
use crate::error::ConfigError;
use crate::graph::ResolvedGraph;
use crate::rule::{RuleRegistry, TargetKind};
use crate::schedule::Schedule;
use crate::state::BuildState;

use super::types::BuildOptions;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedTarget {
  pub name: String,
  pub kind: TargetKind,
  /// `None` when the target is up to date.
  pub reason: Option<RebuildReason>,
}

/// Batches of targets in build order with their rebuild decisions.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildPlan {
  pub batches: Vec<Vec<PlannedTarget>>,
}

impl BuildPlan {
  /// Number of targets that would be rebuilt.
  pub fn rebuild_count(&self) -> usize {
    self.batches.iter().flatten().filter(|t| t.reason.is_some()).count()
  }

  pub fn target_count(&self) -> usize {
    self.batches.iter().map(Vec::len).sum()
  }
}

/// Resolve, detect and schedule without building anything.
pub fn plan<S: AsRef<str>>(
  registry: &RuleRegistry,
  roots: &[S],
  state: &BuildState,
  options: &BuildOptions,
) -> Result<BuildPlan, ConfigError> {
  let graph = ResolvedGraph::resolve(registry, roots)?;
  let changes = ChangeSet::detect(&graph, state, options.detect_options());
  let schedule = Schedule::plan(&graph);

  let batches = schedule
    .batches()
    .iter()
    .map(|batch| {
      batch
        .iter()
        .map(|&idx| PlannedTarget {
          name: graph.name(idx).to_string(),
          kind: graph.target(idx).kind,
          reason: changes.reason(idx).cloned(),
        })
        .collect()
    })
    .collect();

  Ok(BuildPlan { batches })
}
