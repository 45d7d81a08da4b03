//! Build execution.
//!
//! This module provides the entry points for building a requested root set.
//! It handles:
//! - Graph resolution and change detection up front
//! - Dispatch from a ready queue as dependencies complete
//! - Bounded parallelism over compile and link operations
//! - Failure propagation and skip attribution
//! - Persisting fingerprints of every target that succeeded

mod plan;
mod target;
mod types;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use petgraph::graph::NodeIndex;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::consts::APP_NAME;
use crate::detect::ChangeSet;
use crate::error::{ConfigError, EngineError};
use crate::graph::ResolvedGraph;
use crate::report::{BuildReport, BuildStats, SkipReason, TargetOutcome};
use crate::rule::{RuleRegistry, TargetKind};
use crate::schedule::ReadyQueue;
use crate::state::{BuildState, LockMode, StateStore, TargetRecord};
use crate::toolchain::{Diagnostic, Toolchain};
use crate::util::hash::{ContentHash, KeyHasher};

use target::{SourceJob, TargetJob, build_target};

pub use crate::toolchain::BuildMode;
pub use plan::{BuildPlan, PlannedTarget, plan};
pub use types::{BuildError, BuildOptions, BuildStep, TargetArtifacts};

/// Build the requested roots against an in-memory build state.
///
/// Configuration errors abort before any toolchain call. Per-target compile
/// and link failures are recorded in the returned report. `state` gains a
/// fresh record for every target that built; records of failed, skipped and
/// undeclared targets are left as they were.
pub async fn build<T, S>(
  registry: &RuleRegistry,
  roots: &[S],
  state: &mut BuildState,
  toolchain: Arc<T>,
  options: &BuildOptions,
) -> Result<BuildReport, ConfigError>
where
  T: Toolchain,
  S: AsRef<str>,
{
  let started = Instant::now();

  let graph = ResolvedGraph::resolve(registry, roots)?;
  let changes = ChangeSet::detect(&graph, state, options.detect_options());

  info!(
    targets = graph.len(),
    rebuild = changes.rebuild_count(),
    jobs = options.jobs,
    mode = %options.mode,
    "starting build"
  );

  let semaphore = Arc::new(Semaphore::new(options.jobs.clamp(1, Semaphore::MAX_PERMITS)));
  let mut queue = ReadyQueue::new(&graph);
  let mut outcomes: Vec<Option<TargetOutcome>> = vec![None; graph.len()];
  let mut artifacts: Vec<Option<PathBuf>> = vec![None; graph.len()];
  let mut running: HashMap<tokio::task::Id, NodeIndex> = HashMap::new();
  let mut tasks = JoinSet::new();
  let mut stats = BuildStats::default();
  let mut first_failure: Option<String> = None;
  let mut stopped = false;

  loop {
    // Dispatch everything that is ready. Up-to-date targets complete on the
    // spot, which may make more targets ready.
    while !stopped && let Some(idx) = queue.pop() {
      let name = graph.name(idx);

      if !changes.needs_rebuild(idx) {
        debug!(target = %name, "up to date");
        artifacts[idx.index()] = state.get(name).and_then(|r| r.artifact.clone());
        outcomes[idx.index()] = Some(TargetOutcome::UpToDate);
        queue.complete(&graph, idx);
        continue;
      }

      let job = prepare_job(&graph, idx, &changes, state.get(name), &artifacts, options);
      debug!(target = %name, sources = job.sources.len(), "dispatching");
      let handle = tasks.spawn(build_target(job, toolchain.clone(), semaphore.clone()));
      running.insert(handle.id(), idx);
    }

    let Some(joined) = tasks.join_next_with_id().await else {
      break;
    };

    let (idx, result) = match joined {
      Ok((id, result)) => match running.remove(&id) {
        Some(idx) => (idx, result),
        None => continue,
      },
      Err(join_error) => {
        let Some(idx) = running.remove(&join_error.id()) else {
          continue;
        };
        let diagnostic = Diagnostic::new(format!("build task failed: {}", join_error));
        (idx, Err(BuildError::new(graph.name(idx), BuildStep::Worker, diagnostic)))
      }
    };
    let name = graph.name(idx);

    match result {
      Ok(built) => {
        stats.compiled += built.compiled;
        stats.reused += built.reused;
        stats.linked += usize::from(built.linked);

        match changes.record(&graph, idx, state, built.objects, built.artifact.clone()) {
          Some(record) => state.record(name, record),
          None => warn!(target = %name, "could not fingerprint declaration, not recording"),
        }

        artifacts[idx.index()] = built.artifact;
        outcomes[idx.index()] = Some(TargetOutcome::Built);
        queue.complete(&graph, idx);
      }
      Err(err) => {
        error!(target = %name, error = %err, "target failed");
        first_failure.get_or_insert_with(|| name.to_string());
        outcomes[idx.index()] = Some(TargetOutcome::Failed(err));
        if !options.keep_going {
          stopped = true;
        }
      }
    }
  }

  attribute_skips(&graph, &mut outcomes, first_failure.as_deref());
  stats.elapsed = started.elapsed();

  let report = BuildReport {
    outcomes: graph
      .topological_order()
      .iter()
      .filter_map(|&idx| outcomes[idx.index()].take().map(|o| (graph.name(idx).to_string(), o)))
      .collect(),
    roots: graph.roots().iter().map(|&idx| graph.name(idx).to_string()).collect(),
    first_failure,
    stats,
  };

  info!(
    built = report.built().len(),
    up_to_date = report.up_to_date().len(),
    failed = report.failures().len(),
    skipped = report.skipped().len(),
    elapsed = ?report.stats.elapsed,
    "build complete"
  );

  Ok(report)
}

/// Lock the store, load its state, build, and save the state back.
///
/// The state is saved even when targets fail, so that everything that did
/// build is not rebuilt next time.
pub async fn run<T, S>(
  store: &StateStore,
  registry: &RuleRegistry,
  roots: &[S],
  toolchain: Arc<T>,
  options: &BuildOptions,
) -> Result<BuildReport, EngineError>
where
  T: Toolchain,
  S: AsRef<str>,
{
  let _lock = store.lock(LockMode::Exclusive, &format!("{} build", APP_NAME))?;
  let mut state = store.load()?;

  let report = build(registry, roots, &mut state, toolchain, options).await?;

  store.save(&state)?;
  Ok(report)
}

/// Mark every target that never finished as skipped.
///
/// A target downstream of a failure is attributed to the original failing
/// target, found by one pass in dependency order. Anything else was simply
/// not started because the build stopped.
fn attribute_skips(graph: &ResolvedGraph, outcomes: &mut [Option<TargetOutcome>], first_failure: Option<&str>) {
  let mut blocked_by: Vec<Option<String>> = vec![None; graph.len()];

  for &idx in graph.topological_order() {
    let slot = idx.index();
    match &outcomes[slot] {
      Some(TargetOutcome::Failed(_)) => {
        blocked_by[slot] = Some(graph.name(idx).to_string());
        continue;
      }
      Some(_) => continue,
      None => {}
    }

    let root = graph
      .dependencies(idx)
      .into_iter()
      .find_map(|dep| blocked_by[dep.index()].clone());

    let reason = match &root {
      Some(root) => SkipReason::FailedDependency { root: root.clone() },
      None => SkipReason::Cancelled {
        after: first_failure.unwrap_or_default().to_string(),
      },
    };

    warn!(target = %graph.name(idx), reason = %reason, "skipping target");
    blocked_by[slot] = root;
    outcomes[slot] = Some(TargetOutcome::Skipped(reason));
  }
}

/// Assemble the owned job for a target that needs building.
fn prepare_job(
  graph: &ResolvedGraph,
  idx: NodeIndex,
  changes: &ChangeSet,
  previous: Option<&TargetRecord>,
  artifacts: &[Option<PathBuf>],
  options: &BuildOptions,
) -> TargetJob {
  let target = graph.target(idx);
  let include_paths = graph.include_paths(idx);

  let sources = target
    .sources
    .iter()
    .map(|source| {
      let key = compile_key(graph, idx, changes, source, &include_paths, options.mode);
      let reuse = match (&key, previous.and_then(|r| r.objects.get(source))) {
        (Some(key), Some(object)) if !options.force && object.key == *key && object.object.exists() => {
          Some(object.object.clone())
        }
        _ => None,
      };
      SourceJob {
        source: source.clone(),
        key,
        reuse,
      }
    })
    .collect();

  let missing_headers = target
    .headers
    .iter()
    .filter(|header| changes.stamp(header).is_none())
    .cloned()
    .collect();

  let libraries = match target.kind {
    TargetKind::Binary => graph
      .dependency_closure(idx)
      .into_iter()
      .filter(|&dep| graph.target(dep).kind == TargetKind::Library)
      .filter_map(|dep| artifacts[dep.index()].clone())
      .collect(),
    TargetKind::Library => Vec::new(),
  };

  TargetJob {
    name: target.name.clone(),
    kind: target.kind,
    sources,
    include_paths,
    missing_headers,
    libraries,
    mode: options.mode,
  }
}

/// Key under which a source's object can be reused.
///
/// Covers the source content, every header in the target's invalidation
/// set, the include paths and the build mode. `None` if any of those files
/// could not be read.
fn compile_key(
  graph: &ResolvedGraph,
  idx: NodeIndex,
  changes: &ChangeSet,
  source: &std::path::Path,
  include_paths: &[PathBuf],
  mode: BuildMode,
) -> Option<ContentHash> {
  let mut hasher = KeyHasher::new()
    .part("mode", mode.as_str())
    .part("source", source.to_string_lossy().as_bytes())
    .part("source-hash", &changes.stamp(source)?.hash.0);

  for header in graph.invalidation_headers(idx) {
    hasher = hasher
      .part("header", header.to_string_lossy().as_bytes())
      .part("header-hash", &changes.stamp(header)?.hash.0);
  }

  for dir in include_paths {
    hasher = hasher.part("include", dir.to_string_lossy().as_bytes());
  }

  Some(hasher.finish())
}
