//! Building a single target: compile its sources, then archive or link.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::rule::TargetKind;
use crate::state::ObjectRecord;
use crate::toolchain::{BuildMode, CompileRequest, Diagnostic, LinkRequest, Toolchain};
use crate::util::hash::ContentHash;

use super::types::{BuildError, BuildStep, TargetArtifacts};

/// One source of a target, with what is known about its previous object.
#[derive(Debug, Clone)]
pub(crate) struct SourceJob {
  pub source: PathBuf,
  /// `None` when an input could not be read; always recompiled.
  pub key: Option<ContentHash>,
  /// Previous object whose key matches and which still exists.
  pub reuse: Option<PathBuf>,
}

/// Everything a worker needs to build one target, owned so it can move into
/// a spawned task.
#[derive(Debug, Clone)]
pub(crate) struct TargetJob {
  pub name: String,
  pub kind: TargetKind,
  pub sources: Vec<SourceJob>,
  pub include_paths: Vec<PathBuf>,
  /// Declared headers of this target that could not be read.
  pub missing_headers: Vec<PathBuf>,
  /// Library artifacts of the dependency closure, dependencies first.
  pub libraries: Vec<PathBuf>,
  pub mode: BuildMode,
}

fn worker_error(target: &str, message: impl Into<String>) -> BuildError {
  BuildError::new(target, BuildStep::Worker, Diagnostic::new(message))
}

/// Build one target.
///
/// Sources compile concurrently, each under its own permit from the shared
/// semaphore. After the first compile failure no further compile starts;
/// those already running finish, and the failure of the earliest source is
/// reported. The archive or link step then runs under a permit of its own.
pub(crate) async fn build_target<T: Toolchain>(
  job: TargetJob,
  toolchain: Arc<T>,
  semaphore: Arc<Semaphore>,
) -> Result<TargetArtifacts, BuildError> {
  let mut artifacts = TargetArtifacts::default();

  if let Some(header) = job.missing_headers.first() {
    let diagnostic = Diagnostic::new(format!("declared header {} is missing or unreadable", header.display()));
    return Err(BuildError::new(&job.name, BuildStep::Headers, diagnostic));
  }

  if job.kind == TargetKind::Library && job.sources.is_empty() {
    debug!(target = %job.name, "header-only library, nothing to build");
    return Ok(artifacts);
  }

  let mut objects: Vec<Option<PathBuf>> = vec![None; job.sources.len()];
  let mut compiles = JoinSet::new();
  let failed = Arc::new(AtomicBool::new(false));

  for (slot, source) in job.sources.iter().enumerate() {
    if let Some(object) = &source.reuse {
      debug!(target = %job.name, source = %source.source.display(), "reusing object");
      objects[slot] = Some(object.clone());
      artifacts.reused += 1;
      continue;
    }

    let request = CompileRequest {
      target: job.name.clone(),
      source: source.source.clone(),
      include_paths: job.include_paths.clone(),
      mode: job.mode,
    };
    let toolchain = toolchain.clone();
    let semaphore = semaphore.clone();
    let failed = failed.clone();

    compiles.spawn(async move {
      let _permit = match semaphore.acquire_owned().await {
        Ok(permit) => permit,
        Err(e) => return (slot, Some(Err(Diagnostic::new(e.to_string())))),
      };
      if failed.load(Ordering::SeqCst) {
        return (slot, None);
      }

      debug!(target = %request.target, source = %request.source.display(), "compiling");
      let result = toolchain.compile(request).await;
      if result.is_err() {
        failed.store(true, Ordering::SeqCst);
      }
      (slot, Some(result))
    });
  }

  // Drain every compile, even after a task dies, so none is aborted mid-run.
  let mut first_error: Option<(usize, Diagnostic)> = None;
  let mut task_error: Option<BuildError> = None;
  while let Some(joined) = compiles.join_next().await {
    let (slot, result) = match joined {
      Ok(done) => done,
      Err(e) => {
        failed.store(true, Ordering::SeqCst);
        task_error.get_or_insert_with(|| worker_error(&job.name, format!("compile task failed: {}", e)));
        continue;
      }
    };
    match result {
      Some(Ok(object)) => {
        objects[slot] = Some(object);
        artifacts.compiled += 1;
      }
      Some(Err(diagnostic)) => {
        if first_error.as_ref().is_none_or(|(earlier, _)| slot < *earlier) {
          first_error = Some((slot, diagnostic));
        }
      }
      None => {}
    }
  }

  if let Some((slot, diagnostic)) = first_error {
    let source = job.sources[slot].source.clone();
    return Err(BuildError::new(&job.name, BuildStep::Compile { source }, diagnostic));
  }
  if let Some(err) = task_error {
    return Err(err);
  }

  for (source, object) in job.sources.iter().zip(&objects) {
    if let (Some(key), Some(object)) = (&source.key, object) {
      artifacts.objects.insert(
        source.source.clone(),
        ObjectRecord {
          key: key.clone(),
          object: object.clone(),
        },
      );
    }
  }

  let step = match job.kind {
    TargetKind::Library => BuildStep::Archive,
    TargetKind::Binary => BuildStep::Link,
  };
  let request = LinkRequest {
    target: job.name.clone(),
    kind: job.kind,
    objects: objects.into_iter().flatten().collect(),
    libraries: match job.kind {
      TargetKind::Library => Vec::new(),
      TargetKind::Binary => job.libraries.clone(),
    },
    mode: job.mode,
  };

  let artifact = {
    let _permit = semaphore
      .acquire()
      .await
      .map_err(|e| worker_error(&job.name, e.to_string()))?;
    debug!(target = %job.name, step = %step, objects = request.objects.len(), "linking");
    toolchain
      .link(request)
      .await
      .map_err(|diagnostic| BuildError::new(&job.name, step, diagnostic))?
  };

  info!(
    target = %job.name,
    compiled = artifacts.compiled,
    reused = artifacts.reused,
    artifact = %artifact.display(),
    "target built"
  );

  artifacts.artifact = Some(artifact);
  artifacts.linked = true;
  Ok(artifacts)
}
