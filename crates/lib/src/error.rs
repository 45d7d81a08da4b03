//! Configuration-time and engine-level errors.
//!
//! Configuration errors are fatal and always surface before any toolchain
//! invocation. Per-target compile and link failures are not errors at this
//! level; they are recorded in the build report (see `execute::BuildError`).

use thiserror::Error;

use crate::state::{StateError, StoreLockError};

/// A rule set that cannot be turned into a valid dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
  /// A dependency reference (or requested root) names no declared target.
  #[error("unknown target '{name}'{}", .referrer.as_ref().map(|r| format!(" (required by {})", r)).unwrap_or_default())]
  UnknownTarget { referrer: Option<String>, name: String },

  /// The dependency edges form a cycle. `path` holds each member exactly once,
  /// in dependency order; the last element depends on the first.
  #[error("dependency cycle detected: {}", format_cycle(.path))]
  DependencyCycle { path: Vec<String> },

  /// A declaration is missing fields required for its kind, or is otherwise invalid.
  #[error("malformed rule '{rule}': {reason}")]
  MalformedRule { rule: String, reason: String },
}

fn format_cycle(path: &[String]) -> String {
  match path.first() {
    Some(first) => format!("{} -> {}", path.join(" -> "), first),
    None => String::new(),
  }
}

/// Errors from the load-build-save entry point.
#[derive(Debug, Error)]
pub enum EngineError {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error("build state error: {0}")]
  State(#[from] StateError),

  #[error(transparent)]
  Lock(#[from] StoreLockError),
}
