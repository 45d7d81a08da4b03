//! Build report: one outcome per target in the resolved graph.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::execute::BuildError;

/// Why a target was not attempted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
  /// A target in the dependency closure failed. `root` is the failing
  /// target itself, never an intermediate skipped one.
  FailedDependency { root: String },
  /// Not started because the build stopped after `after` failed.
  Cancelled { after: String },
}

impl fmt::Display for SkipReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SkipReason::FailedDependency { root } => write!(f, "dependency {} failed", root),
      SkipReason::Cancelled { after } => write!(f, "cancelled after {} failed", after),
    }
  }
}

/// Final state of one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum TargetOutcome {
  Built,
  UpToDate,
  Failed(BuildError),
  Skipped(SkipReason),
}

impl TargetOutcome {
  /// `Built` or `UpToDate`.
  pub fn is_success(&self) -> bool {
    matches!(self, TargetOutcome::Built | TargetOutcome::UpToDate)
  }
}

/// Counters for one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildStats {
  /// Sources handed to the compiler.
  pub compiled: usize,
  /// Sources whose previous object was reused.
  pub reused: usize,
  /// Archive and link operations.
  pub linked: usize,
  pub elapsed: Duration,
}

/// Aggregated result of a build invocation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
  /// Outcome of every target in the resolved graph.
  pub outcomes: BTreeMap<String, TargetOutcome>,
  /// Requested roots, in request order.
  pub roots: Vec<String>,
  /// The first failure observed by the coordinator.
  pub first_failure: Option<String>,
  pub stats: BuildStats,
}

impl BuildReport {
  /// True when every requested root is `Built` or `UpToDate`.
  pub fn is_success(&self) -> bool {
    self
      .roots
      .iter()
      .all(|root| self.outcomes.get(root).is_some_and(TargetOutcome::is_success))
  }

  pub fn outcome(&self, name: &str) -> Option<&TargetOutcome> {
    self.outcomes.get(name)
  }

  /// Names of targets that were rebuilt.
  pub fn built(&self) -> Vec<&str> {
    self.names_where(|o| matches!(o, TargetOutcome::Built))
  }

  /// Names of targets that needed no work.
  pub fn up_to_date(&self) -> Vec<&str> {
    self.names_where(|o| matches!(o, TargetOutcome::UpToDate))
  }

  /// Every failure, by target name.
  pub fn failures(&self) -> Vec<(&str, &BuildError)> {
    self
      .outcomes
      .iter()
      .filter_map(|(name, outcome)| match outcome {
        TargetOutcome::Failed(err) => Some((name.as_str(), err)),
        _ => None,
      })
      .collect()
  }

  /// Every skipped target and why.
  pub fn skipped(&self) -> Vec<(&str, &SkipReason)> {
    self
      .outcomes
      .iter()
      .filter_map(|(name, outcome)| match outcome {
        TargetOutcome::Skipped(reason) => Some((name.as_str(), reason)),
        _ => None,
      })
      .collect()
  }

  /// Skipped targets grouped under the failure that caused them.
  ///
  /// Every failed target has an entry, possibly empty. Targets skipped by
  /// cancellation are not included; see `skipped`.
  pub fn causal_chains(&self) -> BTreeMap<&str, Vec<&str>> {
    let mut chains: BTreeMap<&str, Vec<&str>> = self.failures().into_iter().map(|(name, _)| (name, Vec::new())).collect();

    for (name, reason) in self.skipped() {
      if let SkipReason::FailedDependency { root } = reason {
        chains.entry(root.as_str()).or_default().push(name);
      }
    }

    chains
  }

  fn names_where(&self, predicate: impl Fn(&TargetOutcome) -> bool) -> Vec<&str> {
    self
      .outcomes
      .iter()
      .filter(|(_, outcome)| predicate(outcome))
      .map(|(name, _)| name.as_str())
      .collect()
  }
}
