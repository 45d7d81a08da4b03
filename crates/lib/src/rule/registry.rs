use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::debug;

use crate::error::ConfigError;

use super::types::{Rule, TargetDecl, TargetKind, resolve_reference, split_name};

/// In-memory table of validated target declarations, keyed by qualified name.
///
/// Declarations keep the order in which the loader supplied them; lookups go
/// through a name index into that flat table.
#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
  targets: Vec<TargetDecl>,
  index: HashMap<String, usize>,
}

impl RuleRegistry {
  /// Validate and register a list of rules.
  ///
  /// # Errors
  ///
  /// Returns `MalformedRule` for the first rule that is missing fields
  /// required by its kind, has an invalid name or reference, or duplicates
  /// an earlier qualified name. Unknown dependency names are not checked
  /// here; see `ResolvedGraph::resolve`.
  pub fn from_rules(rules: impl IntoIterator<Item = Rule>) -> Result<Self, ConfigError> {
    let mut registry = Self::default();

    for rule in rules {
      let decl = validate(rule)?;
      if registry.index.contains_key(&decl.name) {
        return Err(malformed(&decl.name, "duplicate declaration"));
      }
      registry.index.insert(decl.name.clone(), registry.targets.len());
      registry.targets.push(decl);
    }

    debug!(targets = registry.targets.len(), "rule registry loaded");
    Ok(registry)
  }

  /// Look up a declaration by qualified name.
  pub fn get(&self, name: &str) -> Option<&TargetDecl> {
    self.index.get(name).map(|&idx| &self.targets[idx])
  }

  pub fn contains(&self, name: &str) -> bool {
    self.index.contains_key(name)
  }

  /// All declarations in load order.
  pub fn iter(&self) -> impl Iterator<Item = &TargetDecl> {
    self.targets.iter()
  }

  pub fn len(&self) -> usize {
    self.targets.len()
  }

  pub fn is_empty(&self) -> bool {
    self.targets.is_empty()
  }

  /// Normalize a requested root reference (`pkg:name` or bare `pkg`).
  pub fn resolve_root(&self, reference: &str) -> Result<String, ConfigError> {
    resolve_reference(reference, "")
      .filter(|name| self.contains(name))
      .ok_or_else(|| ConfigError::UnknownTarget {
        referrer: None,
        name: reference.to_string(),
      })
  }
}

fn malformed(rule: &str, reason: impl Into<String>) -> ConfigError {
  ConfigError::MalformedRule {
    rule: rule.to_string(),
    reason: reason.into(),
  }
}

fn validate(rule: Rule) -> Result<TargetDecl, ConfigError> {
  let name = rule.name.trim().to_string();
  if name.is_empty() {
    return Err(malformed("<unnamed>", "missing name"));
  }

  let Some((package, _)) = split_name(&name) else {
    return Err(malformed(&name, "name must have the form 'package:name'"));
  };

  if rule.kind == TargetKind::Binary && rule.sources.is_empty() {
    return Err(malformed(&name, "binary must declare at least one source"));
  }

  if rule.sources.iter().any(|p| p.as_os_str().is_empty()) {
    return Err(malformed(&name, "empty source path"));
  }

  if rule.headers.iter().any(|p| p.as_os_str().is_empty()) {
    return Err(malformed(&name, "empty header path"));
  }

  let mut seen = HashSet::new();
  let mut deps = Vec::with_capacity(rule.deps.len());
  for reference in &rule.deps {
    let resolved = resolve_reference(reference, package)
      .ok_or_else(|| malformed(&name, format!("invalid dependency reference '{}'", reference)))?;
    if seen.insert(resolved.clone()) {
      deps.push(resolved);
    }
  }

  Ok(TargetDecl {
    kind: rule.kind,
    sources: rule.sources,
    headers: rule.headers.into_iter().collect::<BTreeSet<_>>(),
    deps,
    name,
  })
}
