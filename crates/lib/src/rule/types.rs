use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::consts::NAME_SEPARATOR;
use crate::util::hash::{ContentHash, HashError, Hashable};

/// The two kinds of compilation unit the engine knows how to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
  /// Objects archived into a static library. May be header-only.
  Library,
  /// Objects linked with the dependency closure into an executable.
  Binary,
}

impl fmt::Display for TargetKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TargetKind::Library => write!(f, "library"),
      TargetKind::Binary => write!(f, "binary"),
    }
  }
}

/// A rule exactly as handed over by the manifest loader.
///
/// Names and dependency references are not yet validated or resolved; see
/// `RuleRegistry::from_rules`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
  /// Qualified name, `package:name`.
  pub name: String,
  pub kind: TargetKind,
  #[serde(default)]
  pub sources: Vec<PathBuf>,
  #[serde(default)]
  pub headers: Vec<PathBuf>,
  /// Dependency references: `pkg:name`, `:name` (same package) or a bare `pkg`.
  #[serde(default, alias = "deplibs", alias = "linkables")]
  pub deps: Vec<String>,
}

impl Rule {
  pub fn new(name: impl Into<String>, kind: TargetKind) -> Self {
    Self {
      name: name.into(),
      kind,
      sources: Vec::new(),
      headers: Vec::new(),
      deps: Vec::new(),
    }
  }

  pub fn library(name: impl Into<String>) -> Self {
    Self::new(name, TargetKind::Library)
  }

  pub fn binary(name: impl Into<String>) -> Self {
    Self::new(name, TargetKind::Binary)
  }

  pub fn with_sources<I, P>(mut self, sources: I) -> Self
  where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
  {
    self.sources = sources.into_iter().map(Into::into).collect();
    self
  }

  pub fn with_headers<I, P>(mut self, headers: I) -> Self
  where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
  {
    self.headers = headers.into_iter().map(Into::into).collect();
    self
  }

  pub fn with_deps<I, S>(mut self, deps: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.deps = deps.into_iter().map(Into::into).collect();
    self
  }
}

/// A validated target declaration.
///
/// `deps` holds resolved qualified names with duplicates collapsed, in the
/// order they were first declared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDecl {
  pub name: String,
  pub kind: TargetKind,
  pub sources: Vec<PathBuf>,
  pub headers: BTreeSet<PathBuf>,
  pub deps: Vec<String>,
}

/// The parts of a declaration that decide whether it changed.
///
/// Dependency order is not semantic, so it is normalized away.
#[derive(Serialize)]
struct DeclarationFingerprint<'a> {
  kind: TargetKind,
  sources: &'a [PathBuf],
  headers: &'a BTreeSet<PathBuf>,
  deps: Vec<&'a str>,
}

impl Hashable for DeclarationFingerprint<'_> {}

impl TargetDecl {
  /// Package part of the qualified name.
  pub fn package(&self) -> &str {
    split_name(&self.name).map(|(package, _)| package).unwrap_or_default()
  }

  /// Target part of the qualified name.
  pub fn short_name(&self) -> &str {
    split_name(&self.name).map(|(_, name)| name).unwrap_or(&self.name)
  }

  /// Header-only libraries have nothing to compile or archive.
  pub fn is_header_only(&self) -> bool {
    self.kind == TargetKind::Library && self.sources.is_empty()
  }

  /// Fingerprint of kind, sources, headers and the dependency set.
  pub fn fingerprint(&self) -> Result<ContentHash, HashError> {
    let mut deps: Vec<&str> = self.deps.iter().map(String::as_str).collect();
    deps.sort_unstable();
    DeclarationFingerprint {
      kind: self.kind,
      sources: &self.sources,
      headers: &self.headers,
      deps,
    }
    .compute_hash()
  }
}

/// Split a qualified name into `(package, name)`.
///
/// Both parts must be non-empty and the name must not itself contain a separator.
pub fn split_name(qualified: &str) -> Option<(&str, &str)> {
  let (package, name) = qualified.split_once(NAME_SEPARATOR)?;
  if package.is_empty() || name.is_empty() || name.contains(NAME_SEPARATOR) {
    return None;
  }
  Some((package, name))
}

/// Resolve a dependency reference relative to the package of its referrer.
///
/// - `:name` resolves to `<referrer_package>:name`
/// - `pkg:name` is already qualified
/// - a bare `pkg` resolves to `pkg:<last path component of pkg>`
///
/// Returns `None` for references that cannot name any target.
pub fn resolve_reference(reference: &str, referrer_package: &str) -> Option<String> {
  let reference = reference.trim();
  if reference.is_empty() {
    return None;
  }

  if let Some(local) = reference.strip_prefix(NAME_SEPARATOR) {
    if local.is_empty() || local.contains(NAME_SEPARATOR) {
      return None;
    }
    return Some(format!("{}{}{}", referrer_package, NAME_SEPARATOR, local));
  }

  if reference.contains(NAME_SEPARATOR) {
    return split_name(reference).map(|_| reference.to_string());
  }

  let package = reference.trim_end_matches('/');
  let last = package.rsplit('/').next().filter(|s| !s.is_empty())?;
  Some(format!("{}{}{}", package, NAME_SEPARATOR, last))
}
