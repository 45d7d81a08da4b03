mod build;
mod clean;
mod plan;

pub use build::{BuildArgs, cmd_build};
pub use clean::{CleanArgs, cmd_clean};
pub use plan::{PlanArgs, cmd_plan};

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use flbuild_lib::{BuildMode, Rule, RuleRegistry};

/// Arguments shared by every command that reads a rule list.
#[derive(Debug, Args)]
pub struct RuleArgs {
  /// Targets to build (`package:name`, `:name` or a bare package); all declared targets when empty
  pub targets: Vec<String>,

  /// JSON file holding the rule list. Relative paths inside it are resolved from its directory.
  #[arg(short, long, default_value = "rules.json")]
  pub rules: PathBuf,

  /// Build mode; each mode keeps separate state and outputs
  #[arg(short, long, default_value_t = BuildMode::Check)]
  pub mode: BuildMode,
}

/// A loaded rule list and the targets requested from it.
pub struct Project {
  /// Directory containing the rules file. Build state lives beneath it.
  pub dir: PathBuf,
  pub registry: RuleRegistry,
  pub roots: Vec<String>,
}

impl RuleArgs {
  pub fn load(&self) -> Result<Project> {
    let rules_path = dunce::canonicalize(&self.rules)
      .with_context(|| format!("Failed to locate rules file: {}", self.rules.display()))?;
    let dir = rules_path
      .parent()
      .map(Path::to_path_buf)
      .unwrap_or_else(|| PathBuf::from("."));

    let content = fs::read_to_string(&rules_path)
      .with_context(|| format!("Failed to read rules file: {}", rules_path.display()))?;
    let mut rules: Vec<Rule> = serde_json::from_str(&content)
      .with_context(|| format!("Failed to parse rules file: {}", rules_path.display()))?;

    for rule in &mut rules {
      anchor(&dir, &mut rule.sources);
      anchor(&dir, &mut rule.headers);
    }

    let registry = RuleRegistry::from_rules(rules).context("Invalid rule list")?;
    let roots = if self.targets.is_empty() {
      registry.iter().map(|decl| decl.name.clone()).collect()
    } else {
      self.targets.clone()
    };

    Ok(Project { dir, registry, roots })
  }
}

fn anchor(dir: &Path, paths: &mut [PathBuf]) {
  for path in paths.iter_mut().filter(|p| p.is_relative()) {
    *path = dir.join(&*path);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn args(rules: PathBuf, targets: &[&str]) -> RuleArgs {
    RuleArgs {
      targets: targets.iter().map(|t| t.to_string()).collect(),
      rules,
      mode: BuildMode::Check,
    }
  }

  #[test]
  fn load_anchors_relative_paths_to_rules_dir() {
    let temp = TempDir::new().unwrap();
    let rules = temp.path().join("rules.json");
    fs::write(
      &rules,
      r#"[{ "name": "app:app", "kind": "binary", "sources": ["src/main.c"], "headers": ["/abs/x.h"] }]"#,
    )
    .unwrap();

    let project = args(rules, &[]).load().unwrap();
    let decl = project.registry.get("app:app").unwrap();
    let dir = dunce::canonicalize(temp.path()).unwrap();

    assert_eq!(project.dir, dir);
    assert_eq!(decl.sources, vec![dir.join("src/main.c")]);
    assert!(decl.headers.contains(Path::new("/abs/x.h")));
    assert_eq!(project.roots, vec!["app:app".to_string()]);
  }

  #[test]
  fn load_keeps_requested_roots() {
    let temp = TempDir::new().unwrap();
    let rules = temp.path().join("rules.json");
    fs::write(
      &rules,
      r#"[{ "name": "a:a", "kind": "library" }, { "name": "b:b", "kind": "library", "deps": ["a"] }]"#,
    )
    .unwrap();

    let project = args(rules, &["b"]).load().unwrap();
    assert_eq!(project.roots, vec!["b".to_string()]);
    assert_eq!(project.registry.len(), 2);
  }

  #[test]
  fn load_reports_missing_file() {
    let temp = TempDir::new().unwrap();
    let err = args(temp.path().join("nope.json"), &[]).load().err().unwrap();
    assert!(err.to_string().contains("Failed to locate rules file"));
  }
}
