//! CLI output formatting utilities.
//!
//! Colored status lines for build reports and plans, plus JSON output.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

use flbuild_lib::{BuildPlan, BuildReport, SkipReason, TargetOutcome};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
  pub const SKIP: &str = "-";
  pub const REBUILD: &str = "~";
}

/// Millisecond-rounded human duration, e.g. `1s 250ms`.
pub fn format_elapsed(elapsed: Duration) -> String {
  let rounded = Duration::from_millis(elapsed.as_millis() as u64);
  humantime::format_duration(rounded).to_string()
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}

/// Render a build report: one line per target, failures with their
/// dependents, then counters.
pub fn print_report(report: &BuildReport, verbose: bool) {
  for (name, outcome) in &report.outcomes {
    match outcome {
      TargetOutcome::Built => print_success(&format!("built {}", name)),
      TargetOutcome::UpToDate if verbose => print_info(&format!("{} is up to date", name)),
      TargetOutcome::UpToDate => {}
      TargetOutcome::Failed(error) => print_error(&error.to_string()),
      TargetOutcome::Skipped(reason) => println!(
        "{} {}",
        symbols::SKIP.if_supports_color(Stream::Stdout, |s| s.dimmed()),
        skip_message(name, reason).if_supports_color(Stream::Stdout, |s| s.dimmed())
      ),
    }
  }

  let chains = report.causal_chains();
  if chains.values().any(|dependents| !dependents.is_empty()) {
    println!();
    println!("Failures:");
    for (root, dependents) in &chains {
      println!("  {}", root.if_supports_color(Stream::Stdout, |s| s.red()));
      for dependent in dependents {
        println!("    {} {}", symbols::ARROW, dependent);
      }
    }
  }

  println!();
  print_stat("Built", &report.built().len().to_string());
  print_stat("Up to date", &report.up_to_date().len().to_string());
  if !report.failures().is_empty() {
    print_stat("Failed", &report.failures().len().to_string());
  }
  if !report.skipped().is_empty() {
    print_stat("Skipped", &report.skipped().len().to_string());
  }
  print_stat(
    "Compiled",
    &format!("{} ({} reused)", report.stats.compiled, report.stats.reused),
  );
  print_stat("Linked", &report.stats.linked.to_string());
  print_stat("Elapsed", &format_elapsed(report.stats.elapsed));
}

fn skip_message(name: &str, reason: &SkipReason) -> String {
  format!("skipped {} ({})", name, reason)
}

/// Render a dry-run plan batch by batch.
pub fn print_plan(plan: &BuildPlan) {
  for (n, batch) in plan.batches.iter().enumerate() {
    println!("Batch {}:", n + 1);
    for target in batch {
      match &target.reason {
        Some(reason) => println!(
          "  {} {} ({}, {})",
          symbols::REBUILD.if_supports_color(Stream::Stdout, |s| s.yellow()),
          target.name,
          target.kind,
          reason
        ),
        None => println!(
          "  {} {} ({}, up to date)",
          symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
          target.name,
          target.kind
        ),
      }
    }
  }

  println!();
  print_stat("Targets", &plan.target_count().to_string());
  print_stat("To rebuild", &plan.rebuild_count().to_string());
}
