//! Shared helpers for build scenario tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use flbuild_lib::rule::TargetKind;
use flbuild_lib::{CompileRequest, Diagnostic, LinkRequest, Toolchain};
use tempfile::TempDir;

/// A toolchain step as seen by the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
  Compile(PathBuf),
  Link,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
  Started(String, Step),
  Finished(String, Step),
}

/// Toolchain that writes real output files, records every call and tracks
/// how many operations overlap.
#[derive(Default)]
pub struct FakeToolchain {
  out: PathBuf,
  events: Mutex<Vec<Event>>,
  links: Mutex<Vec<LinkRequest>>,
  failing_sources: Mutex<HashSet<PathBuf>>,
  failing_links: Mutex<HashSet<String>>,
  panicking_sources: Mutex<HashSet<PathBuf>>,
  delays: Mutex<HashMap<PathBuf, Duration>>,
  default_delay: Duration,
  in_flight: AtomicUsize,
  max_in_flight: AtomicUsize,
}

impl FakeToolchain {
  pub fn new(out: impl Into<PathBuf>) -> Self {
    Self {
      out: out.into(),
      ..Default::default()
    }
  }

  /// Every operation sleeps for `delay`, so overlap is observable.
  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.default_delay = delay;
    self
  }

  pub fn delay_source(&self, source: impl Into<PathBuf>, delay: Duration) {
    self.delays.lock().unwrap().insert(source.into(), delay);
  }

  pub fn fail_source(&self, source: impl Into<PathBuf>) {
    self.failing_sources.lock().unwrap().insert(source.into());
  }

  /// Compiling `source` panics once its delay has elapsed.
  pub fn panic_source(&self, source: impl Into<PathBuf>) {
    self.panicking_sources.lock().unwrap().insert(source.into());
  }

  pub fn fail_link(&self, target: &str) {
    self.failing_links.lock().unwrap().insert(target.to_string());
  }

  pub fn clear_failures(&self) {
    self.failing_sources.lock().unwrap().clear();
    self.failing_links.lock().unwrap().clear();
  }

  pub fn events(&self) -> Vec<Event> {
    self.events.lock().unwrap().clone()
  }

  /// Sources whose compile ran to completion.
  pub fn finished_compiles(&self) -> Vec<PathBuf> {
    self
      .events()
      .into_iter()
      .filter_map(|e| match e {
        Event::Finished(_, Step::Compile(source)) => Some(source),
        _ => None,
      })
      .collect()
  }

  /// Sources compiled so far, in start order.
  pub fn compiled(&self) -> Vec<PathBuf> {
    self
      .events()
      .into_iter()
      .filter_map(|e| match e {
        Event::Started(_, Step::Compile(source)) => Some(source),
        _ => None,
      })
      .collect()
  }

  /// Targets linked or archived so far, in start order.
  pub fn linked(&self) -> Vec<String> {
    self
      .events()
      .into_iter()
      .filter_map(|e| match e {
        Event::Started(target, Step::Link) => Some(target),
        _ => None,
      })
      .collect()
  }

  pub fn link_requests(&self) -> Vec<LinkRequest> {
    self.links.lock().unwrap().clone()
  }

  pub fn invocations(&self) -> usize {
    self.compiled().len() + self.linked().len()
  }

  pub fn max_in_flight(&self) -> usize {
    self.max_in_flight.load(Ordering::SeqCst)
  }

  pub fn reset(&self) {
    self.events.lock().unwrap().clear();
    self.links.lock().unwrap().clear();
    self.max_in_flight.store(0, Ordering::SeqCst);
  }

  /// Position of the first event for `target`.
  pub fn first_start(&self, target: &str) -> Option<usize> {
    self
      .events()
      .iter()
      .position(|e| matches!(e, Event::Started(t, _) if t == target))
  }

  /// Position of the last event for `target`.
  pub fn last_finish(&self, target: &str) -> Option<usize> {
    self
      .events()
      .iter()
      .rposition(|e| matches!(e, Event::Finished(t, _) if t == target))
  }

  async fn operation(&self, target: &str, step: Step, delay: Duration) {
    self.events.lock().unwrap().push(Event::Started(target.to_string(), step.clone()));
    let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    self.max_in_flight.fetch_max(now, Ordering::SeqCst);

    if delay.is_zero() {
      tokio::task::yield_now().await;
    } else {
      tokio::time::sleep(delay).await;
    }

    self.in_flight.fetch_sub(1, Ordering::SeqCst);
    self.events.lock().unwrap().push(Event::Finished(target.to_string(), step));
  }

  fn target_dir(&self, kind: &str, target: &str) -> PathBuf {
    self.out.join(kind).join(target.replace([':', '/'], "_"))
  }
}

impl Toolchain for FakeToolchain {
  async fn compile(&self, request: CompileRequest) -> Result<PathBuf, Diagnostic> {
    let delay = self
      .delays
      .lock()
      .unwrap()
      .get(&request.source)
      .copied()
      .unwrap_or(self.default_delay);
    self
      .operation(&request.target, Step::Compile(request.source.clone()), delay)
      .await;

    if self.panicking_sources.lock().unwrap().contains(&request.source) {
      panic!("compiler crashed on {}", request.source.display());
    }

    if self.failing_sources.lock().unwrap().contains(&request.source) {
      return Err(Diagnostic::new(format!("{}: error: expected ';'", request.source.display())).with_exit_code(Some(1)));
    }

    let content = fs::read(&request.source).map_err(|e| Diagnostic::new(e.to_string()))?;
    let dir = self.target_dir("obj", &request.target);
    fs::create_dir_all(&dir).map_err(|e| Diagnostic::new(e.to_string()))?;
    let object = dir.join(request.object_name());
    fs::write(&object, content).map_err(|e| Diagnostic::new(e.to_string()))?;
    Ok(object)
  }

  async fn link(&self, request: LinkRequest) -> Result<PathBuf, Diagnostic> {
    self.operation(&request.target, Step::Link, self.default_delay).await;
    self.links.lock().unwrap().push(request.clone());

    if self.failing_links.lock().unwrap().contains(&request.target) {
      return Err(Diagnostic::new("undefined reference to `main'").with_exit_code(Some(1)));
    }

    let (kind, file) = match request.kind {
      TargetKind::Library => ("lib", "lib.a"),
      TargetKind::Binary => ("bin", "a.out"),
    };
    let dir = self.target_dir(kind, &request.target);
    fs::create_dir_all(&dir).map_err(|e| Diagnostic::new(e.to_string()))?;
    let artifact = dir.join(file);
    fs::write(&artifact, format!("{} objects", request.objects.len())).map_err(|e| Diagnostic::new(e.to_string()))?;
    Ok(artifact)
  }
}

/// A scratch project directory with source files.
pub struct Project {
  pub temp: TempDir,
}

impl Project {
  pub fn new() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  pub fn root(&self) -> &Path {
    self.temp.path()
  }

  pub fn path(&self, relative: &str) -> PathBuf {
    self.temp.path().join(relative)
  }

  pub fn write(&self, relative: &str, content: &str) -> PathBuf {
    let path = self.path(relative);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
  }

  /// Output directory for the fake toolchain.
  pub fn out_dir(&self) -> PathBuf {
    self.path("out")
  }
}
