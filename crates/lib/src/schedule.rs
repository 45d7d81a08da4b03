//! Topological scheduling of a resolved graph.
//!
//! Two views over the same ordering:
//! - `Schedule`: static batches, for planning and display
//! - `ReadyQueue`: the incremental form the coordinator drives during a build

use std::collections::VecDeque;

use petgraph::graph::NodeIndex;

use crate::graph::ResolvedGraph;

/// Targets grouped into batches.
///
/// Every target in batch `k` depends only on targets in batches before `k`,
/// and each target sits in the earliest batch its dependencies allow.
#[derive(Debug, Clone, Default)]
pub struct Schedule {
  batches: Vec<Vec<NodeIndex>>,
}

impl Schedule {
  /// Compute batches with Kahn's algorithm, level by level.
  ///
  /// Within a batch, targets are sorted by qualified name so plans are
  /// reproducible; the order carries no meaning.
  pub fn plan(graph: &ResolvedGraph) -> Self {
    let mut queue = ReadyQueue::new(graph);
    let mut batches = Vec::new();

    let mut current: Vec<NodeIndex> = std::iter::from_fn(|| queue.pop()).collect();
    while !current.is_empty() {
      current.sort_by(|a, b| graph.name(*a).cmp(graph.name(*b)));

      let mut next = Vec::new();
      for &idx in &current {
        next.extend(queue.complete(graph, idx));
      }
      // Drain so the queue does not hand these out again.
      while queue.pop().is_some() {}

      batches.push(current);
      current = next;
    }

    Self { batches }
  }

  pub fn batches(&self) -> &[Vec<NodeIndex>] {
    &self.batches
  }

  /// Number of batches.
  pub fn len(&self) -> usize {
    self.batches.len()
  }

  pub fn is_empty(&self) -> bool {
    self.batches.is_empty()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
  Waiting,
  Ready,
  Taken,
  Completed,
}

/// Ready queue over a resolved graph.
///
/// A target becomes ready when its count of unfinished dependencies drops to
/// zero. Transitions only move forward: waiting, ready, taken, completed. A
/// target that is taken but never completed (a failure) keeps its dependents
/// waiting forever.
#[derive(Debug, Clone)]
pub struct ReadyQueue {
  pending: Vec<usize>,
  slots: Vec<Slot>,
  ready: VecDeque<NodeIndex>,
}

impl ReadyQueue {
  pub fn new(graph: &ResolvedGraph) -> Self {
    let mut pending = vec![0; graph.len()];
    let mut slots = vec![Slot::Waiting; graph.len()];
    let mut ready = VecDeque::new();

    for &idx in graph.topological_order() {
      let count = graph.dependency_count(idx);
      pending[idx.index()] = count;
      if count == 0 {
        slots[idx.index()] = Slot::Ready;
        ready.push_back(idx);
      }
    }

    Self {
      pending,
      slots,
      ready,
    }
  }

  /// Take the next ready target.
  pub fn pop(&mut self) -> Option<NodeIndex> {
    let idx = self.ready.pop_front()?;
    self.slots[idx.index()] = Slot::Taken;
    Some(idx)
  }

  /// Mark a taken target as finished successfully and release its dependents.
  ///
  /// Returns the targets that became ready as a result, sorted by name.
  /// Completing a target twice, or one that was never taken, releases nothing.
  pub fn complete(&mut self, graph: &ResolvedGraph, idx: NodeIndex) -> Vec<NodeIndex> {
    if self.slots[idx.index()] != Slot::Taken {
      return Vec::new();
    }
    self.slots[idx.index()] = Slot::Completed;

    let mut released = Vec::new();
    for dependent in graph.dependents(idx) {
      let count = &mut self.pending[dependent.index()];
      *count = count.saturating_sub(1);
      if *count == 0 && self.slots[dependent.index()] == Slot::Waiting {
        self.slots[dependent.index()] = Slot::Ready;
        released.push(dependent);
      }
    }

    released.sort_by(|a, b| graph.name(*a).cmp(graph.name(*b)));
    self.ready.extend(released.iter().copied());
    released
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::rule::{Rule, RuleRegistry};

  fn resolve(rules: Vec<Rule>, roots: &[&str]) -> ResolvedGraph {
    let registry = RuleRegistry::from_rules(rules).unwrap();
    ResolvedGraph::resolve(&registry, roots).unwrap()
  }

  fn batch_of(schedule: &Schedule, idx: NodeIndex) -> Option<usize> {
    schedule.batches().iter().position(|batch| batch.contains(&idx))
  }

  fn batch_names(graph: &ResolvedGraph, schedule: &Schedule) -> Vec<Vec<String>> {
    schedule
      .batches()
      .iter()
      .map(|batch| batch.iter().map(|&idx| graph.name(idx).to_string()).collect())
      .collect()
  }

  /// `base` <- `fx`, `col` <- `app`, plus an unrelated `tool`.
  fn diamond() -> ResolvedGraph {
    resolve(
      vec![
        Rule::library("base:base").with_sources(["base.cc"]),
        Rule::library("fx:fx").with_sources(["fx.cc"]).with_deps(["base:base"]),
        Rule::library("col:col").with_sources(["col.cc"]).with_deps(["base:base"]),
        Rule::binary("app:app").with_sources(["app.cc"]).with_deps(["fx:fx", "col:col"]),
        Rule::binary("tool:tool").with_sources(["tool.cc"]),
      ],
      &["app:app", "tool:tool"],
    )
  }

  #[test]
  fn batches_follow_dependency_levels() {
    let graph = diamond();
    let schedule = Schedule::plan(&graph);

    assert_eq!(
      batch_names(&graph, &schedule),
      vec![
        vec!["base:base", "tool:tool"],
        vec!["col:col", "fx:fx"],
        vec!["app:app"],
      ]
    );
  }

  #[test]
  fn every_edge_points_to_an_earlier_batch() {
    let graph = diamond();
    let schedule = Schedule::plan(&graph);

    for &idx in graph.topological_order() {
      let own = batch_of(&schedule, idx).unwrap();
      for dep in graph.dependencies(idx) {
        assert!(batch_of(&schedule, dep).unwrap() < own);
      }
    }
  }

  #[test]
  fn uneven_depths_use_earliest_batch() {
    // a <- b <- c <- d, and d also depends on a directly; e depends only on a.
    let graph = resolve(
      vec![
        Rule::library("a:a").with_sources(["a.cc"]),
        Rule::library("b:b").with_sources(["b.cc"]).with_deps(["a:a"]),
        Rule::library("c:c").with_sources(["c.cc"]).with_deps(["b:b"]),
        Rule::binary("d:d").with_sources(["d.cc"]).with_deps(["c:c", "a:a"]),
        Rule::binary("e:e").with_sources(["e.cc"]).with_deps(["a:a"]),
      ],
      &["d:d", "e:e"],
    );
    let schedule = Schedule::plan(&graph);

    assert_eq!(schedule.len(), 4);
    assert_eq!(batch_of(&schedule, graph.index_of("e:e").unwrap()), Some(1));
    assert_eq!(batch_of(&schedule, graph.index_of("d:d").unwrap()), Some(3));
  }

  #[test]
  fn ready_queue_releases_dependents_on_completion() {
    let graph = diamond();
    let mut queue = ReadyQueue::new(&graph);

    let base = graph.index_of("base:base").unwrap();
    let tool = graph.index_of("tool:tool").unwrap();

    let mut first = vec![queue.pop().unwrap(), queue.pop().unwrap()];
    first.sort();
    let mut expected = vec![base, tool];
    expected.sort();
    assert_eq!(first, expected);
    assert_eq!(queue.pop(), None);

    let released = queue.complete(&graph, base);
    let names: Vec<_> = released.iter().map(|&i| graph.name(i)).collect();
    assert_eq!(names, vec!["col:col", "fx:fx"]);
    assert_eq!(queue.pop(), graph.index_of("col:col"));
    assert_eq!(queue.pop(), graph.index_of("fx:fx"));
  }

  #[test]
  fn failed_target_keeps_dependents_waiting() {
    let graph = diamond();
    let mut queue = ReadyQueue::new(&graph);

    while queue.pop().is_some() {}

    // base is taken but never completed.
    let tool = graph.index_of("tool:tool").unwrap();
    assert!(queue.complete(&graph, tool).is_empty());
    assert_eq!(queue.pop(), None);
  }

  #[test]
  fn completion_is_idempotent() {
    let graph = diamond();
    let mut queue = ReadyQueue::new(&graph);
    let base = graph.index_of("base:base").unwrap();

    while queue.pop() != Some(base) {}
    assert_eq!(queue.complete(&graph, base).len(), 2);
    assert!(queue.complete(&graph, base).is_empty());
  }

  #[test]
  fn draining_in_order_finishes_everything() {
    let graph = diamond();
    let mut queue = ReadyQueue::new(&graph);
    let mut order = Vec::new();

    while let Some(idx) = queue.pop() {
      order.push(idx);
      queue.complete(&graph, idx);
    }

    assert_eq!(order.len(), graph.len());
    for (pos, &idx) in order.iter().enumerate() {
      for dep in graph.dependencies(idx) {
        assert!(order[..pos].contains(&dep));
      }
    }
  }
}
