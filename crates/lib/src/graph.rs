//! Resolved dependency graph for one build invocation.
//!
//! The graph holds the requested roots plus every target transitively
//! reachable through dependency edges. Nodes live in a flat petgraph table and
//! edges are index pairs running from dependency to dependent, so closure and
//! ordering queries never chase owning references between targets.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::debug;

use crate::error::ConfigError;
use crate::rule::{RuleRegistry, TargetDecl};

/// Visitation state for the resolution walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
  InProgress,
  Done,
}

/// The closure of a requested root set over the rule registry.
///
/// Immutable after construction.
#[derive(Debug, Clone)]
pub struct ResolvedGraph {
  /// Targets, with edges from dependency to dependent.
  graph: DiGraph<TargetDecl, ()>,

  /// Map from qualified name to node index.
  nodes: HashMap<String, NodeIndex>,

  /// Requested roots, deduplicated, in request order.
  roots: Vec<NodeIndex>,

  /// Every node, dependencies before dependents.
  order: Vec<NodeIndex>,

  /// Header invalidation set per node (own headers plus every dependency's).
  headers: Vec<BTreeSet<PathBuf>>,
}

struct Walker<'r> {
  registry: &'r RuleRegistry,
  graph: DiGraph<TargetDecl, ()>,
  nodes: HashMap<String, NodeIndex>,
  marks: Vec<Mark>,
  stack: Vec<NodeIndex>,
  order: Vec<NodeIndex>,
}

impl Walker<'_> {
  fn visit(&mut self, name: &str) -> Result<NodeIndex, ConfigError> {
    if let Some(&idx) = self.nodes.get(name) {
      return match self.marks[idx.index()] {
        Mark::Done => Ok(idx),
        Mark::InProgress => Err(self.cycle_error(idx)),
      };
    }

    let registry = self.registry;
    let decl = registry.get(name).ok_or_else(|| ConfigError::UnknownTarget {
      referrer: self.stack.last().map(|&idx| self.graph[idx].name.clone()),
      name: name.to_string(),
    })?;

    let idx = self.graph.add_node(decl.clone());
    self.nodes.insert(decl.name.clone(), idx);
    self.marks.push(Mark::InProgress);
    self.stack.push(idx);

    for dep in &decl.deps {
      let dep_idx = self.visit(dep)?;
      self.graph.add_edge(dep_idx, idx, ());
    }

    self.stack.pop();
    self.marks[idx.index()] = Mark::Done;
    self.order.push(idx);
    Ok(idx)
  }

  /// Report the cycle closed by an edge back into `idx`.
  fn cycle_error(&self, idx: NodeIndex) -> ConfigError {
    let start = self.stack.iter().position(|&n| n == idx).unwrap_or(0);
    ConfigError::DependencyCycle {
      path: self.stack[start..].iter().map(|&n| self.graph[n].name.clone()).collect(),
    }
  }
}

impl ResolvedGraph {
  /// Resolve a requested root set against the registry.
  ///
  /// Every dependency reference in the registry is checked first, so an
  /// unknown name anywhere aborts before any graph is produced. The walk then
  /// proceeds outward from the roots with three-color marking.
  ///
  /// # Errors
  ///
  /// - `UnknownTarget` naming the referrer and the missing name (or no
  ///   referrer for an unknown root)
  /// - `DependencyCycle` with the full cycle path
  pub fn resolve<S: AsRef<str>>(registry: &RuleRegistry, roots: &[S]) -> Result<Self, ConfigError> {
    for decl in registry.iter() {
      if let Some(missing) = decl.deps.iter().find(|dep| !registry.contains(dep)) {
        return Err(ConfigError::UnknownTarget {
          referrer: Some(decl.name.clone()),
          name: missing.clone(),
        });
      }
    }

    let mut walker = Walker {
      registry,
      graph: DiGraph::new(),
      nodes: HashMap::new(),
      marks: Vec::new(),
      stack: Vec::new(),
      order: Vec::new(),
    };

    let mut root_indices = Vec::new();
    for root in roots {
      let name = registry.resolve_root(root.as_ref())?;
      let idx = walker.visit(&name)?;
      if !root_indices.contains(&idx) {
        root_indices.push(idx);
      }
    }

    let Walker { graph, nodes, order, .. } = walker;

    let mut headers: Vec<BTreeSet<PathBuf>> = vec![BTreeSet::new(); graph.node_count()];
    for &idx in &order {
      let mut set = graph[idx].headers.clone();
      for dep in graph.neighbors_directed(idx, Direction::Incoming) {
        set.extend(headers[dep.index()].iter().cloned());
      }
      headers[idx.index()] = set;
    }

    debug!(
      roots = root_indices.len(),
      targets = graph.node_count(),
      edges = graph.edge_count(),
      "resolved dependency graph"
    );

    Ok(Self {
      graph,
      nodes,
      roots: root_indices,
      order,
      headers,
    })
  }

  /// Number of targets in the graph.
  pub fn len(&self) -> usize {
    self.graph.node_count()
  }

  pub fn is_empty(&self) -> bool {
    self.graph.node_count() == 0
  }

  /// Number of dependency edges.
  pub fn edge_count(&self) -> usize {
    self.graph.edge_count()
  }

  /// The declaration behind a node.
  pub fn target(&self, idx: NodeIndex) -> &TargetDecl {
    &self.graph[idx]
  }

  /// Qualified name of a node.
  pub fn name(&self, idx: NodeIndex) -> &str {
    &self.graph[idx].name
  }

  /// Node index for a qualified name.
  pub fn index_of(&self, name: &str) -> Option<NodeIndex> {
    self.nodes.get(name).copied()
  }

  pub fn contains(&self, name: &str) -> bool {
    self.nodes.contains_key(name)
  }

  /// Requested roots in request order.
  pub fn roots(&self) -> &[NodeIndex] {
    &self.roots
  }

  /// All nodes, dependencies before dependents.
  pub fn topological_order(&self) -> &[NodeIndex] {
    &self.order
  }

  /// Direct dependencies in declared order.
  pub fn dependencies(&self, idx: NodeIndex) -> Vec<NodeIndex> {
    self.graph[idx].deps.iter().filter_map(|dep| self.index_of(dep)).collect()
  }

  /// Direct dependents, in no particular order.
  pub fn dependents(&self, idx: NodeIndex) -> Vec<NodeIndex> {
    self.graph.neighbors_directed(idx, Direction::Outgoing).collect()
  }

  /// Number of direct dependencies.
  pub fn dependency_count(&self, idx: NodeIndex) -> usize {
    self.graph.neighbors_directed(idx, Direction::Incoming).count()
  }

  /// Full transitive dependency closure of a node, excluding the node itself.
  ///
  /// Deduplicated, dependencies before dependents, declared order among
  /// siblings. This is the order link inputs are handed to the toolchain.
  pub fn dependency_closure(&self, idx: NodeIndex) -> Vec<NodeIndex> {
    let mut visited = HashSet::new();
    let mut closure = Vec::new();
    for dep in self.dependencies(idx) {
      self.collect_closure(dep, &mut visited, &mut closure);
    }
    closure
  }

  fn collect_closure(&self, idx: NodeIndex, visited: &mut HashSet<NodeIndex>, closure: &mut Vec<NodeIndex>) {
    if !visited.insert(idx) {
      return;
    }
    for dep in self.dependencies(idx) {
      self.collect_closure(dep, visited, closure);
    }
    closure.push(idx);
  }

  /// Headers whose change invalidates this node: its own declared headers
  /// plus the headers of every target in its dependency closure.
  pub fn invalidation_headers(&self, idx: NodeIndex) -> &BTreeSet<PathBuf> {
    &self.headers[idx.index()]
  }

  /// Include directories for compiling this node's sources.
  ///
  /// Parent directories of the node's own sources, then of every header in
  /// its invalidation set, first occurrence wins.
  pub fn include_paths(&self, idx: NodeIndex) -> Vec<PathBuf> {
    let target = &self.graph[idx];
    let mut seen = HashSet::new();
    let mut paths = Vec::new();

    let files = target.sources.iter().chain(self.headers[idx.index()].iter());
    for file in files {
      let dir = match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => Path::new(".").to_path_buf(),
      };
      if seen.insert(dir.clone()) {
        paths.push(dir);
      }
    }

    paths
  }
}
