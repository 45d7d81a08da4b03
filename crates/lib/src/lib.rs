//! flbuild-lib: build orchestration engine for fl-build
//!
//! This crate turns a flat list of declared library and binary rules into
//! compiled artifacts:
//! - `rule`: the registry of declarations and qualified-name resolution
//! - `graph`: the resolved dependency graph for a requested root set
//! - `schedule`: topological batches and the ready queue driving execution
//! - `detect`: incremental change detection against persisted `state`
//! - `execute`: bounded-parallel compile/link through a `toolchain`
//! - `report`: per-target outcomes with causal failure attribution

pub mod consts;
pub mod detect;
pub mod error;
pub mod execute;
pub mod graph;
pub mod platform;
pub mod report;
pub mod rule;
pub mod schedule;
pub mod state;
pub mod toolchain;
pub mod util;

pub use detect::{ChangeSet, RebuildReason};
pub use error::{ConfigError, EngineError};
pub use execute::{BuildError, BuildMode, BuildOptions, BuildPlan, build, plan, run};
pub use graph::ResolvedGraph;
pub use report::{BuildReport, SkipReason, TargetOutcome};
pub use rule::{Rule, RuleRegistry, TargetKind};
pub use state::{BuildState, StateStore};
pub use toolchain::{CommandToolchain, CompileRequest, Diagnostic, LinkRequest, Toolchain};
