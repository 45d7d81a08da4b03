//! Boundary with the external compiler and linker.
//!
//! The engine decides what to run and in what order; a `Toolchain` decides
//! how. Both operations are treated as opaque, possibly slow and possibly
//! failing.

mod command;
mod types;

pub use command::CommandToolchain;
pub use types::*;

use std::future::Future;
use std::path::PathBuf;

/// Compiles sources and links artifacts.
///
/// Implementations are shared across worker tasks, so calls may overlap.
pub trait Toolchain: Send + Sync + 'static {
  /// Compile one source file into an object file, returning its path.
  fn compile(&self, request: CompileRequest) -> impl Future<Output = Result<PathBuf, Diagnostic>> + Send;

  /// Produce a target's final artifact: a static library archive for
  /// `TargetKind::Library`, an executable for `TargetKind::Binary`.
  fn link(&self, request: LinkRequest) -> impl Future<Output = Result<PathBuf, Diagnostic>> + Send;
}
