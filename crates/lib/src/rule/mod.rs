//! Rule declarations and the registry they are loaded into.
//!
//! Rules arrive from an external manifest loader as a flat list of
//! `(name, kind, sources, headers, deps)` tuples. The registry validates them,
//! resolves dependency references to qualified names, and is read-only after
//! construction.

mod registry;
mod types;

pub use registry::RuleRegistry;
pub use types::*;
