//! Persisted build state.
//!
//! The only durable output of the engine besides artifacts: one fingerprint
//! record per successfully built target, stored as versioned JSON next to an
//! advisory lock file.

mod lock;
mod storage;
mod types;

pub use lock::{LockHolder, LockMode, StoreLock, StoreLockError};
pub use storage::StateStore;
pub use types::*;
