//! Platform-specific path resolution.

pub mod paths;
