//! Hashing utilities for change detection and fingerprints.
//!
//! This module provides:
//! - `ContentHash`: a full 64-character SHA-256 hex digest
//! - `Hashable`: fingerprinting of serializable declarations
//! - `KeyHasher`: incremental hashing of labelled parts (compile keys)
//! - `hash_file()` / `hash_bytes()`: content hashing

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub type HashError = serde_json::Error;

/// A full 64-character SHA256 hash of some content.
///
/// # Format
///
/// The hash is a lowercase hexadecimal string (64 characters).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl ContentHash {
  /// The first 12 characters, for log output.
  pub fn short(&self) -> &str {
    &self.0[..self.0.len().min(12)]
  }
}

/// Fingerprint of a value through its JSON serialization.
///
/// Two values with identical serialized form always produce the same hash, so
/// implementors control what participates by what they serialize.
pub trait Hashable: Serialize {
  fn compute_hash(&self) -> Result<ContentHash, HashError> {
    let serialized = serde_json::to_string(self)?;
    Ok(hash_bytes(serialized.as_bytes()))
  }
}

/// Incremental hasher over labelled parts.
///
/// Each part is framed with its label and length so that different
/// splits of the same bytes never collide.
#[derive(Default)]
pub struct KeyHasher {
  hasher: Sha256,
}

impl KeyHasher {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn part(mut self, label: &str, value: impl AsRef<[u8]>) -> Self {
    let value = value.as_ref();
    self.hasher.update(label.as_bytes());
    self.hasher.update((value.len() as u64).to_le_bytes());
    self.hasher.update(value);
    self
  }

  pub fn finish(self) -> ContentHash {
    ContentHash(format!("{:x}", self.hasher.finalize()))
  }
}

/// Hash a file's contents.
///
/// Returns the full 64-character SHA256 hash of the file.
pub fn hash_file(path: &Path) -> io::Result<ContentHash> {
  let mut file = fs::File::open(path)?;

  let mut hasher = Sha256::new();
  let mut buffer = [0u8; 8192];

  loop {
    let bytes_read = file.read(&mut buffer)?;
    if bytes_read == 0 {
      break;
    }
    hasher.update(&buffer[..bytes_read]);
  }

  Ok(ContentHash(format!("{:x}", hasher.finalize())))
}

/// Hash arbitrary bytes.
///
/// Returns the full 64-character SHA256 hash.
pub fn hash_bytes(data: &[u8]) -> ContentHash {
  let mut hasher = Sha256::new();
  hasher.update(data);
  ContentHash(format!("{:x}", hasher.finalize()))
}
