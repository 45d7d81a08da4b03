//! Advisory locking of a state directory.
//!
//! A build takes the lock exclusively and records who holds it; `plan` and
//! other read-only commands take it shared. The lock is never waited on: a
//! second build against the same directory fails immediately and names the
//! holder.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const LOCK_FILENAME: &str = ".lock";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
  Shared,
  Exclusive,
}

/// Who holds an exclusive lock, as written into the lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockHolder {
  pub pid: u32,
  pub command: String,
  pub acquired_at: SystemTime,
}

impl fmt::Display for LockHolder {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let age = SystemTime::now().duration_since(self.acquired_at).unwrap_or_default();
    write!(f, "'{}' (pid {}, running for {}s)", self.command, self.pid, age.as_secs())
  }
}

#[derive(Debug, Error)]
pub enum StoreLockError {
  /// Another process holds the lock. `holder` is `None` when the lock file
  /// could not be read, e.g. because only shared holders exist.
  #[error(
    "build state is in use by {}\nIf no fl-build process is running, delete {}",
    .holder.as_ref().map_or_else(|| "another process".to_string(), |h| h.to_string()),
    .lock_path.display()
  )]
  Busy {
    holder: Option<LockHolder>,
    lock_path: PathBuf,
  },

  #[error("failed to prepare lock file {}: {source}", .path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// A held lock on a state directory, released on drop.
#[derive(Debug)]
pub struct StoreLock {
  file: File,
  path: PathBuf,
  mode: LockMode,
}

impl StoreLock {
  /// Take the lock on `dir` without blocking, creating `dir` if needed.
  pub fn acquire(dir: &Path, mode: LockMode, command: &str) -> Result<Self, StoreLockError> {
    let path = dir.join(LOCK_FILENAME);

    std::fs::create_dir_all(dir).map_err(|e| io_error(&path, e))?;
    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(&path)
      .map_err(|e| io_error(&path, e))?;

    match sys::try_lock(&file, mode) {
      Ok(()) => {}
      Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
        return Err(StoreLockError::Busy {
          holder: read_holder(&path),
          lock_path: path,
        });
      }
      Err(e) => return Err(io_error(&path, e)),
    }

    let lock = StoreLock { file, path, mode };
    if mode == LockMode::Exclusive {
      lock.write_holder(command).map_err(|e| io_error(&lock.path, e))?;
    }

    debug!(path = %lock.path.display(), mode = ?mode, "acquired state lock");
    Ok(lock)
  }

  fn write_holder(&self, command: &str) -> io::Result<()> {
    let holder = LockHolder {
      pid: std::process::id(),
      command: command.to_string(),
      acquired_at: SystemTime::now(),
    };
    let json = serde_json::to_vec(&holder).map_err(io::Error::other)?;

    let mut file = &self.file;
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&json)?;
    file.flush()
  }

  /// The holder record written by this lock. Only exclusive locks write one.
  pub fn holder(&self) -> Option<LockHolder> {
    let mut file = &self.file;
    file.seek(SeekFrom::Start(0)).ok()?;
    let mut contents = Vec::new();
    file.read_to_end(&mut contents).ok()?;
    serde_json::from_slice(&contents).ok()
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn mode(&self) -> LockMode {
    self.mode
  }
}

impl Drop for StoreLock {
  fn drop(&mut self) {
    // Clear the holder record before the handle closes and releases the lock.
    if self.mode == LockMode::Exclusive {
      let _ = self.file.set_len(0);
    }
  }
}

fn io_error(path: &Path, source: io::Error) -> StoreLockError {
  StoreLockError::Io {
    path: path.to_path_buf(),
    source,
  }
}

fn read_holder(path: &Path) -> Option<LockHolder> {
  let contents = std::fs::read(path).ok()?;
  serde_json::from_slice(&contents).ok()
}

#[cfg(unix)]
mod sys {
  use std::fs::File;
  use std::io;
  use std::os::unix::io::AsFd;

  use rustix::fs::{FlockOperation, flock};

  use super::LockMode;

  pub fn try_lock(file: &File, mode: LockMode) -> io::Result<()> {
    let operation = match mode {
      LockMode::Shared => FlockOperation::NonBlockingLockShared,
      LockMode::Exclusive => FlockOperation::NonBlockingLockExclusive,
    };
    flock(file.as_fd(), operation).map_err(io::Error::from)
  }
}

#[cfg(windows)]
mod sys {
  use std::fs::File;
  use std::io;
  use std::os::windows::io::AsRawHandle;

  use windows_sys::Win32::Foundation::HANDLE;
  use windows_sys::Win32::Storage::FileSystem::{LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY, LockFileEx};

  use super::LockMode;

  pub fn try_lock(file: &File, mode: LockMode) -> io::Result<()> {
    let mut flags = LOCKFILE_FAIL_IMMEDIATELY;
    if mode == LockMode::Exclusive {
      flags |= LOCKFILE_EXCLUSIVE_LOCK;
    }

    // SAFETY: the handle stays valid for the lifetime of `file`, and a
    // zeroed OVERLAPPED requests a lock starting at offset 0.
    let locked = unsafe {
      let mut overlapped = std::mem::zeroed();
      LockFileEx(file.as_raw_handle() as HANDLE, flags, 0, 1, 0, &mut overlapped)
    };

    if locked == 0 {
      Err(io::Error::last_os_error())
    } else {
      Ok(())
    }
  }
}
