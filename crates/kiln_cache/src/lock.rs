//! Cross-process advisory locks on the cache pair.
//!
//! A cache read holds a shared lock on both files of the pair for the whole
//! read; a cache write holds an exclusive lock on both. Acquisition never
//! blocks or retries: this is a best-effort cache, and a contended lock is
//! handled exactly like a validation failure (fall through to a fresh
//! compile). Locks release on drop on every exit path.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::CacheError;

/// A scoped advisory lock on one cache file.
///
/// Holds the locked file handle open for the lifetime of the guard and
/// unlocks on drop.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Acquires a shared (read) lock, without blocking.
    ///
    /// The file must already exist; a missing cache file is an ordinary
    /// cache miss surfaced as an I/O error.
    pub fn shared(path: &Path) -> Result<Self, CacheError> {
        let file = OpenOptions::new()
            .read(true)
            .open(path)
            .map_err(|e| io_error(path, e))?;
        // Qualified: std's inherent File locking methods would otherwise
        // shadow the fs4 trait and return a different error type.
        match fs4::FileExt::try_lock_shared(&file) {
            Ok(()) => Ok(Self {
                file,
                path: path.to_path_buf(),
            }),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Err(CacheError::Lock {
                path: path.to_path_buf(),
            }),
            Err(e) => Err(io_error(path, e)),
        }
    }

    /// Acquires an exclusive (write) lock, without blocking.
    ///
    /// Creates the file if it does not exist yet.
    pub fn exclusive(path: &Path) -> Result<Self, CacheError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| io_error(path, e))?;
        match fs4::FileExt::try_lock_exclusive(&file) {
            Ok(()) => Ok(Self {
                file,
                path: path.to_path_buf(),
            }),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Err(CacheError::Lock {
                path: path.to_path_buf(),
            }),
            Err(e) => Err(io_error(path, e)),
        }
    }

    /// The locked file's path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = fs4::FileExt::unlock(&self.file);
    }
}

fn io_error(path: &Path, source: std::io::Error) -> CacheError {
    CacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}
