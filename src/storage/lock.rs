//! The `write.lock` marker that claims an index directory for one writer.
//!
//! The marker's presence is the signal; its JSON body (owner token, pid,
//! acquisition time) only helps an operator tell who left it behind.
//!
//! A marker found on acquisition is assumed to be stale, left by a crashed
//! process or an unreleased handle, and is removed. If removal fails the
//! file is genuinely in use and acquisition fails with an
//! `InvalidConfiguration` error telling the operator to recycle the process
//! holding it. Within one process a registry of held directories prevents a
//! second writer from deleting a live marker.
//!
//! The removal heuristic assumes a single writing process per directory.
//! Two hosts sharing one index directory are not protected.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use log::{debug, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{FolioError, Result};

/// File name of the lock marker.
pub const WRITE_LOCK_NAME: &str = "write.lock";

lazy_static! {
    /// Index directories currently held by a live writer in this process.
    static ref HELD_DIRECTORIES: Mutex<HashSet<PathBuf>> = Mutex::new(HashSet::new());
}

/// Diagnostic contents of a lock marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockInfo {
    pub token: String,
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
}

/// A held lock marker. Released on [`WriteLock::release`] or drop.
#[derive(Debug)]
pub struct WriteLock {
    path: PathBuf,
    key: PathBuf,
    info: LockInfo,
    released: bool,
}

impl WriteLock {
    /// Claim `directory`, removing a stale marker first.
    ///
    /// The directory must already exist.
    pub fn acquire(directory: &Path) -> Result<WriteLock> {
        let key = registry_key(directory);
        let mut held = HELD_DIRECTORIES.lock();

        if held.contains(&key) {
            return Err(FolioError::lock_contention(format!(
                "index directory {} already has a live writer in this process",
                directory.display()
            )));
        }

        let path = directory.join(WRITE_LOCK_NAME);
        if path.exists() {
            warn!("Removing stale lock marker {}", path.display());
            fs::remove_file(&path).map_err(|e| {
                FolioError::invalid_config(format!(
                    "Unable to create index writer for {} (lock file is in use: {e}). \
                     Recycle the process holding {} to free it.",
                    directory.display(),
                    path.display()
                ))
            })?;
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| {
                if e.kind() == ErrorKind::AlreadyExists {
                    FolioError::lock_contention(format!(
                        "lock marker {} was recreated by another writer",
                        path.display()
                    ))
                } else {
                    FolioError::Io(e)
                }
            })?;

        let info = LockInfo {
            token: Uuid::new_v4().to_string(),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };
        let body = serde_json::to_vec(&info)?;
        file.write_all(&body)?;
        file.sync_all()?;

        held.insert(key.clone());
        debug!("Acquired lock marker {} ({})", path.display(), info.token);

        Ok(WriteLock {
            path,
            key,
            info,
            released: false,
        })
    }

    /// Remove the marker and forget the directory.
    pub fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        HELD_DIRECTORIES.lock().remove(&self.key);

        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FolioError::storage(format!(
                "Failed to release lock marker {}: {e}",
                self.path.display()
            ))),
        }
    }

    /// Diagnostic contents of this marker.
    pub fn info(&self) -> &LockInfo {
        &self.info
    }

    /// Path of the marker file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether this process holds a writer for `directory`.
    pub fn is_held(directory: &Path) -> bool {
        HELD_DIRECTORIES.lock().contains(&registry_key(directory))
    }

    /// Read the diagnostic contents of whatever marker is on disk.
    pub fn read_info(directory: &Path) -> Option<LockInfo> {
        let bytes = fs::read(directory.join(WRITE_LOCK_NAME)).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("{e}");
        }
    }
}

fn registry_key(directory: &Path) -> PathBuf {
    fs::canonicalize(directory).unwrap_or_else(|_| directory.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_and_release() {
        let temp_dir = TempDir::new().unwrap();
        let mut lock = WriteLock::acquire(temp_dir.path()).unwrap();

        assert!(lock.path().exists());
        assert!(WriteLock::is_held(temp_dir.path()));
        let info = WriteLock::read_info(temp_dir.path()).unwrap();
        assert_eq!(&info, lock.info());
        assert_eq!(info.pid, std::process::id());

        lock.release().unwrap();
        assert!(!temp_dir.path().join(WRITE_LOCK_NAME).exists());
        assert!(!WriteLock::is_held(temp_dir.path()));
    }

    #[test]
    fn test_second_writer_in_process_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let _lock = WriteLock::acquire(temp_dir.path()).unwrap();

        let err = WriteLock::acquire(temp_dir.path()).unwrap_err();
        assert!(matches!(err, FolioError::LockContention(_)));
        // The live marker is untouched
        assert!(temp_dir.path().join(WRITE_LOCK_NAME).exists());
    }

    #[test]
    fn test_stale_marker_is_removed() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(WRITE_LOCK_NAME), b"left by a crash").unwrap();

        let lock = WriteLock::acquire(temp_dir.path()).unwrap();
        assert!(WriteLock::read_info(temp_dir.path()).is_some());
        drop(lock);

        assert!(!temp_dir.path().join(WRITE_LOCK_NAME).exists());
    }

    #[test]
    fn test_unremovable_marker_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        // A directory in place of the marker cannot be removed as a file
        fs::create_dir(temp_dir.path().join(WRITE_LOCK_NAME)).unwrap();

        let err = WriteLock::acquire(temp_dir.path()).unwrap_err();
        assert!(matches!(err, FolioError::InvalidConfiguration(_)));
        assert!(err.to_string().contains("lock file is in use"));
        assert!(!WriteLock::is_held(temp_dir.path()));
    }
}
