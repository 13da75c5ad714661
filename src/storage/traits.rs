//! Storage traits and storage-level errors.

use std::io::{Read, Seek, Write};
use std::path::Path;
use std::time::SystemTime;

use crate::error::{FolioError, Result};

/// A directory-like store of named files holding one index.
///
/// Besides plain file access, a store reports the two signals the service
/// relies on: whether the index is initialized (the directory exists and
/// holds at least one file) and the directory's modification stamp, which
/// the reader cache compares to decide whether a refresh is worthwhile.
pub trait Storage: Send + Sync + std::fmt::Debug {
    /// Root location, used in diagnostics.
    fn location(&self) -> &Path;

    /// Create the root location if it does not exist yet.
    fn ensure_exists(&self) -> Result<()>;

    /// Whether the location exists and contains at least one file.
    fn is_initialized(&self) -> bool;

    /// Modification time of the location itself.
    fn modification_stamp(&self) -> Result<Option<SystemTime>>;

    /// Open a file for reading.
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>>;

    /// Create (or truncate) a file for writing.
    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>>;

    /// Check if a file exists.
    fn file_exists(&self, name: &str) -> bool;

    /// Delete a file. Deleting a missing file succeeds.
    fn delete_file(&self, name: &str) -> Result<()>;

    /// List all file names, sorted.
    fn list_files(&self) -> Result<Vec<String>>;

    /// Get the size of a file in bytes.
    fn file_size(&self, name: &str) -> Result<u64>;

    /// Atomically rename a file, replacing any existing destination.
    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()>;

    /// Persist directory entries (new files, renames, deletions).
    fn sync(&self) -> Result<()>;
}

/// A trait for reading data from storage.
pub trait StorageInput: Read + Seek + Send + std::fmt::Debug {
    /// Get the size of the input stream.
    fn size(&self) -> Result<u64>;
}

/// A trait for writing data to storage.
pub trait StorageOutput: Write + Send + std::fmt::Debug {
    /// Flush and sync the output to storage.
    fn flush_and_sync(&mut self) -> Result<()>;

    /// Get the current position in the output stream.
    fn position(&self) -> u64;

    /// Close the output stream, syncing it first.
    fn close(&mut self) -> Result<()>;
}

impl StorageInput for Box<dyn StorageInput> {
    fn size(&self) -> Result<u64> {
        self.as_ref().size()
    }
}

impl StorageOutput for Box<dyn StorageOutput> {
    fn flush_and_sync(&mut self) -> Result<()> {
        self.as_mut().flush_and_sync()
    }

    fn position(&self) -> u64 {
        self.as_ref().position()
    }

    fn close(&mut self) -> Result<()> {
        self.as_mut().close()
    }
}

/// Error types specific to storage operations.
#[derive(Debug, Clone)]
pub enum StorageError {
    /// File not found.
    FileNotFound(String),

    /// Location missing or not a directory.
    InvalidLocation(String),

    /// I/O error.
    IoError(String),

    /// Stored data failed validation.
    Corrupted(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::FileNotFound(name) => write!(f, "File not found: {name}"),
            StorageError::InvalidLocation(path) => write!(f, "Invalid location: {path}"),
            StorageError::IoError(msg) => write!(f, "I/O error: {msg}"),
            StorageError::Corrupted(msg) => write!(f, "Corrupted data: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<StorageError> for FolioError {
    fn from(err: StorageError) -> Self {
        FolioError::storage(err.to_string())
    }
}
