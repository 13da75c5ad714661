//! Storage layer for index directories.
//!
//! - [`traits::Storage`] - Named-file store plus the "initialized" and
//!   modification-stamp signals the service depends on
//! - [`file::FileStorage`] - Local directory implementation
//! - [`structured`] - Checksummed framing used by segment and deletion files
//! - [`lock::WriteLock`] - The `write.lock` marker with stale-lock recovery

pub mod file;
pub mod lock;
pub mod structured;
pub mod traits;

pub use file::FileStorage;
pub use lock::{WRITE_LOCK_NAME, WriteLock};
pub use traits::{Storage, StorageError, StorageInput, StorageOutput};
