//! Error types for the Folio library.
//!
//! All fallible operations return [`Result`], whose error side is the
//! [`FolioError`] enum. The variants mirror the conditions an index service
//! can run into: configuration problems detected at construction, an index
//! directory that was never initialized, lock contention on the write marker,
//! an exhausted write buffer, use after teardown, and malformed query text.
//!
//! # Examples
//!
//! ```
//! use folio::error::{FolioError, Result};
//!
//! fn open(dir: &str) -> Result<()> {
//!     if dir.is_empty() {
//!         return Err(FolioError::invalid_config("index directory is empty"));
//!     }
//!     Ok(())
//! }
//!
//! assert!(open("").is_err());
//! ```

use std::io;

use thiserror::Error;

/// The main error type for Folio operations.
#[derive(Error, Debug)]
pub enum FolioError {
    /// I/O errors (file operations, directory listing, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Missing or invalid configuration. Fatal at construction time.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The index directory is missing or empty.
    #[error("Index uninitialized: {0}")]
    IndexUninitialized(String),

    /// The write lock marker is held by a live writer.
    #[error("Lock contention: {0}")]
    LockContention(String),

    /// The writer ran out of buffer memory while appending a document.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The index service has been torn down.
    #[error("Index service is disposed: {0}")]
    Disposed(String),

    /// Free-text query could not be parsed.
    #[error("Malformed query: {0}")]
    MalformedQuery(String),

    /// Index-related errors (segment format, manifest, merges)
    #[error("Index error: {0}")]
    Index(String),

    /// Analysis-related errors (tokenization, filtering, etc.)
    #[error("Analysis error: {0}")]
    Analysis(String),

    /// Query-related errors other than parsing.
    #[error("Query error: {0}")]
    Query(String),

    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid argument passed by the caller.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Binary serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for operations that may fail with FolioError.
pub type Result<T> = std::result::Result<T, FolioError>;

impl FolioError {
    /// Create a new invalid configuration error.
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        FolioError::InvalidConfiguration(msg.into())
    }

    /// Create a new uninitialized index error.
    pub fn uninitialized<S: Into<String>>(msg: S) -> Self {
        FolioError::IndexUninitialized(msg.into())
    }

    /// Create a new lock contention error.
    pub fn lock_contention<S: Into<String>>(msg: S) -> Self {
        FolioError::LockContention(msg.into())
    }

    /// Create a new resource exhaustion error.
    pub fn resource_exhausted<S: Into<String>>(msg: S) -> Self {
        FolioError::ResourceExhausted(msg.into())
    }

    /// Create a new disposed error.
    pub fn disposed<S: Into<String>>(msg: S) -> Self {
        FolioError::Disposed(msg.into())
    }

    /// Create a new malformed query error.
    pub fn malformed_query<S: Into<String>>(msg: S) -> Self {
        FolioError::MalformedQuery(msg.into())
    }

    /// Create a new index error.
    pub fn index<S: Into<String>>(msg: S) -> Self {
        FolioError::Index(msg.into())
    }

    /// Create a new analysis error.
    pub fn analysis<S: Into<String>>(msg: S) -> Self {
        FolioError::Analysis(msg.into())
    }

    /// Create a new query error.
    pub fn query<S: Into<String>>(msg: S) -> Self {
        FolioError::Query(msg.into())
    }

    /// Create a new storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        FolioError::Storage(msg.into())
    }

    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        FolioError::InvalidArgument(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        FolioError::Other(msg.into())
    }

    /// Whether this condition is handled locally with one bounded retry.
    ///
    /// Stale locks, a single buffer exhaustion and an unparsable query are
    /// recovered in place; everything else propagates to the caller.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FolioError::LockContention(_)
                | FolioError::ResourceExhausted(_)
                | FolioError::MalformedQuery(_)
        )
    }

    /// Whether this error means the service was torn down.
    pub fn is_disposed(&self) -> bool {
        matches!(self, FolioError::Disposed(_))
    }
}
