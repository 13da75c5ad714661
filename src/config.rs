//! Index service configuration.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use folio::config::IndexConfig;
//!
//! let config = IndexConfig::new("/var/lib/folio/files")
//!     .with_refresh_ttl(Duration::from_secs(5))
//!     .with_key_field("id");
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.refresh_ttl(), Duration::from_secs(5));
//! assert_eq!(config.retention_cutoff(), Duration::from_secs(50));
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::analysis::registry::FieldAnalyzerRegistry;
use crate::error::{FolioError, Result};

/// Default staleness TTL in milliseconds.
pub const DEFAULT_REFRESH_TTL_MS: u64 = 10_000;

/// Default multiple of the TTL after which idle retained snapshots are evicted.
pub const DEFAULT_RETENTION_MULTIPLIER: u32 = 10;

/// Default number of segments compaction merges down to.
pub const DEFAULT_MAX_MERGE_SEGMENTS: usize = 4;

/// Default in-memory write buffer budget (64 MiB).
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 64 * 1024 * 1024;

/// Default key field used for replace-on-add.
pub const DEFAULT_KEY_FIELD: &str = "id";

/// Configuration for one index directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Directory holding the segment files and the lock marker.
    pub index_dir: PathBuf,

    /// Minimum time between automatic snapshot refresh checks.
    pub refresh_ttl_ms: u64,

    /// Retained snapshots idle for longer than `refresh_ttl × retention_multiplier`
    /// are evicted on refresh.
    pub retention_multiplier: u32,

    /// After a commit the next refresh deadline is pulled in to at most
    /// `now + commit_refresh_delay_ms`.
    pub commit_refresh_delay_ms: u64,

    /// Segment count compaction merges down to.
    pub max_merge_segments: usize,

    /// Memory budget of the writer's in-memory buffer.
    pub max_buffer_bytes: usize,

    /// Field whose value identifies a document for replace-on-add.
    pub key_field: String,

    /// Per-field analysis strategies.
    pub analyzers: FieldAnalyzerRegistry,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            index_dir: PathBuf::new(),
            refresh_ttl_ms: DEFAULT_REFRESH_TTL_MS,
            retention_multiplier: DEFAULT_RETENTION_MULTIPLIER,
            commit_refresh_delay_ms: 0,
            max_merge_segments: DEFAULT_MAX_MERGE_SEGMENTS,
            max_buffer_bytes: DEFAULT_MAX_BUFFER_BYTES,
            key_field: DEFAULT_KEY_FIELD.to_string(),
            analyzers: FieldAnalyzerRegistry::for_files(),
        }
    }
}

impl IndexConfig {
    /// Create a configuration for the given directory with default settings.
    pub fn new<P: AsRef<Path>>(index_dir: P) -> Self {
        IndexConfig {
            index_dir: index_dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Load a configuration from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            FolioError::invalid_config(format!(
                "cannot read configuration {}: {e}",
                path.display()
            ))
        })?;
        let config: IndexConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants every service relies on.
    pub fn validate(&self) -> Result<()> {
        if self.index_dir.as_os_str().is_empty() {
            return Err(FolioError::invalid_config(
                "index location is empty; set index_dir to the index directory",
            ));
        }
        if self.refresh_ttl_ms == 0 {
            return Err(FolioError::invalid_config(
                "refresh_ttl_ms must be greater than zero",
            ));
        }
        if self.retention_multiplier == 0 {
            return Err(FolioError::invalid_config(
                "retention_multiplier must be at least 1",
            ));
        }
        if self.max_merge_segments == 0 {
            return Err(FolioError::invalid_config(
                "max_merge_segments must be at least 1",
            ));
        }
        if self.key_field.trim().is_empty() {
            return Err(FolioError::invalid_config("key_field is empty"));
        }
        Ok(())
    }

    pub fn with_refresh_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_ttl_ms = ttl.as_millis() as u64;
        self
    }

    pub fn with_retention_multiplier(mut self, multiplier: u32) -> Self {
        self.retention_multiplier = multiplier;
        self
    }

    pub fn with_commit_refresh_delay(mut self, delay: Duration) -> Self {
        self.commit_refresh_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_max_merge_segments(mut self, segments: usize) -> Self {
        self.max_merge_segments = segments;
        self
    }

    pub fn with_max_buffer_bytes(mut self, bytes: usize) -> Self {
        self.max_buffer_bytes = bytes;
        self
    }

    pub fn with_key_field<S: Into<String>>(mut self, key_field: S) -> Self {
        self.key_field = key_field.into();
        self
    }

    pub fn with_analyzers(mut self, analyzers: FieldAnalyzerRegistry) -> Self {
        self.analyzers = analyzers;
        self
    }

    /// The staleness TTL.
    pub fn refresh_ttl(&self) -> Duration {
        Duration::from_millis(self.refresh_ttl_ms)
    }

    /// Idle time after which a retained snapshot is evicted.
    pub fn retention_cutoff(&self) -> Duration {
        self.refresh_ttl() * self.retention_multiplier
    }

    /// Grace window applied after a commit.
    pub fn commit_refresh_delay(&self) -> Duration {
        Duration::from_millis(self.commit_refresh_delay_ms)
    }
}
