//! The commit point: which segments and deletion files make up the index.
//!
//! `segments.json` is replaced atomically on every commit (write a temporary
//! file, rename it over the old one, sync the directory), so a reader always
//! sees either the previous or the new commit point.

use std::io::{Read, Write};

use ahash::AHashSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::index::segment::{deletions_file_name, segment_file_name};
use crate::storage::traits::Storage;

/// File name of the commit point.
pub const MANIFEST_NAME: &str = "segments.json";

const MANIFEST_TEMP_NAME: &str = "segments.json.tmp";

/// One committed segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentMeta {
    pub id: u64,
    pub doc_count: u32,
    pub deleted_count: u32,
    /// Generation of the current `.del` file; 0 when nothing is deleted.
    pub del_gen: u64,
}

impl SegmentMeta {
    pub fn live_count(&self) -> u32 {
        self.doc_count.saturating_sub(self.deleted_count)
    }

    pub fn has_deletions(&self) -> bool {
        self.deleted_count > 0
    }

    /// Files this segment is made of.
    pub fn file_names(&self) -> Vec<String> {
        let mut names = vec![segment_file_name(self.id)];
        if self.del_gen > 0 {
            names.push(deletions_file_name(self.id, self.del_gen));
        }
        names
    }
}

/// A commit point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Incremented by every commit.
    pub generation: u64,

    /// Id the next new segment is written under.
    pub next_segment_id: u64,

    pub segments: Vec<SegmentMeta>,

    pub committed_at: Option<DateTime<Utc>>,
}

impl Manifest {
    /// Read the commit point, or `None` if nothing was ever committed.
    pub fn load(storage: &dyn Storage) -> Result<Option<Manifest>> {
        if !storage.file_exists(MANIFEST_NAME) {
            return Ok(None);
        }

        let mut input = storage.open_input(MANIFEST_NAME)?;
        let mut content = Vec::new();
        input.read_to_end(&mut content)?;
        Ok(Some(serde_json::from_slice(&content)?))
    }

    /// Atomically replace the commit point.
    pub fn save(&self, storage: &dyn Storage) -> Result<()> {
        let content = serde_json::to_vec_pretty(self)?;

        let mut output = storage.create_output(MANIFEST_TEMP_NAME)?;
        output.write_all(&content)?;
        output.close()?;

        storage.rename_file(MANIFEST_TEMP_NAME, MANIFEST_NAME)?;
        storage.sync()
    }

    /// Every file the commit point refers to, itself included.
    pub fn referenced_files(&self) -> AHashSet<String> {
        let mut files: AHashSet<String> = self
            .segments
            .iter()
            .flat_map(SegmentMeta::file_names)
            .collect();
        files.insert(MANIFEST_NAME.to_string());
        files
    }

    /// Document slots, including deleted ones.
    pub fn max_doc(&self) -> u64 {
        self.segments.iter().map(|s| s.doc_count as u64).sum()
    }

    /// Searchable documents.
    pub fn num_docs(&self) -> u64 {
        self.segments.iter().map(|s| s.live_count() as u64).sum()
    }
}
