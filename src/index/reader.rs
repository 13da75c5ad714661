//! Point-in-time snapshots of an index.
//!
//! An [`IndexSnapshot`] pins a list of segments together with the deletion
//! bits that applied when it was taken. Segments and bits are shared through
//! `Arc`s and never mutated afterwards, so a snapshot's visible document set is
//! fixed for its whole life and it can be queried from any number of threads.
//!
//! Documents are addressed by a global id: the segment's base plus the
//! segment-local id.

use std::sync::Arc;

use bit_vec::BitVec;
use log::debug;

use crate::document::field::FieldValue;
use crate::document::stored::StoredDocument;
use crate::error::Result;
use crate::index::manifest::Manifest;
use crate::index::segment::{Segment, read_deletions};
use crate::storage::traits::Storage;

/// A segment as seen by one snapshot.
#[derive(Debug, Clone)]
pub struct SegmentView {
    segment: Arc<Segment>,
    deleted: Arc<BitVec>,
    base: u32,
}

impl SegmentView {
    pub fn new(segment: Arc<Segment>, deleted: Arc<BitVec>) -> Self {
        SegmentView {
            segment,
            deleted,
            base: 0,
        }
    }

    pub fn segment(&self) -> &Segment {
        &self.segment
    }

    pub fn deleted(&self) -> &BitVec {
        &self.deleted
    }

    /// Global id of the segment's first document.
    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn is_deleted(&self, local: u32) -> bool {
        self.deleted.get(local as usize).unwrap_or(false)
    }

    pub fn deleted_count(&self) -> u32 {
        self.deleted.iter().filter(|bit| *bit).count() as u32
    }

    pub fn live_count(&self) -> u32 {
        self.segment.doc_count() - self.deleted_count()
    }
}

/// An immutable, queryable view over the index.
#[derive(Debug)]
pub struct IndexSnapshot {
    generation: u64,
    version: u64,
    segments: Vec<SegmentView>,
    max_doc: u32,
    num_docs: u32,
}

impl IndexSnapshot {
    /// Assemble a snapshot from segment views in document order.
    ///
    /// `generation` is the commit point the views derive from and `version`
    /// the writer's change counter (0 for snapshots opened from storage).
    pub fn from_views(generation: u64, version: u64, mut segments: Vec<SegmentView>) -> Self {
        let mut base = 0u32;
        let mut num_docs = 0u32;
        for view in &mut segments {
            view.base = base;
            base += view.segment.doc_count();
            num_docs += view.live_count();
        }

        IndexSnapshot {
            generation,
            version,
            segments,
            max_doc: base,
            num_docs,
        }
    }

    /// A snapshot with no documents.
    pub fn empty() -> Self {
        Self::from_views(0, 0, Vec::new())
    }

    /// Open the last commit point directly from storage.
    ///
    /// A commit may remove files between reading the commit point and
    /// loading its segments; when that happens the newer commit point is read
    /// once more.
    pub fn open(storage: &dyn Storage) -> Result<IndexSnapshot> {
        let mut retried = false;
        loop {
            let Some(manifest) = Manifest::load(storage)? else {
                return Ok(Self::empty());
            };

            match Self::load_segments(storage, &manifest) {
                Ok(views) => {
                    debug!(
                        "Opened snapshot of {} at generation {} ({} segments)",
                        storage.location().display(),
                        manifest.generation,
                        views.len()
                    );
                    return Ok(Self::from_views(manifest.generation, 0, views));
                }
                Err(e) => {
                    let current = Manifest::load(storage)?.map(|m| m.generation);
                    if retried || current == Some(manifest.generation) {
                        return Err(e);
                    }
                    retried = true;
                }
            }
        }
    }

    fn load_segments(storage: &dyn Storage, manifest: &Manifest) -> Result<Vec<SegmentView>> {
        manifest
            .segments
            .iter()
            .map(|meta| {
                let segment = Segment::read_from(storage, meta.id)?;
                let deleted = read_deletions(storage, meta.id, meta.del_gen, meta.doc_count)?;
                Ok(SegmentView::new(Arc::new(segment), Arc::new(deleted)))
            })
            .collect()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn segments(&self) -> &[SegmentView] {
        &self.segments
    }

    /// Document slots, including deleted ones.
    pub fn max_doc(&self) -> u32 {
        self.max_doc
    }

    /// Searchable documents.
    pub fn num_docs(&self) -> u32 {
        self.num_docs
    }

    pub fn has_deletions(&self) -> bool {
        self.num_docs < self.max_doc
    }

    /// Whether two snapshots show the same point in time.
    pub fn same_point(&self, other: &IndexSnapshot) -> bool {
        self.generation == other.generation && self.version == other.version
    }

    /// Find the segment holding a global id and the local id inside it.
    pub fn resolve(&self, global: u32) -> Option<(&SegmentView, u32)> {
        if global >= self.max_doc {
            return None;
        }
        let index = self
            .segments
            .partition_point(|view| view.base <= global)
            .checked_sub(1)?;
        let view = &self.segments[index];
        Some((view, global - view.base))
    }

    pub fn is_live(&self, global: u32) -> bool {
        self.resolve(global)
            .map(|(view, local)| !view.is_deleted(local))
            .unwrap_or(false)
    }

    /// Stored fields of a document.
    pub fn document(&self, global: u32) -> Option<&StoredDocument> {
        let (view, local) = self.resolve(global)?;
        view.segment.doc(local).map(|doc| &doc.stored)
    }

    /// Sortable value of a field.
    pub fn sort_value(&self, global: u32, field: &str) -> Option<&FieldValue> {
        let (view, local) = self.resolve(global)?;
        view.segment.value(local, field)
    }

    /// Number of documents containing a term, deleted slots included.
    pub fn doc_freq(&self, field: &str, term: &str) -> u32 {
        self.segments
            .iter()
            .map(|view| view.segment.postings(field, term).len() as u32)
            .sum()
    }

    /// Average length of a field over all document slots.
    pub fn average_field_length(&self, field: &str) -> f32 {
        if self.max_doc == 0 {
            return 0.0;
        }
        let total: u64 = self
            .segments
            .iter()
            .map(|view| view.segment.total_length(field))
            .sum();
        total as f32 / self.max_doc as f32
    }
}
