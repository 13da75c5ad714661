//! The single mutable writer of an index directory.
//!
//! New documents go into an in-memory buffer segment. A commit freezes the
//! buffer into a segment file, writes the deletion files that changed and
//! atomically replaces the commit point. Files no longer referenced by the
//! commit point are removed afterwards.
//!
//! The writer owns the directory's `write.lock` for its whole life; dropping
//! or closing it releases the marker.

use std::sync::Arc;

use bit_vec::BitVec;
use chrono::Utc;
use log::{debug, info, warn};

use crate::analysis::registry::FieldAnalyzerRegistry;
use crate::config::IndexConfig;
use crate::document::document::IndexDocument;
use crate::error::{FolioError, Result};
use crate::index::manifest::{MANIFEST_NAME, Manifest, SegmentMeta};
use crate::index::reader::{IndexSnapshot, SegmentView};
use crate::index::segment::{Segment, read_deletions, write_deletions};
use crate::query::filter::Filter;
use crate::storage::lock::{WRITE_LOCK_NAME, WriteLock};
use crate::storage::traits::Storage;

/// A committed segment and its current deletion bits.
#[derive(Debug)]
struct CommittedSegment {
    meta: SegmentMeta,
    segment: Arc<Segment>,
    deleted: Arc<BitVec>,
    /// Deletions changed since the last commit.
    deletes_dirty: bool,
}

impl CommittedSegment {
    fn view(&self) -> SegmentView {
        SegmentView::new(Arc::clone(&self.segment), Arc::clone(&self.deleted))
    }
}

/// Writer statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Committed segments.
    pub segments: usize,
    /// Documents in the write buffer, deleted ones included.
    pub buffered_docs: u32,
    /// Memory used by the write buffer.
    pub buffered_bytes: usize,
    /// Commit generation.
    pub generation: u64,
}

/// The mutable writer of one index directory.
pub struct IndexWriter {
    /// The storage backend.
    storage: Arc<dyn Storage>,

    /// Per-field analysis.
    registry: FieldAnalyzerRegistry,

    /// Field identifying documents for replace-on-add.
    key_field: String,

    /// Budget of the write buffer.
    max_buffer_bytes: usize,

    /// The held lock marker.
    lock: WriteLock,

    /// Generation of the last commit.
    generation: u64,

    next_segment_id: u64,

    committed: Vec<CommittedSegment>,

    /// Documents added since the last commit.
    buffer: Arc<Segment>,

    buffer_deleted: Arc<BitVec>,

    /// Incremented by every change, visible or not.
    version: u64,

    /// Uncommitted changes exist.
    dirty: bool,

    /// Snapshot handed out at the current version.
    live_reader: Option<Arc<IndexSnapshot>>,
}

impl std::fmt::Debug for IndexWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexWriter")
            .field("location", &self.storage.location())
            .field("generation", &self.generation)
            .field("version", &self.version)
            .field("segments", &self.committed.len())
            .field("buffered_docs", &self.buffer.doc_count())
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl IndexWriter {
    /// Claim the directory and load its last commit point.
    ///
    /// The directory is created if needed. A stale lock marker is removed;
    /// a marker that cannot be removed fails with `InvalidConfiguration`.
    pub fn open(storage: Arc<dyn Storage>, config: &IndexConfig) -> Result<IndexWriter> {
        storage.ensure_exists()?;
        let lock = WriteLock::acquire(storage.location())?;

        let manifest = Manifest::load(storage.as_ref())?;
        let fresh = manifest.is_none();
        let manifest = manifest.unwrap_or_default();

        let mut committed = Vec::with_capacity(manifest.segments.len());
        for meta in &manifest.segments {
            let segment = Segment::read_from(storage.as_ref(), meta.id)?;
            let deleted = read_deletions(storage.as_ref(), meta.id, meta.del_gen, meta.doc_count)?;
            committed.push(CommittedSegment {
                meta: meta.clone(),
                segment: Arc::new(segment),
                deleted: Arc::new(deleted),
                deletes_dirty: false,
            });
        }

        let mut writer = IndexWriter {
            storage,
            registry: config.analyzers.clone(),
            key_field: config.key_field.clone(),
            max_buffer_bytes: config.max_buffer_bytes,
            lock,
            generation: manifest.generation,
            next_segment_id: manifest.next_segment_id,
            committed,
            buffer: Arc::new(Segment::new(0)),
            buffer_deleted: Arc::new(BitVec::new()),
            version: 1,
            dirty: false,
            live_reader: None,
        };

        // An empty commit point marks the directory as an index right away
        if fresh {
            writer.dirty = true;
            writer.commit()?;
        }

        info!(
            "Opened index writer for {} at generation {} ({} segments)",
            writer.storage.location().display(),
            writer.generation,
            writer.committed.len()
        );
        Ok(writer)
    }

    pub fn key_field(&self) -> &str {
        &self.key_field
    }

    pub fn registry(&self) -> &FieldAnalyzerRegistry {
        &self.registry
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether uncommitted changes exist.
    pub fn has_pending_changes(&self) -> bool {
        self.dirty
    }

    pub fn stats(&self) -> WriterStats {
        WriterStats {
            segments: self.committed.len(),
            buffered_docs: self.buffer.doc_count(),
            buffered_bytes: self.buffer.estimated_bytes(),
            generation: self.generation,
        }
    }

    /// Whether any document, committed or buffered, is marked deleted.
    pub fn has_deletions(&self) -> bool {
        self.committed
            .iter()
            .any(|c| c.deleted.any())
            || self.buffer_deleted.any()
    }

    /// Add a document, replacing earlier documents with the same key.
    ///
    /// Fails with `ResourceExhausted` when the document does not fit into the
    /// write buffer; nothing is changed in that case.
    pub fn add_document(&mut self, doc: &IndexDocument) -> Result<()> {
        if doc.is_empty() {
            return Ok(());
        }

        let needed = doc.estimated_size();
        let used = self.buffer.estimated_bytes();
        if used.saturating_add(needed) > self.max_buffer_bytes {
            return Err(FolioError::resource_exhausted(format!(
                "write buffer of {} is full ({used} of {} bytes used, document needs {needed})",
                self.storage.location().display(),
                self.max_buffer_bytes
            )));
        }

        if let Some(key) = doc.key(&self.key_field) {
            self.delete_by_key(&key);
        }

        Arc::make_mut(&mut self.buffer).add_document(doc, &self.registry, &self.key_field)?;
        Arc::make_mut(&mut self.buffer_deleted).push(false);
        self.touch();
        Ok(())
    }

    /// Replace the document carrying the same key.
    ///
    /// Unlike [`IndexWriter::add_document`] the document must have a key.
    pub fn update_document(&mut self, doc: &IndexDocument) -> Result<()> {
        if doc.key(&self.key_field).is_none() {
            return Err(FolioError::invalid_argument(format!(
                "document has no '{}' field to update by",
                self.key_field
            )));
        }
        self.add_document(doc)
    }

    /// Delete every document carrying `key`. Returns the number deleted.
    pub fn delete_by_key(&mut self, key: &str) -> usize {
        let mut deleted = 0;

        for committed in &mut self.committed {
            let locals = committed.segment.docs_with_key(key);
            let newly = mark_deleted(&mut committed.deleted, locals);
            if newly > 0 {
                committed.deletes_dirty = true;
                deleted += newly;
            }
        }

        let locals: Vec<u32> = self.buffer.docs_with_key(key).to_vec();
        deleted += mark_deleted(&mut self.buffer_deleted, &locals);

        if deleted > 0 {
            self.touch();
        }
        deleted
    }

    /// Delete every document matching a filter. Returns the number deleted.
    ///
    /// An empty filter deletes everything.
    pub fn delete_documents(&mut self, filter: &Filter) -> Result<usize> {
        let mut deleted = 0;

        for committed in &mut self.committed {
            let matching = filter.matching_docs(&committed.segment, &self.registry)?;
            let locals: Vec<u32> = set_bits(&matching).collect();
            let newly = mark_deleted(&mut committed.deleted, &locals);
            if newly > 0 {
                committed.deletes_dirty = true;
                deleted += newly;
            }
        }

        let matching = filter.matching_docs(&self.buffer, &self.registry)?;
        let locals: Vec<u32> = set_bits(&matching).collect();
        deleted += mark_deleted(&mut self.buffer_deleted, &locals);

        if deleted > 0 {
            debug!(
                "Deleted {deleted} documents from {}",
                self.storage.location().display()
            );
            self.touch();
        }
        Ok(deleted)
    }

    /// Remove every document, committed or buffered.
    pub fn delete_all(&mut self) {
        self.committed.clear();
        self.reset_buffer();
        self.touch();
        info!(
            "Cleared all documents of {}",
            self.storage.location().display()
        );
    }

    /// Make pending changes durable. Returns whether anything was written.
    pub fn commit(&mut self) -> Result<bool> {
        if !self.dirty {
            return Ok(false);
        }

        self.flush_buffer()?;

        for committed in &mut self.committed {
            if !committed.deletes_dirty {
                continue;
            }
            let generation = committed.meta.del_gen + 1;
            write_deletions(
                self.storage.as_ref(),
                committed.meta.id,
                generation,
                &committed.deleted,
            )?;
            committed.meta.del_gen = generation;
            committed.meta.deleted_count = count_set(&committed.deleted);
            committed.deletes_dirty = false;
        }

        // Segments with no live documents are not worth keeping
        self.committed
            .retain(|c| c.meta.deleted_count < c.meta.doc_count);

        let manifest = Manifest {
            generation: self.generation + 1,
            next_segment_id: self.next_segment_id,
            segments: self.committed.iter().map(|c| c.meta.clone()).collect(),
            committed_at: Some(Utc::now()),
        };
        manifest.save(self.storage.as_ref())?;

        self.generation = manifest.generation;
        self.dirty = false;
        self.version += 1;
        debug!(
            "Committed {} at generation {} ({} segments, {} docs)",
            self.storage.location().display(),
            manifest.generation,
            manifest.segments.len(),
            manifest.num_docs()
        );

        self.remove_unreferenced_files(&manifest);
        Ok(true)
    }

    /// Merge segments until at most `max_segments` remain, dropping deleted
    /// documents on the way. Pending changes are committed first and the
    /// result is committed. Returns whether a merge happened.
    pub fn merge(&mut self, max_segments: usize) -> Result<bool> {
        self.commit()?;
        let max_segments = max_segments.max(1);

        let mut chosen: Vec<usize> = Vec::new();
        let mut clean: Vec<usize> = Vec::new();
        for (i, committed) in self.committed.iter().enumerate() {
            if committed.meta.has_deletions() {
                chosen.push(i);
            } else {
                clean.push(i);
            }
        }
        clean.sort_by_key(|&i| self.committed[i].meta.live_count());

        let mut clean = clean.into_iter();
        while self.committed.len() - chosen.len() + usize::from(!chosen.is_empty()) > max_segments
            || chosen.len() == 1 && !self.committed[chosen[0]].meta.has_deletions()
        {
            match clean.next() {
                Some(i) => chosen.push(i),
                None => break,
            }
        }

        let worthwhile = chosen.len() > 1
            || chosen
                .first()
                .is_some_and(|&i| self.committed[i].meta.has_deletions());
        if !worthwhile {
            return Ok(false);
        }
        chosen.sort_unstable();

        let id = self.allocate_segment_id();
        let parts: Vec<(&Segment, &BitVec)> = chosen
            .iter()
            .map(|&i| (self.committed[i].segment.as_ref(), self.committed[i].deleted.as_ref()))
            .collect();
        let merged = Segment::merge(id, &parts);

        let position = chosen[0];
        let mut index = 0;
        self.committed.retain(|_| {
            let keep = chosen.binary_search(&index).is_err();
            index += 1;
            keep
        });

        if !merged.is_empty() {
            merged.write_to(self.storage.as_ref())?;
            let doc_count = merged.doc_count();
            self.committed.insert(
                position.min(self.committed.len()),
                CommittedSegment {
                    meta: SegmentMeta {
                        id,
                        doc_count,
                        deleted_count: 0,
                        del_gen: 0,
                    },
                    segment: Arc::new(merged),
                    deleted: Arc::new(BitVec::from_elem(doc_count as usize, false)),
                    deletes_dirty: false,
                },
            );
        }

        info!(
            "Merged {} segments of {} into seg_{id:08}",
            chosen.len(),
            self.storage.location().display()
        );
        self.touch();
        self.commit()?;
        Ok(true)
    }

    /// A snapshot of everything added so far, uncommitted documents included.
    ///
    /// The same snapshot is returned until the writer changes.
    pub fn open_reader(&mut self) -> Arc<IndexSnapshot> {
        if let Some(reader) = &self.live_reader {
            if reader.version() == self.version {
                return Arc::clone(reader);
            }
        }

        let mut views: Vec<SegmentView> = self.committed.iter().map(CommittedSegment::view).collect();
        if !self.buffer.is_empty() {
            views.push(SegmentView::new(
                Arc::clone(&self.buffer),
                Arc::clone(&self.buffer_deleted),
            ));
        }

        let reader = Arc::new(IndexSnapshot::from_views(self.generation, self.version, views));
        self.live_reader = Some(Arc::clone(&reader));
        reader
    }

    /// Commit and release the lock marker.
    pub fn close(mut self) -> Result<()> {
        let committed = self.commit();
        let released = self.lock.release();
        info!(
            "Closed index writer for {}",
            self.storage.location().display()
        );
        committed?;
        released
    }

    fn touch(&mut self) {
        self.version += 1;
        self.dirty = true;
    }

    fn allocate_segment_id(&mut self) -> u64 {
        let id = self.next_segment_id;
        self.next_segment_id += 1;
        id
    }

    fn reset_buffer(&mut self) {
        self.buffer = Arc::new(Segment::new(0));
        self.buffer_deleted = Arc::new(BitVec::new());
    }

    /// Turn the buffer into a committed segment.
    fn flush_buffer(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let doc_count = self.buffer.doc_count();
        let deleted_count = count_set(&self.buffer_deleted);
        if deleted_count == doc_count {
            self.reset_buffer();
            return Ok(());
        }

        let id = self.allocate_segment_id();
        Arc::make_mut(&mut self.buffer).set_id(id);
        self.buffer.write_to(self.storage.as_ref())?;

        let mut meta = SegmentMeta {
            id,
            doc_count,
            deleted_count,
            del_gen: 0,
        };
        if deleted_count > 0 {
            write_deletions(self.storage.as_ref(), id, 1, &self.buffer_deleted)?;
            meta.del_gen = 1;
        }

        let segment = std::mem::replace(&mut self.buffer, Arc::new(Segment::new(0)));
        let deleted = std::mem::replace(&mut self.buffer_deleted, Arc::new(BitVec::new()));
        self.committed.push(CommittedSegment {
            meta,
            segment,
            deleted,
            deletes_dirty: false,
        });
        Ok(())
    }

    fn remove_unreferenced_files(&self, manifest: &Manifest) {
        let files = match self.storage.list_files() {
            Ok(files) => files,
            Err(e) => {
                warn!("Cannot list {} for cleanup: {e}", self.storage.location().display());
                return;
            }
        };

        let referenced = manifest.referenced_files();
        for name in files {
            let ours = name.starts_with("seg_") || name == MANIFEST_NAME;
            if !ours || name == WRITE_LOCK_NAME || referenced.contains(&name) {
                continue;
            }
            if let Err(e) = self.storage.delete_file(&name) {
                warn!("Cannot remove unreferenced file {name}: {e}");
            }
        }
    }
}

impl Drop for IndexWriter {
    fn drop(&mut self) {
        if self.dirty {
            warn!(
                "Index writer for {} dropped with uncommitted changes",
                self.storage.location().display()
            );
        }
    }
}

/// Set the bits of `locals`; returns how many were not set before.
fn mark_deleted(deleted: &mut Arc<BitVec>, locals: &[u32]) -> usize {
    let fresh: Vec<usize> = locals
        .iter()
        .map(|&local| local as usize)
        .filter(|&local| !deleted.get(local).unwrap_or(true))
        .collect();
    if fresh.is_empty() {
        return 0;
    }

    let bits = Arc::make_mut(deleted);
    for &local in &fresh {
        bits.set(local, true);
    }
    fresh.len()
}

fn set_bits(bits: &BitVec) -> impl Iterator<Item = u32> + '_ {
    bits.iter()
        .enumerate()
        .filter(|(_, set)| *set)
        .map(|(i, _)| i as u32)
}

fn count_set(bits: &BitVec) -> u32 {
    bits.iter().filter(|bit| *bit).count() as u32
}
