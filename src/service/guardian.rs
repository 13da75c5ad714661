//! Lazy, recoverable ownership of the single [`IndexWriter`] of a directory.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwapOption;
use log::{debug, error, info, warn};
use parking_lot::{Mutex, MutexGuard, RwLock};

use crate::config::IndexConfig;
use crate::document::document::IndexDocument;
use crate::error::{FolioError, Result};
use crate::index::reader::IndexSnapshot;
use crate::index::writer::{IndexWriter, WriterStats};
use crate::query::filter::Filter;
use crate::service::disposal::DisposalGuard;
use crate::storage::traits::Storage;

/// Notified after every successful commit.
pub trait CommitListener: Send + Sync {
    fn on_commit(&self);
}

/// A snapshot handed out by [`WriterGuardian::open_live_reader`].
#[derive(Clone, Debug)]
pub enum LiveSnapshot {
    /// Everything the writer holds right now, committed or not.
    Current(Arc<IndexSnapshot>),
    /// The writer was busy; this is what it published at its last commit
    /// or merge.
    Published(Arc<IndexSnapshot>),
}

impl LiveSnapshot {
    pub fn snapshot(&self) -> &Arc<IndexSnapshot> {
        match self {
            LiveSnapshot::Current(snapshot) | LiveSnapshot::Published(snapshot) => snapshot,
        }
    }

    pub fn into_snapshot(self) -> Arc<IndexSnapshot> {
        match self {
            LiveSnapshot::Current(snapshot) | LiveSnapshot::Published(snapshot) => snapshot,
        }
    }

    pub fn is_current(&self) -> bool {
        matches!(self, LiveSnapshot::Current(_))
    }
}

/// Clears the flag when dropped, unwinding included.
struct FlagReset<'a>(&'a AtomicBool);

impl Drop for FlagReset<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Creates the writer on first use and recovers it after buffer exhaustion.
///
/// Every mutating call holds the writer lock for its whole duration, so a
/// disposal racing an add or commit waits for it to finish.
pub struct WriterGuardian {
    storage: Arc<dyn Storage>,
    config: IndexConfig,
    slot: Mutex<Option<IndexWriter>>,
    /// Mirrors `slot.is_some()` for lock-free checks.
    has_writer: AtomicBool,
    /// Latest snapshot of the writer, readable without the writer lock.
    live: ArcSwapOption<IndexSnapshot>,
    disposal: Arc<DisposalGuard>,
    listener: RwLock<Option<Weak<dyn CommitListener>>>,
    /// A background merge is running.
    optimizing: AtomicBool,
}

impl std::fmt::Debug for WriterGuardian {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterGuardian")
            .field("location", &self.storage.location())
            .field("has_writer", &self.has_writer())
            .field("disposed", &self.disposal.is_disposed())
            .finish()
    }
}

impl WriterGuardian {
    pub fn new(
        storage: Arc<dyn Storage>,
        config: IndexConfig,
        disposal: Arc<DisposalGuard>,
    ) -> Self {
        WriterGuardian {
            storage,
            config,
            slot: Mutex::new(None),
            has_writer: AtomicBool::new(false),
            live: ArcSwapOption::empty(),
            disposal,
            listener: RwLock::new(None),
            optimizing: AtomicBool::new(false),
        }
    }

    pub fn set_listener(&self, listener: Weak<dyn CommitListener>) {
        *self.listener.write() = Some(listener);
    }

    /// Whether the writer has been created.
    pub fn has_writer(&self) -> bool {
        self.has_writer.load(Ordering::Acquire)
    }

    /// Create the writer now if it does not exist yet.
    pub fn ensure_writer(&self) -> Result<()> {
        if self.has_writer() {
            return self.disposal.check("open the index writer");
        }
        self.lock_slot("open the index writer").map(|_| ())
    }

    /// Add a document, replacing any document with the same key.
    ///
    /// Documents without fields are ignored.
    pub fn add(&self, doc: &IndexDocument) -> Result<()> {
        self.disposal.check("add a document")?;
        if doc.is_empty() {
            return Ok(());
        }
        self.write("add a document", |writer| writer.add_document(doc))
    }

    /// Replace the document carrying the same key.
    pub fn update(&self, doc: &IndexDocument) -> Result<()> {
        self.write("update a document", |writer| writer.update_document(doc))
    }

    /// Delete every document matching `filter`.
    pub fn delete(&self, filter: &Filter) -> Result<usize> {
        self.write("delete documents", |writer| writer.delete_documents(filter))
    }

    pub fn delete_by_key(&self, key: &str) -> Result<usize> {
        self.write("delete a document", |writer| Ok(writer.delete_by_key(key)))
    }

    /// Delete the documents carrying any of `keys` in one hold of the
    /// writer lock, so either all of them are deleted or none are.
    pub fn delete_by_keys<S: AsRef<str>>(&self, keys: &[S]) -> Result<usize> {
        self.write("delete documents", |writer| {
            Ok(keys
                .iter()
                .map(|key| writer.delete_by_key(key.as_ref()))
                .sum())
        })
    }

    /// Remove every document if the directory holds an index.
    ///
    /// Returns false without touching anything otherwise. The removal becomes
    /// durable on the next commit.
    pub fn delete_all(&self) -> Result<bool> {
        self.disposal.check("clear the index")?;
        if !self.storage.is_initialized() {
            return Ok(false);
        }
        self.write("clear the index", |writer| {
            writer.delete_all();
            Ok(())
        })?;
        Ok(true)
    }

    /// Flush pending changes durably.
    ///
    /// A no-op before the writer exists. Returns whether anything was written.
    pub fn commit(&self) -> Result<bool> {
        self.disposal.check("commit")?;
        if !self.has_writer() {
            return Ok(false);
        }

        let committed = {
            let mut slot = self.slot.lock();
            self.disposal.check("commit")?;
            match slot.as_mut() {
                Some(writer) => {
                    let committed = writer.commit()?;
                    if committed {
                        self.publish(writer);
                    }
                    committed
                }
                None => false,
            }
        };

        // Outside the writer lock, the listener may refresh snapshots
        if committed {
            self.notify_commit();
        }
        Ok(committed)
    }

    /// Compact the index when it has pending deletions.
    ///
    /// With `wait` the merge and its commit finish before returning;
    /// otherwise the merge runs on the rayon pool. Returns whether a merge
    /// was started.
    pub fn optimize(self: &Arc<Self>, wait: bool) -> Result<bool> {
        self.disposal.check("optimize the index")?;
        if !self.has_writer() || !self.has_deletions()? {
            return Ok(false);
        }

        if wait {
            self.run_merge()?;
            return Ok(true);
        }

        if self.optimizing.swap(true, Ordering::AcqRel) {
            debug!(
                "Compaction of {} already running",
                self.storage.location().display()
            );
            return Ok(false);
        }
        let guardian = Arc::clone(self);
        rayon::spawn(move || {
            let _running = FlagReset(&guardian.optimizing);
            if let Err(e) = guardian.run_merge() {
                error!(
                    "Background compaction of {} failed: {e}",
                    guardian.storage.location().display()
                );
            }
        });
        Ok(true)
    }

    /// Whether the writer holds deleted documents. False before it exists.
    pub fn has_deletions(&self) -> Result<bool> {
        self.disposal.check("inspect the index writer")?;
        Ok(self
            .slot
            .lock()
            .as_ref()
            .is_some_and(IndexWriter::has_deletions))
    }

    pub fn writer_stats(&self) -> Option<WriterStats> {
        self.slot.lock().as_ref().map(IndexWriter::stats)
    }

    /// A near-real-time snapshot from the live writer, if there is one.
    ///
    /// Never waits for the writer lock: while a commit or merge holds it, the
    /// last published snapshot is returned instead.
    pub fn open_live_reader(&self) -> Option<LiveSnapshot> {
        if !self.has_writer() {
            return None;
        }
        match self.slot.try_lock() {
            Some(mut slot) => slot.as_mut().map(|writer| {
                let snapshot = writer.open_reader();
                self.live.store(Some(Arc::clone(&snapshot)));
                LiveSnapshot::Current(snapshot)
            }),
            None => self.live.load_full().map(LiveSnapshot::Published),
        }
    }

    /// Commit and close the writer, releasing the lock marker.
    ///
    /// Not gated on disposal; this is the disposal path.
    pub fn close(&self) -> Result<()> {
        let mut slot = self.slot.lock();
        self.has_writer.store(false, Ordering::Release);
        self.live.store(None);
        match slot.take() {
            Some(writer) => writer.close(),
            None => Ok(()),
        }
    }

    fn run_merge(&self) -> Result<()> {
        let location = self.storage.location().display().to_string();
        info!("Compacting {location} - started");
        let merged = {
            let mut slot = self.slot.lock();
            self.disposal.check("optimize the index")?;
            match slot.as_mut() {
                Some(writer) => {
                    let merged = writer.merge(self.config.max_merge_segments)?;
                    self.publish(writer);
                    merged
                }
                None => false,
            }
        };
        if merged {
            self.notify_commit();
        }
        info!("Compacting {location} - finished");
        Ok(())
    }

    /// Run `op` on the writer, recycling the writer and retrying once if the
    /// write buffer is exhausted.
    fn write<T>(
        &self,
        operation: &str,
        mut op: impl FnMut(&mut IndexWriter) -> Result<T>,
    ) -> Result<T> {
        let mut slot = self.lock_slot(operation)?;
        match op(writer_in(&mut slot)?) {
            Err(FolioError::ResourceExhausted(reason)) => {
                warn!(
                    "Recycling index writer of {} after failed {operation}: {reason}",
                    self.storage.location().display()
                );
                self.recycle(&mut slot)?;
                op(writer_in(&mut slot)?)
            }
            result => result,
        }
    }

    /// Lock the slot, creating the writer if it is absent.
    fn lock_slot(&self, operation: &str) -> Result<MutexGuard<'_, Option<IndexWriter>>> {
        self.disposal.check(operation)?;
        let mut slot = self.slot.lock();
        // Disposal may have closed the writer while we waited
        self.disposal.check(operation)?;
        if slot.is_none() {
            let mut writer = self.create_writer()?;
            self.publish(&mut writer);
            *slot = Some(writer);
            self.has_writer.store(true, Ordering::Release);
        }
        Ok(slot)
    }

    fn create_writer(&self) -> Result<IndexWriter> {
        let writer = IndexWriter::open(Arc::clone(&self.storage), &self.config)?;
        debug!(
            "Created index writer for {}",
            self.storage.location().display()
        );
        Ok(writer)
    }

    fn recycle(&self, slot: &mut Option<IndexWriter>) -> Result<()> {
        self.has_writer.store(false, Ordering::Release);
        if let Some(old) = slot.take() {
            if let Err(e) = old.close() {
                warn!(
                    "Closing exhausted index writer of {} failed: {e}",
                    self.storage.location().display()
                );
            }
        }
        let mut writer = self.create_writer()?;
        self.publish(&mut writer);
        *slot = Some(writer);
        self.has_writer.store(true, Ordering::Release);
        Ok(())
    }

    /// Make the writer's current state visible to readers that cannot take
    /// the writer lock.
    fn publish(&self, writer: &mut IndexWriter) {
        self.live.store(Some(writer.open_reader()));
    }

    fn notify_commit(&self) {
        let listener = self.listener.read().as_ref().and_then(Weak::upgrade);
        if let Some(listener) = listener {
            listener.on_commit();
        }
    }
}

fn writer_in(slot: &mut Option<IndexWriter>) -> Result<&mut IndexWriter> {
    slot.as_mut()
        .ok_or_else(|| FolioError::index("index writer is not open"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::field::Field;
    use crate::query::filter::FilterClause;
    use crate::storage::file::FileStorage;
    use crate::service::reader_cache::ReaderCache;
    use crate::storage::lock::WRITE_LOCK_NAME;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Counter(AtomicUsize);

    impl CommitListener for Counter {
        fn on_commit(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn guardian(dir: &TempDir, config: IndexConfig) -> (Arc<WriterGuardian>, Arc<DisposalGuard>) {
        let storage: Arc<dyn Storage> = Arc::new(FileStorage::new(dir.path()));
        let disposal = Arc::new(DisposalGuard::new());
        let guardian = Arc::new(WriterGuardian::new(storage, config, Arc::clone(&disposal)));
        (guardian, disposal)
    }

    fn doc(id: &str, content: &str) -> IndexDocument {
        IndexDocument::builder()
            .add(Field::keyword("id", id))
            .add(Field::text("content", content))
            .build()
    }

    #[test]
    fn test_lazy_writer_and_commit() {
        let dir = TempDir::new().unwrap();
        let (guardian, _) = guardian(&dir, IndexConfig::new(dir.path()));
        assert!(!guardian.has_writer());
        assert!(!guardian.commit().unwrap());
        assert!(guardian.open_live_reader().is_none());

        // Empty documents do not create the writer
        guardian.add(&IndexDocument::new()).unwrap();
        assert!(!guardian.has_writer());

        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let listener: Arc<dyn CommitListener> = counter.clone();
        guardian.set_listener(Arc::downgrade(&listener));

        guardian.add(&doc("1", "hello world")).unwrap();
        assert!(guardian.has_writer());
        assert!(dir.path().join(WRITE_LOCK_NAME).exists());
        assert!(guardian.commit().unwrap());
        assert!(!guardian.commit().unwrap());
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);

        let snapshot = guardian.open_live_reader().unwrap();
        assert!(snapshot.is_current());
        assert_eq!(snapshot.snapshot().num_docs(), 1);
    }

    #[test]
    fn test_stale_lock_is_removed() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(WRITE_LOCK_NAME), b"left behind").unwrap();

        let (guardian, _) = guardian(&dir, IndexConfig::new(dir.path()));
        guardian.ensure_writer().unwrap();
        guardian.add(&doc("1", "recovered")).unwrap();
        guardian.commit().unwrap();
        assert_eq!(guardian.open_live_reader().unwrap().snapshot().num_docs(), 1);
    }

    #[test]
    fn test_recycles_on_exhausted_buffer() {
        let dir = TempDir::new().unwrap();
        let config = IndexConfig::new(dir.path()).with_max_buffer_bytes(600);
        let (guardian, _) = guardian(&dir, config);

        for i in 0..20 {
            guardian
                .add(&doc(&i.to_string(), "some words that fill the write buffer"))
                .unwrap();
        }
        guardian.commit().unwrap();
        assert_eq!(guardian.open_live_reader().unwrap().snapshot().num_docs(), 20);

        // A document larger than the whole budget still fails after the retry
        let huge = doc("huge", &"x ".repeat(1000));
        let err = guardian.add(&huge).unwrap_err();
        assert!(matches!(err, FolioError::ResourceExhausted(_)));
    }

    #[test]
    fn test_delete_and_optimize() {
        let dir = TempDir::new().unwrap();
        let (guardian, _) = guardian(&dir, IndexConfig::new(dir.path()));
        assert!(!guardian.optimize(true).unwrap());

        for i in 0..6 {
            guardian.add(&doc(&(i * 2).to_string(), "text")).unwrap();
            guardian.add(&doc(&(i * 2 + 1).to_string(), "text")).unwrap();
            guardian.commit().unwrap();
        }
        assert!(!guardian.optimize(true).unwrap());

        assert_eq!(guardian.delete_by_key("0").unwrap(), 1);
        let filter = Filter::from(FilterClause::eq("id", "2"));
        assert_eq!(guardian.delete(&filter).unwrap(), 1);
        guardian.commit().unwrap();
        assert!(guardian.has_deletions().unwrap());

        assert!(guardian.optimize(true).unwrap());
        assert!(!guardian.has_deletions().unwrap());
        let stats = guardian.writer_stats().unwrap();
        assert!(stats.segments <= 4);
        assert_eq!(guardian.open_live_reader().unwrap().snapshot().num_docs(), 10);
    }

    #[test]
    fn test_background_optimize() {
        let dir = TempDir::new().unwrap();
        let (guardian, _) = guardian(&dir, IndexConfig::new(dir.path()));
        for i in 0..4 {
            guardian.add(&doc(&i.to_string(), "text")).unwrap();
        }
        guardian.commit().unwrap();
        guardian.delete_by_key("3").unwrap();
        guardian.commit().unwrap();

        assert!(guardian.optimize(false).unwrap());
        for _ in 0..200 {
            if !guardian.has_deletions().unwrap() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert!(!guardian.has_deletions().unwrap());
        assert_eq!(guardian.open_live_reader().unwrap().snapshot().num_docs(), 3);
    }

    #[test]
    fn test_delete_all_requires_index() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing");
        let storage: Arc<dyn Storage> = Arc::new(FileStorage::new(&missing));
        let uninitialized =
            WriterGuardian::new(storage, IndexConfig::new(&missing), Arc::new(DisposalGuard::new()));
        assert!(!uninitialized.delete_all().unwrap());
        assert!(!uninitialized.has_writer());
        assert!(!missing.exists());

        let (guardian, _) = guardian(&dir, IndexConfig::new(dir.path()));
        guardian.add(&doc("1", "text")).unwrap();
        guardian.commit().unwrap();
        assert!(guardian.delete_all().unwrap());
        guardian.commit().unwrap();
        assert_eq!(guardian.open_live_reader().unwrap().snapshot().num_docs(), 0);
    }

    #[test]
    fn test_disposed_operations_fail() {
        let dir = TempDir::new().unwrap();
        let (guardian, disposal) = guardian(&dir, IndexConfig::new(dir.path()));
        guardian.add(&doc("1", "text")).unwrap();

        assert!(disposal.dispose());
        guardian.close().unwrap();
        assert!(!dir.path().join(WRITE_LOCK_NAME).exists());

        assert!(guardian.add(&doc("2", "text")).unwrap_err().is_disposed());
        assert!(guardian.delete_by_key("1").unwrap_err().is_disposed());
        assert!(guardian.commit().unwrap_err().is_disposed());
        assert!(guardian.optimize(true).unwrap_err().is_disposed());
    }

    #[test]
    fn test_search_does_not_wait_for_busy_writer() {
        let dir = TempDir::new().unwrap();
        let config = IndexConfig::new(dir.path()).with_refresh_ttl(Duration::from_secs(3600));
        let (guardian, disposal) = guardian(&dir, config.clone());
        let cache = Arc::new(ReaderCache::new(
            Arc::clone(&guardian.storage),
            Arc::clone(&guardian),
            &config,
            disposal,
        ));
        let listener: Arc<dyn CommitListener> = cache.clone();
        guardian.set_listener(Arc::downgrade(&listener));

        guardian.add(&doc("1", "text")).unwrap();
        guardian.commit().unwrap();
        assert_eq!(cache.get_searcher().unwrap().snapshot().num_docs(), 1);
        guardian.add(&doc("2", "text")).unwrap();
        guardian.commit().unwrap();

        // Stands in for a long merge or commit
        let held = guardian.slot.lock();
        let (tx, rx) = mpsc::channel();
        let searching = Arc::clone(&cache);
        thread::spawn(move || {
            let docs = searching
                .get_searcher()
                .map(|searcher| searcher.snapshot().num_docs());
            let _ = tx.send(docs);
        });
        let docs = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("search blocked on the writer lock");
        assert_eq!(docs.unwrap(), 2);
        assert!(matches!(
            guardian.open_live_reader(),
            Some(LiveSnapshot::Published(_))
        ));

        drop(held);
        assert!(guardian.open_live_reader().unwrap().is_current());
    }

    #[test]
    fn test_flag_reset_when_merge_panics() {
        let flag = Arc::new(AtomicBool::new(true));
        let running = Arc::clone(&flag);
        let result = thread::spawn(move || {
            let _running = FlagReset(&running);
            panic!("merge failed");
        })
        .join();
        assert!(result.is_err());
        assert!(!flag.load(Ordering::Acquire));
    }

    #[test]
    fn test_delete_by_keys() {
        let dir = TempDir::new().unwrap();
        let (guardian, _) = guardian(&dir, IndexConfig::new(dir.path()));
        for i in 0..5 {
            guardian.add(&doc(&i.to_string(), "text")).unwrap();
        }
        guardian.commit().unwrap();

        assert_eq!(guardian.delete_by_keys(&["1", "3", "missing"]).unwrap(), 2);
        guardian.commit().unwrap();
        assert_eq!(guardian.open_live_reader().unwrap().snapshot().num_docs(), 3);
    }
}
