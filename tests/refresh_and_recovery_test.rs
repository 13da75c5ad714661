#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::{Duration, SystemTime};

    use folio::config::IndexConfig;
    use folio::document::document::IndexDocument;
    use folio::document::field::Field;
    use folio::document::stored::StoredDocument;
    use folio::error::{FolioError, Result};
    use folio::index::IndexWriter;
    use folio::query::Query;
    use folio::service::{IndexService, SearchRequest};
    use folio::storage::file::FileStorage;
    use folio::storage::lock::WRITE_LOCK_NAME;
    use folio::storage::traits::{Storage, StorageInput, StorageOutput};
    use tempfile::TempDir;

    /// File storage whose reads fail while `failing` is set.
    #[derive(Debug)]
    struct FailingReads {
        inner: FileStorage,
        failing: Arc<AtomicBool>,
    }

    impl Storage for FailingReads {
        fn location(&self) -> &Path {
            self.inner.location()
        }

        fn ensure_exists(&self) -> Result<()> {
            self.inner.ensure_exists()
        }

        fn is_initialized(&self) -> bool {
            self.inner.is_initialized()
        }

        fn modification_stamp(&self) -> Result<Option<SystemTime>> {
            self.inner.modification_stamp()
        }

        fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(FolioError::storage(format!("cannot read {name}")));
            }
            self.inner.open_input(name)
        }

        fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
            self.inner.create_output(name)
        }

        fn file_exists(&self, name: &str) -> bool {
            self.inner.file_exists(name)
        }

        fn delete_file(&self, name: &str) -> Result<()> {
            self.inner.delete_file(name)
        }

        fn list_files(&self) -> Result<Vec<String>> {
            self.inner.list_files()
        }

        fn file_size(&self, name: &str) -> Result<u64> {
            self.inner.file_size(name)
        }

        fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()> {
            self.inner.rename_file(old_name, new_name)
        }

        fn sync(&self) -> Result<()> {
            self.inner.sync()
        }
    }

    fn doc(id: &str) -> IndexDocument {
        IndexDocument::builder()
            .add(Field::keyword("id", id))
            .add(Field::text("content", format!("document number {id}")))
            .build()
    }

    fn id_of(doc: &StoredDocument) -> Result<String> {
        Ok(doc.get_text("id").unwrap_or_default().to_string())
    }

    fn count(service: &IndexService) -> usize {
        service
            .search(&SearchRequest::new(100, 0), id_of)
            .unwrap()
            .total_count
    }

    #[test]
    fn test_commit_visible_within_grace_window() {
        let dir = TempDir::new().unwrap();
        let config = IndexConfig::new(dir.path())
            .with_refresh_ttl(Duration::from_secs(3600))
            .with_commit_refresh_delay(Duration::from_millis(50));
        let service = IndexService::open(config).unwrap();
        service.add(&doc("1")).unwrap();
        service.commit().unwrap();
        assert_eq!(count(&service), 1);

        service.add(&doc("2")).unwrap();
        service.commit().unwrap();
        // The refresh deadline moved to commit + 50ms instead of a full TTL
        thread::sleep(Duration::from_millis(80));
        assert_eq!(count(&service), 2);
    }

    #[test]
    fn test_external_commit_visible_after_ttl() {
        let dir = TempDir::new().unwrap();
        let config = IndexConfig::new(dir.path()).with_refresh_ttl(Duration::from_millis(50));

        // Another service instance is the writer; this one only reads
        let writer = IndexService::open(config.clone()).unwrap();
        writer.add(&doc("1")).unwrap();
        writer.commit().unwrap();

        let reader = IndexService::open(config).unwrap();
        assert_eq!(count(&reader), 1);

        writer.add(&doc("2")).unwrap();
        writer.commit().unwrap();
        // Directory timestamps can be coarse; wait past one TTL and a tick
        thread::sleep(Duration::from_millis(1100));
        assert_eq!(count(&reader), 2);
    }

    #[test]
    fn test_held_snapshot_keeps_deleted_documents() {
        let dir = TempDir::new().unwrap();
        let config = IndexConfig::new(dir.path()).with_refresh_ttl(Duration::from_secs(3600));
        let storage: Arc<dyn Storage> = Arc::new(FileStorage::new(dir.path()));
        let service = IndexService::with_storage(config, storage).unwrap();
        for id in ["1", "2", "3"] {
            service.add(&doc(id)).unwrap();
        }
        service.commit().unwrap();

        let held = service.searcher().unwrap();
        service.delete_by_key("2").unwrap();
        service.commit().unwrap();

        // New searches no longer see the deleted document
        let page = service.search(&SearchRequest::new(10, 0), id_of).unwrap();
        assert_eq!(page.total_count, 2);
        assert!(!page.items.contains(&"2".to_string()));
        assert_eq!(service.stats().unwrap().retained_searchers, 1);

        // The held searcher still does
        let searcher = held.searcher();
        let top = searcher.search(&Query::All, None, &[], 10).unwrap();
        assert_eq!(top.total, 3);
        let ids: Vec<String> = top
            .hits
            .iter()
            .map(|hit| id_of(searcher.document(hit.doc).unwrap()).unwrap())
            .collect();
        assert!(ids.contains(&"2".to_string()));
        assert_eq!(held.snapshot().num_docs(), 3);
    }

    #[test]
    fn test_failed_refresh_retries_on_next_search() {
        let dir = TempDir::new().unwrap();
        let config = IndexConfig::new(dir.path()).with_refresh_ttl(Duration::from_millis(50));
        let writer = IndexService::open(config.clone()).unwrap();
        writer.add(&doc("1")).unwrap();
        writer.commit().unwrap();

        let failing = Arc::new(AtomicBool::new(false));
        let storage: Arc<dyn Storage> = Arc::new(FailingReads {
            inner: FileStorage::new(dir.path()),
            failing: Arc::clone(&failing),
        });
        let reader = IndexService::with_storage(config, storage).unwrap();
        assert_eq!(count(&reader), 1);

        writer.add(&doc("2")).unwrap();
        writer.commit().unwrap();
        // Directory timestamps can be coarse; wait past one TTL and a tick
        thread::sleep(Duration::from_millis(1100));

        failing.store(true, Ordering::SeqCst);
        assert!(reader.search(&SearchRequest::new(100, 0), id_of).is_err());

        // The failed refresh did not mark the commit as seen
        failing.store(false, Ordering::SeqCst);
        assert_eq!(count(&reader), 2);
    }

    #[test]
    fn test_stale_lock_marker_is_recovered() {
        let dir = TempDir::new().unwrap();
        {
            let service = IndexService::open(IndexConfig::new(dir.path())).unwrap();
            service.add(&doc("1")).unwrap();
            service.commit().unwrap();
        }
        // A crashed process left its marker behind
        std::fs::write(dir.path().join(WRITE_LOCK_NAME), b"{}").unwrap();

        let service = IndexService::open(IndexConfig::new(dir.path())).unwrap();
        service.add(&doc("2")).unwrap();
        service.commit().unwrap();
        assert_eq!(count(&service), 2);
        assert!(dir.path().join(WRITE_LOCK_NAME).exists());

        service.dispose().unwrap();
        assert!(!dir.path().join(WRITE_LOCK_NAME).exists());
    }

    #[test]
    fn test_second_writer_in_process_is_rejected() {
        let dir = TempDir::new().unwrap();
        let first = IndexService::open(IndexConfig::new(dir.path())).unwrap();
        first.add(&doc("1")).unwrap();

        let second = IndexService::open(IndexConfig::new(dir.path())).unwrap();
        let err = second.add(&doc("2")).unwrap_err();
        assert!(matches!(err, FolioError::LockContention(_)));

        // Once the first writer is gone the second can take over
        first.dispose().unwrap();
        second.add(&doc("2")).unwrap();
        second.commit().unwrap();
        assert_eq!(count(&second), 2);

        let storage = FileStorage::new(dir.path());
        assert!(storage.is_initialized());
    }

    #[test]
    fn test_writer_after_restart_sees_committed_data() {
        let dir = TempDir::new().unwrap();
        let config = IndexConfig::new(dir.path());
        {
            let service = IndexService::open(config.clone()).unwrap();
            for i in 0..5 {
                service.add(&doc(&i.to_string())).unwrap();
            }
        }

        let storage: Arc<dyn Storage> = Arc::new(FileStorage::new(dir.path()));
        let mut writer = IndexWriter::open(storage, &config).unwrap();
        assert_eq!(writer.open_reader().num_docs(), 5);
        writer.close().unwrap();
    }

    #[test]
    fn test_concurrent_searches_during_writes() {
        let dir = TempDir::new().unwrap();
        let config = IndexConfig::new(dir.path()).with_refresh_ttl(Duration::from_millis(1));
        let service = IndexService::open(config).unwrap();
        service.add(&doc("seed")).unwrap();
        service.commit().unwrap();

        let writer = {
            let service = service.clone();
            thread::spawn(move || {
                for i in 0..50 {
                    service.add(&doc(&i.to_string())).unwrap();
                    if i % 10 == 9 {
                        service.commit().unwrap();
                    }
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let service = service.clone();
                thread::spawn(move || {
                    let mut last = 0;
                    for _ in 0..50 {
                        let page = service.search(&SearchRequest::new(5, 0), id_of).unwrap();
                        // Totals never go backwards and pages are never overfull
                        assert!(page.total_count >= last);
                        assert!(page.items.len() <= 5);
                        last = page.total_count;
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        service.commit().unwrap();
        thread::sleep(Duration::from_millis(5));
        assert_eq!(count(&service), 51);
    }
}
