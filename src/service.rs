//! The index service: one instance per index directory.
//!
//! [`IndexService`] ties the writer guardian, the reader cache and the
//! disposal guard together and exposes the operations applications use:
//! adding and deleting documents, committing, compacting and paginated
//! search.
//!
//! # Example
//!
//! ```no_run
//! use folio::config::IndexConfig;
//! use folio::mapping::{FileHit, FileRecord};
//! use folio::query::{Filter, FilterClause};
//! use folio::service::{IndexService, SearchRequest};
//!
//! # fn main() -> folio::error::Result<()> {
//! let service = IndexService::open(IndexConfig::new("/var/lib/folio/files"))?;
//! service.add(&FileRecord::new("1", "a.txt", "docs").to_index_document())?;
//! service.commit()?;
//!
//! let request = SearchRequest::new(10, 0)
//!     .with_filter(Filter::from(FilterClause::eq("folder", "docs")));
//! let page = service.search(&request, FileHit::from_stored)?;
//! println!("{} of {}", page.items.len(), page.total_count);
//! # Ok(())
//! # }
//! ```

pub mod disposal;
pub mod guardian;
pub mod reader_cache;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, error, info, warn};
use serde::Serialize;

use crate::config::IndexConfig;
use crate::document::document::IndexDocument;
use crate::error::{FolioError, Result};
use crate::mapping::{DEFAULT_TEXT_FIELDS, HitMapper};
use crate::query::filter::Filter;
use crate::query::parser::QueryParser;
use crate::query::query::Query;
use crate::query::sort::SortField;
use crate::storage::file::FileStorage;
use crate::storage::traits::Storage;

pub use disposal::DisposalGuard;
pub use guardian::{CommitListener, WriterGuardian};
pub use reader_cache::{CachedSearcher, ReaderCache};

/// What to search for and which page to return.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Non-scoring restriction of the candidates.
    pub filter: Option<Filter>,
    /// Free text, parsed against `default_fields`.
    pub text: Option<String>,
    /// A structured scored query, combined with `text` when both are set.
    pub query: Option<Query>,
    pub default_fields: Vec<String>,
    /// Empty means relevance.
    pub sort: Vec<SortField>,
    pub page_size: usize,
    pub page_index: usize,
}

impl SearchRequest {
    pub fn new(page_size: usize, page_index: usize) -> Self {
        SearchRequest {
            filter: None,
            text: None,
            query: None,
            default_fields: DEFAULT_TEXT_FIELDS.iter().map(|f| f.to_string()).collect(),
            sort: Vec::new(),
            page_size,
            page_index,
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_text<S: Into<String>>(mut self, text: S) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_query(mut self, query: Query) -> Self {
        self.query = Some(query);
        self
    }

    pub fn with_default_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_sort(mut self, sort: Vec<SortField>) -> Self {
        self.sort = sort;
        self
    }

    /// Number of hits to retrieve so that page `page_index` is complete.
    fn window(&self) -> Result<usize> {
        if self.page_size == 0 {
            return Err(FolioError::invalid_argument(
                "invalid page size: page size is zero",
            ));
        }
        self.page_index
            .checked_add(1)
            .and_then(|pages| pages.checked_mul(self.page_size))
            .ok_or_else(|| {
                FolioError::invalid_argument(format!(
                    "page window overflows: page {} of size {}",
                    self.page_index, self.page_size
                ))
            })
    }
}

/// One page of mapped results and the total number of matches.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResults<T> {
    pub items: Vec<T>,
    pub total_count: usize,
}

impl<T> SearchResults<T> {
    pub fn empty() -> Self {
        SearchResults {
            items: Vec::new(),
            total_count: 0,
        }
    }
}

/// Point-in-time figures about an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub location: PathBuf,
    pub generation: u64,
    pub segments: usize,
    /// Document slots, deleted ones included.
    pub max_doc: u32,
    /// Searchable documents.
    pub num_docs: u32,
    pub has_deletions: bool,
    pub writer_open: bool,
    pub retained_searchers: usize,
}

struct ServiceInner {
    location: PathBuf,
    disposal: Arc<DisposalGuard>,
    guardian: Arc<WriterGuardian>,
    readers: Arc<ReaderCache>,
}

impl ServiceInner {
    fn dispose(&self) -> Result<()> {
        if !self.disposal.dispose() {
            return Ok(());
        }
        let closed = self.guardian.close();
        self.readers.clear();
        info!("Disposed index service for {}", self.location.display());
        closed
    }
}

impl Drop for ServiceInner {
    fn drop(&mut self) {
        if let Err(e) = self.dispose() {
            error!(
                "Failed to dispose index service for {}: {e}",
                self.location.display()
            );
        }
    }
}

/// Indexing and search over one index directory.
///
/// Clones share the same writer and snapshots. The service is torn down by
/// [`IndexService::dispose`] or when the last clone is dropped.
#[derive(Clone)]
pub struct IndexService {
    inner: Arc<ServiceInner>,
}

impl std::fmt::Debug for IndexService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexService")
            .field("location", &self.inner.location)
            .field("disposed", &self.inner.disposal.is_disposed())
            .finish()
    }
}

impl IndexService {
    /// Attach to the directory named by `config`, on the local filesystem.
    pub fn open(config: IndexConfig) -> Result<IndexService> {
        config.validate()?;
        let storage: Arc<dyn Storage> = Arc::new(FileStorage::new(&config.index_dir));
        Self::with_storage(config, storage)
    }

    /// Attach to an index through an existing storage backend.
    pub fn with_storage(config: IndexConfig, storage: Arc<dyn Storage>) -> Result<IndexService> {
        config.validate()?;
        let disposal = Arc::new(DisposalGuard::new());
        let guardian = Arc::new(WriterGuardian::new(
            Arc::clone(&storage),
            config.clone(),
            Arc::clone(&disposal),
        ));
        let readers = Arc::new(ReaderCache::new(
            Arc::clone(&storage),
            Arc::clone(&guardian),
            &config,
            Arc::clone(&disposal),
        ));
        let listener: Arc<dyn CommitListener> = readers.clone();
        guardian.set_listener(Arc::downgrade(&listener));

        debug!(
            "Attached index service to {} (refresh ttl {:?})",
            storage.location().display(),
            config.refresh_ttl()
        );
        Ok(IndexService {
            inner: Arc::new(ServiceInner {
                location: storage.location().to_path_buf(),
                disposal,
                guardian,
                readers,
            }),
        })
    }

    pub fn location(&self) -> &Path {
        &self.inner.location
    }

    /// Create the writer now instead of on the first write.
    pub fn ensure_writer(&self) -> Result<()> {
        self.inner.guardian.ensure_writer()
    }

    /// Add a document, replacing any document with the same key.
    pub fn add(&self, doc: &IndexDocument) -> Result<()> {
        self.inner.guardian.add(doc)
    }

    /// Replace the document with the same key; the document must have one.
    pub fn update(&self, doc: &IndexDocument) -> Result<()> {
        self.inner.guardian.update(doc)
    }

    /// Delete every document matching `filter`. Returns how many were deleted.
    pub fn delete(&self, filter: &Filter) -> Result<usize> {
        self.inner.guardian.delete(filter)
    }

    pub fn delete_by_key(&self, key: &str) -> Result<usize> {
        self.inner.guardian.delete_by_key(key)
    }

    /// Make pending changes durable and visible to the next search.
    pub fn commit(&self) -> Result<bool> {
        self.inner.guardian.commit()
    }

    /// Compact the index if it has deletions; see [`WriterGuardian::optimize`].
    pub fn optimize(&self, wait: bool) -> Result<bool> {
        self.inner.guardian.optimize(wait)
    }

    /// Remove every document; a no-op when the directory holds no index.
    pub fn delete_all(&self) -> Result<bool> {
        self.inner.guardian.delete_all()
    }

    /// Run a paginated search and map the requested page.
    ///
    /// The mapper is not called when nothing matches.
    pub fn search<T, M>(&self, request: &SearchRequest, mapper: M) -> Result<SearchResults<T>>
    where
        M: HitMapper<T>,
    {
        let window = request.window()?;
        let cached = self.inner.readers.get_searcher()?;
        let searcher = cached.searcher();
        let query = self.resolve_query(request)?;

        let top = searcher.search(&query, request.filter.as_ref(), &request.sort, window)?;
        if top.hits.is_empty() {
            return Ok(SearchResults {
                items: Vec::new(),
                total_count: top.total,
            });
        }

        let skip = request.page_index * request.page_size;
        let items = top
            .hits
            .iter()
            .skip(skip)
            .map(|hit| {
                let doc = searcher.document(hit.doc).ok_or_else(|| {
                    FolioError::index(format!(
                        "hit {} is outside the snapshot of {}",
                        hit.doc,
                        self.inner.location.display()
                    ))
                })?;
                mapper.map(doc)
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            "Search {query} on {} returned {} of {} hits",
            self.inner.location.display(),
            items.len(),
            top.total
        );
        Ok(SearchResults {
            items,
            total_count: top.total,
        })
    }

    /// Drop results whose backing file no longer exists and delete their
    /// index entries.
    ///
    /// Each dropped item lowers the total by one. The entries are deleted
    /// together and committed before returning; if the deletion fails
    /// nothing is deleted.
    pub fn reconcile<T, K, E>(
        &self,
        results: SearchResults<T>,
        key_of: K,
        exists: E,
    ) -> Result<SearchResults<T>>
    where
        K: Fn(&T) -> Option<String>,
        E: Fn(&T) -> bool,
    {
        let mut total_count = results.total_count;
        let mut items = Vec::with_capacity(results.items.len());
        let mut missing = Vec::new();

        for item in results.items {
            if exists(&item) {
                items.push(item);
                continue;
            }
            total_count = total_count.saturating_sub(1);
            match key_of(&item) {
                Some(key) => missing.push(key),
                None => warn!(
                    "Cannot remove a missing file from {}: result has no key",
                    self.inner.location.display()
                ),
            }
        }

        if !missing.is_empty() {
            info!(
                "Removing index entries {} of {}: files no longer exist",
                missing.join(", "),
                self.inner.location.display()
            );
            if self.inner.guardian.delete_by_keys(&missing)? > 0 {
                self.commit()?;
            }
        }
        Ok(SearchResults { items, total_count })
    }

    /// The current searcher, refreshed first if stale.
    ///
    /// A held searcher keeps its snapshot alive and unchanged across later
    /// commits.
    pub fn searcher(&self) -> Result<Arc<CachedSearcher>> {
        self.inner.readers.get_searcher()
    }

    pub fn has_deletions(&self) -> Result<bool> {
        Ok(self.inner.readers.get_searcher()?.snapshot().has_deletions())
    }

    /// Document slots in the current snapshot, deleted ones included.
    pub fn max_doc(&self) -> Result<u32> {
        Ok(self.inner.readers.get_searcher()?.snapshot().max_doc())
    }

    /// Searchable documents in the current snapshot.
    pub fn num_docs(&self) -> Result<u32> {
        Ok(self.inner.readers.get_searcher()?.snapshot().num_docs())
    }

    pub fn stats(&self) -> Result<IndexStats> {
        let cached = self.inner.readers.get_searcher()?;
        let snapshot = cached.snapshot();
        Ok(IndexStats {
            location: self.inner.location.clone(),
            generation: snapshot.generation(),
            segments: snapshot.segments().len(),
            max_doc: snapshot.max_doc(),
            num_docs: snapshot.num_docs(),
            has_deletions: snapshot.has_deletions(),
            writer_open: self.inner.guardian.has_writer(),
            retained_searchers: self.inner.readers.retained_count(),
        })
    }

    /// Commit and close the writer and release every snapshot.
    ///
    /// Only the first call does anything; every other operation fails with
    /// `Disposed` afterwards.
    pub fn dispose(&self) -> Result<()> {
        self.inner.dispose()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposal.is_disposed()
    }

    fn resolve_query(&self, request: &SearchRequest) -> Result<Query> {
        let text = match &request.text {
            Some(text) => {
                let registry = self.inner.readers.registry();
                let parser = QueryParser::new(registry, request.default_fields.iter().cloned());
                Some(parser.parse_lenient(text)?)
            }
            None => None,
        };
        Ok(match (text, request.query.clone()) {
            (Some(text), Some(query)) => Query::boolean().must(text).must(query),
            (Some(query), None) | (None, Some(query)) => query,
            (None, None) => Query::All,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::field::Field;
    use crate::document::stored::StoredDocument;
    use crate::query::filter::FilterClause;
    use tempfile::TempDir;

    fn id_of(doc: &StoredDocument) -> Result<String> {
        Ok(doc.get_text("id").unwrap_or_default().to_string())
    }

    fn service(dir: &TempDir) -> IndexService {
        IndexService::open(IndexConfig::new(dir.path())).unwrap()
    }

    fn doc(id: &str, folder: &str, content: &str) -> IndexDocument {
        IndexDocument::builder()
            .add(Field::keyword("id", id))
            .add(Field::keyword("folder", folder))
            .add(Field::unstored_text("content", content))
            .build()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let err = IndexService::open(IndexConfig::default()).unwrap_err();
        assert!(matches!(err, FolioError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_zero_page_size() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);
        let err = service.search(&SearchRequest::new(0, 0), id_of).unwrap_err();
        assert!(matches!(err, FolioError::InvalidArgument(_)));
    }

    #[test]
    fn test_mapper_not_called_without_hits() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);
        service.add(&doc("1", "docs", "alpha")).unwrap();
        service.commit().unwrap();

        let request = SearchRequest::new(10, 0).with_text("missing");
        let results = service
            .search(&request, |_: &StoredDocument| -> Result<String> {
                panic!("mapper called without hits")
            })
            .unwrap();
        assert_eq!(results, SearchResults::empty());
    }

    #[test]
    fn test_text_and_structured_query() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);
        service.add(&doc("1", "docs", "alpha beta")).unwrap();
        service.add(&doc("2", "docs", "alpha")).unwrap();
        service.add(&doc("3", "other", "beta")).unwrap();
        service.commit().unwrap();

        let request = SearchRequest::new(10, 0)
            .with_text("alpha")
            .with_query(Query::term("content", "beta"));
        let results = service.search(&request, id_of).unwrap();
        assert_eq!(results.items, vec!["1"]);

        // Unparsable text is searched as literal words
        let request = SearchRequest::new(10, 0)
            .with_text("beta (")
            .with_filter(Filter::from(FilterClause::eq("folder", "other")));
        let results = service.search(&request, id_of).unwrap();
        assert_eq!(results.items, vec!["3"]);
    }

    #[test]
    fn test_reconcile_removes_missing() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);
        for id in ["1", "2", "3"] {
            service.add(&doc(id, "docs", "text")).unwrap();
        }
        service.commit().unwrap();

        let page = service.search(&SearchRequest::new(2, 0), id_of).unwrap();
        assert_eq!(page.total_count, 3);
        let page = service
            .reconcile(page, |id| Some(id.clone()), |id| id != "1")
            .unwrap();
        assert_eq!(page.items, vec!["2"]);
        assert_eq!(page.total_count, 2);

        assert_eq!(service.num_docs().unwrap(), 2);
        assert!(service.has_deletions().unwrap());
    }

    #[test]
    fn test_reconcile_deletes_all_missing_together() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);
        for id in ["1", "2", "3", "4"] {
            service.add(&doc(id, "docs", "text")).unwrap();
        }
        service.commit().unwrap();

        let page = service.search(&SearchRequest::new(10, 0), id_of).unwrap();
        let page = service
            .reconcile(page, |id| Some(id.clone()), |id| id == "4")
            .unwrap();
        assert_eq!(page.items, vec!["4"]);
        assert_eq!(page.total_count, 1);
        assert_eq!(service.num_docs().unwrap(), 1);

        // Items without a key are dropped from the page but stay indexed
        let page = service.search(&SearchRequest::new(10, 0), id_of).unwrap();
        let page = service.reconcile(page, |_| None, |_| false).unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total_count, 0);
        assert_eq!(service.num_docs().unwrap(), 1);
    }

    #[test]
    fn test_failed_reconcile_deletes_nothing() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);
        for id in ["1", "2", "3"] {
            service.add(&doc(id, "docs", "text")).unwrap();
        }
        service.commit().unwrap();
        let page = service.search(&SearchRequest::new(10, 0), id_of).unwrap();

        service.dispose().unwrap();
        let err = service
            .reconcile(page, |id| Some(id.clone()), |_| false)
            .unwrap_err();
        assert!(err.is_disposed());

        let reopened = IndexService::open(IndexConfig::new(dir.path())).unwrap();
        assert_eq!(reopened.num_docs().unwrap(), 3);
    }

    #[test]
    fn test_stats_and_dispose() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);
        service.add(&doc("1", "docs", "text")).unwrap();
        service.commit().unwrap();

        let stats = service.stats().unwrap();
        assert_eq!(stats.num_docs, 1);
        assert_eq!(stats.max_doc, 1);
        assert!(stats.writer_open);
        assert!(!stats.has_deletions);

        let clone = service.clone();
        service.dispose().unwrap();
        service.dispose().unwrap();
        assert!(clone.is_disposed());
        assert!(clone.stats().unwrap_err().is_disposed());
        assert!(clone.num_docs().unwrap_err().is_disposed());
    }
}
