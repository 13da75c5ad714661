//! Cached searcher snapshots with bounded staleness.
//!
//! A snapshot is refreshed only when the TTL has elapsed and something
//! changed: either an in-process commit was announced or the directory's
//! modification time moved. Superseded snapshots are retained until they
//! have been idle for the retention cutoff; callers still holding one keep
//! it alive regardless.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime};

use arc_swap::ArcSwapOption;
use log::debug;
use parking_lot::Mutex;

use crate::analysis::registry::FieldAnalyzerRegistry;
use crate::config::IndexConfig;
use crate::error::{FolioError, Result};
use crate::index::reader::IndexSnapshot;
use crate::search::searcher::Searcher;
use crate::service::disposal::DisposalGuard;
use crate::service::guardian::{CommitListener, LiveSnapshot, WriterGuardian};
use crate::storage::traits::Storage;

/// A searcher over one snapshot, with the time it was last handed out.
#[derive(Debug)]
pub struct CachedSearcher {
    searcher: Searcher,
    last_used: Mutex<Instant>,
}

impl CachedSearcher {
    pub fn new(snapshot: Arc<IndexSnapshot>, registry: Arc<FieldAnalyzerRegistry>) -> Self {
        CachedSearcher {
            searcher: Searcher::new(snapshot, registry),
            last_used: Mutex::new(Instant::now()),
        }
    }

    pub fn searcher(&self) -> &Searcher {
        &self.searcher
    }

    pub fn snapshot(&self) -> &Arc<IndexSnapshot> {
        self.searcher.snapshot()
    }

    pub fn touch(&self) {
        *self.last_used.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_used.lock().elapsed()
    }
}

#[derive(Debug)]
struct Schedule {
    /// No refresh happens before this instant.
    next_refresh: Instant,
    /// Directory modification time seen at the last refresh.
    stamp: Option<SystemTime>,
}

/// Hands out the current [`CachedSearcher`], refreshing it when stale.
pub struct ReaderCache {
    storage: Arc<dyn Storage>,
    guardian: Arc<WriterGuardian>,
    registry: Arc<FieldAnalyzerRegistry>,
    disposal: Arc<DisposalGuard>,
    ttl: Duration,
    retention_cutoff: Duration,
    commit_delay: Duration,
    current: ArcSwapOption<CachedSearcher>,
    retained: Mutex<Vec<Arc<CachedSearcher>>>,
    /// Serializes refreshes.
    refresh_lock: Mutex<()>,
    schedule: Mutex<Schedule>,
    /// A commit happened since the last refresh.
    commit_pending: AtomicBool,
}

impl std::fmt::Debug for ReaderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderCache")
            .field("location", &self.storage.location())
            .field("ttl", &self.ttl)
            .field("retained", &self.retained_count())
            .finish()
    }
}

impl ReaderCache {
    pub fn new(
        storage: Arc<dyn Storage>,
        guardian: Arc<WriterGuardian>,
        config: &IndexConfig,
        disposal: Arc<DisposalGuard>,
    ) -> Self {
        ReaderCache {
            storage,
            guardian,
            registry: Arc::new(config.analyzers.clone()),
            disposal,
            ttl: config.refresh_ttl(),
            retention_cutoff: config.retention_cutoff(),
            commit_delay: config.commit_refresh_delay(),
            current: ArcSwapOption::empty(),
            retained: Mutex::new(Vec::new()),
            refresh_lock: Mutex::new(()),
            schedule: Mutex::new(Schedule {
                next_refresh: Instant::now(),
                stamp: None,
            }),
            commit_pending: AtomicBool::new(false),
        }
    }

    pub fn registry(&self) -> &Arc<FieldAnalyzerRegistry> {
        &self.registry
    }

    /// The current searcher, refreshed first if stale.
    pub fn get_searcher(&self) -> Result<Arc<CachedSearcher>> {
        self.disposal.check("search")?;
        if let Some(current) = self.fresh_current()? {
            return Ok(current);
        }

        self.validate_index_folder()?;
        let _refreshing = self.refresh_lock.lock();
        self.disposal.check("search")?;
        // Another thread may have refreshed while we waited
        if let Some(current) = self.fresh_current()? {
            return Ok(current);
        }
        self.refresh()
    }

    /// Fail with `IndexUninitialized` unless the directory exists and holds
    /// at least one file.
    pub fn validate_index_folder(&self) -> Result<()> {
        if self.storage.is_initialized() {
            Ok(())
        } else {
            Err(FolioError::uninitialized(format!(
                "indexing directory [{}] is either empty or does not exist",
                self.storage.location().display()
            )))
        }
    }

    /// Superseded searchers not yet evicted.
    pub fn retained_count(&self) -> usize {
        self.retained.lock().len()
    }

    /// Drop every cached and retained searcher.
    pub fn clear(&self) {
        self.current.store(None);
        self.retained.lock().clear();
    }

    fn fresh_current(&self) -> Result<Option<Arc<CachedSearcher>>> {
        let Some(current) = self.current.load_full() else {
            return Ok(None);
        };
        if self.must_refresh()? {
            return Ok(None);
        }
        current.touch();
        Ok(Some(current))
    }

    fn must_refresh(&self) -> Result<bool> {
        let schedule = self.schedule.lock();
        if Instant::now() < schedule.next_refresh {
            return Ok(false);
        }
        if self.commit_pending.load(Ordering::Acquire) {
            return Ok(true);
        }
        Ok(self.storage.modification_stamp()? != schedule.stamp)
    }

    fn refresh(&self) -> Result<Arc<CachedSearcher>> {
        let stamp = self.storage.modification_stamp()?;
        let was_pending = self.commit_pending.swap(false, Ordering::AcqRel);

        let live = self.guardian.open_live_reader();
        let settled = live.as_ref().is_none_or(LiveSnapshot::is_current);
        let snapshot = match live {
            Some(live) => live.into_snapshot(),
            None => match IndexSnapshot::open(self.storage.as_ref()) {
                Ok(snapshot) => Arc::new(snapshot),
                Err(e) => {
                    // Keep the change visible to the next search so it retries
                    if was_pending {
                        self.commit_pending.store(true, Ordering::Release);
                    }
                    return Err(e);
                }
            },
        };

        if settled {
            let mut schedule = self.schedule.lock();
            schedule.next_refresh = Instant::now() + self.ttl;
            schedule.stamp = stamp;
        } else if was_pending {
            // A busy writer only offered its last published snapshot
            self.commit_pending.store(true, Ordering::Release);
        }

        let previous = self.current.load_full();
        if let Some(previous) = &previous {
            if Arc::ptr_eq(previous.snapshot(), &snapshot)
                || previous.snapshot().same_point(&snapshot)
            {
                previous.touch();
                return Ok(Arc::clone(previous));
            }
        }

        let fresh = Arc::new(CachedSearcher::new(
            Arc::clone(&snapshot),
            Arc::clone(&self.registry),
        ));
        let (evicted, retained) = {
            let mut retained = self.retained.lock();
            let before = retained.len();
            retained.retain(|searcher| searcher.idle_for() < self.retention_cutoff);
            let evicted = before - retained.len();
            if let Some(previous) = previous {
                retained.push(previous);
            }
            (evicted, retained.len())
        };
        self.current.store(Some(Arc::clone(&fresh)));

        debug!(
            "Refreshed searcher of {} to generation {} version {} ({} docs, {retained} retained, {evicted} evicted)",
            self.storage.location().display(),
            snapshot.generation(),
            snapshot.version(),
            snapshot.num_docs()
        );
        Ok(fresh)
    }
}

impl CommitListener for ReaderCache {
    fn on_commit(&self) {
        self.commit_pending.store(true, Ordering::Release);
        let deadline = Instant::now() + self.commit_delay;
        let mut schedule = self.schedule.lock();
        if deadline < schedule.next_refresh {
            schedule.next_refresh = deadline;
        }
    }
}
