//! Executes queries against one index snapshot.

use std::sync::Arc;

use log::trace;
use rayon::prelude::*;

use crate::analysis::registry::FieldAnalyzerRegistry;
use crate::document::stored::StoredDocument;
use crate::error::{FolioError, Result};
use crate::index::reader::{IndexSnapshot, SegmentView};
use crate::query::filter::Filter;
use crate::query::query::Query;
use crate::query::sort::SortField;
use crate::search::collector::{RankedHit, SortKey, TopCollector};
use crate::search::scorer::{Bm25, QueryScorer};

/// A matching document, identified by its global id within the snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredHit {
    pub doc: u32,
    pub score: f32,
}

/// The best hits of a search and the number of documents that matched.
#[derive(Debug, Clone, Default)]
pub struct TopHits {
    pub hits: Vec<ScoredHit>,
    pub total: usize,
}

/// Query execution over an immutable [`IndexSnapshot`].
///
/// Searchers are cheap to clone and safe to share between threads. Deleted
/// documents never match. Segments are evaluated in parallel and their
/// partial results merged.
#[derive(Debug, Clone)]
pub struct Searcher {
    snapshot: Arc<IndexSnapshot>,
    registry: Arc<FieldAnalyzerRegistry>,
    bm25: Bm25,
}

impl Searcher {
    pub fn new(snapshot: Arc<IndexSnapshot>, registry: Arc<FieldAnalyzerRegistry>) -> Self {
        Searcher {
            snapshot,
            registry,
            bm25: Bm25::default(),
        }
    }

    pub fn with_bm25(mut self, bm25: Bm25) -> Self {
        self.bm25 = bm25;
        self
    }

    pub fn snapshot(&self) -> &Arc<IndexSnapshot> {
        &self.snapshot
    }

    pub fn registry(&self) -> &FieldAnalyzerRegistry {
        &self.registry
    }

    /// Stored fields of a hit.
    pub fn document(&self, doc: u32) -> Option<&StoredDocument> {
        self.snapshot.document(doc)
    }

    /// Top `limit` live documents matching `query` and `filter` under `sort`.
    ///
    /// An empty sort list orders by relevance.
    pub fn search(
        &self,
        query: &Query,
        filter: Option<&Filter>,
        sort: &[SortField],
        limit: usize,
    ) -> Result<TopHits> {
        let relevance = [SortField::Relevance];
        let sort = if sort.is_empty() { &relevance[..] } else { sort };

        let collectors = self
            .snapshot
            .segments()
            .par_iter()
            .map(|view| self.search_segment(view, query, filter, sort, limit))
            .collect::<Result<Vec<_>>>()?;

        let mut merged = TopCollector::new(limit);
        for collector in collectors {
            merged.merge(collector);
        }
        let total = merged.total_hits();
        let hits = merged
            .into_sorted_vec()
            .into_iter()
            .map(|hit| ScoredHit {
                doc: hit.doc,
                score: hit.score,
            })
            .collect::<Vec<_>>();

        trace!("query {query} matched {total} documents, returning {}", hits.len());
        Ok(TopHits { hits, total })
    }

    /// Number of live documents matching `query` and `filter`.
    pub fn count(&self, query: &Query, filter: Option<&Filter>) -> Result<usize> {
        Ok(self.search(query, filter, &[], 0)?.total)
    }

    fn search_segment(
        &self,
        view: &SegmentView,
        query: &Query,
        filter: Option<&Filter>,
        sort: &[SortField],
        limit: usize,
    ) -> Result<TopCollector> {
        let mut collector = TopCollector::new(limit);
        if view.live_count() == 0 {
            return Ok(collector);
        }

        let segment = view.segment();
        let allowed = filter
            .map(|filter| filter.matching_docs(segment, &self.registry))
            .transpose()?;
        let scores = QueryScorer::new(&self.snapshot, self.bm25).evaluate(query, view);

        for (local, score) in scores {
            if view.is_deleted(local) {
                continue;
            }
            if let Some(bits) = &allowed {
                if !bits.get(local as usize).unwrap_or(false) {
                    continue;
                }
            }
            let doc = view
                .base()
                .checked_add(local)
                .ok_or_else(|| FolioError::index("document id overflow"))?;
            let keys = sort
                .iter()
                .map(|field| match field {
                    SortField::Relevance => SortKey::Score(score),
                    SortField::Field { name, reverse } => SortKey::Value {
                        value: segment.value(local, name).cloned(),
                        reverse: *reverse,
                    },
                })
                .collect();
            collector.collect(RankedHit { doc, score, keys });
        }
        Ok(collector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::document::IndexDocument;
    use crate::document::field::Field;
    use crate::index::segment::Segment;
    use crate::query::filter::FilterClause;
    use bit_vec::BitVec;

    fn doc(id: &str, folder: &str, name: &str, content: &str) -> IndexDocument {
        IndexDocument::builder()
            .add(Field::keyword("id", id))
            .add(Field::keyword("folder", folder))
            .add(Field::new("name", name, true, true))
            .add(Field::unstored_text("content", content))
            .build()
    }

    fn searcher(segments: Vec<Vec<IndexDocument>>, deleted: &[(usize, usize)]) -> Searcher {
        let registry = Arc::new(FieldAnalyzerRegistry::for_files());
        let views = segments
            .into_iter()
            .enumerate()
            .map(|(i, docs)| {
                let mut segment = Segment::new(i as u64);
                for doc in &docs {
                    segment.add_document(doc, &registry, "id").unwrap();
                }
                let mut bits = BitVec::from_elem(docs.len(), false);
                for &(seg, local) in deleted {
                    if seg == i {
                        bits.set(local, true);
                    }
                }
                SegmentView::new(Arc::new(segment), Arc::new(bits))
            })
            .collect();
        Searcher::new(Arc::new(IndexSnapshot::from_views(1, 0, views)), registry)
    }

    fn ids(searcher: &Searcher, hits: &TopHits) -> Vec<String> {
        hits.hits
            .iter()
            .map(|hit| {
                searcher
                    .document(hit.doc)
                    .and_then(|doc| doc.get_text("id"))
                    .unwrap()
                    .to_string()
            })
            .collect()
    }

    #[test]
    fn test_relevance_across_segments() {
        let searcher = searcher(
            vec![
                vec![
                    doc("1", "/a", "one.txt", "quarterly report draft"),
                    doc("2", "/a", "two.txt", "holiday photos"),
                ],
                vec![doc("3", "/b", "three.txt", "report report report")],
            ],
            &[],
        );
        let hits = searcher
            .search(&Query::term("content", "report"), None, &[], 10)
            .unwrap();
        assert_eq!(hits.total, 2);
        assert_eq!(ids(&searcher, &hits), vec!["3", "1"]);
        assert!(hits.hits[0].score > hits.hits[1].score);
    }

    #[test]
    fn test_filter_and_deletions() {
        let searcher = searcher(
            vec![vec![
                doc("1", "/a", "one.txt", "report"),
                doc("2", "/b", "two.txt", "report"),
                doc("3", "/a", "three.txt", "report"),
            ]],
            &[(0, 2)],
        );
        let filter = Filter::from(FilterClause::eq("folder", "/a"));
        let hits = searcher
            .search(&Query::All, Some(&filter), &[], 10)
            .unwrap();
        assert_eq!(hits.total, 1);
        assert_eq!(ids(&searcher, &hits), vec!["1"]);
        assert_eq!(searcher.count(&Query::All, None).unwrap(), 2);
    }

    #[test]
    fn test_field_sort_and_limit() {
        let searcher = searcher(
            vec![
                vec![doc("1", "/a", "c.txt", "x"), doc("2", "/a", "a.txt", "x")],
                vec![doc("3", "/a", "b.txt", "x")],
            ],
            &[],
        );
        let hits = searcher
            .search(&Query::All, None, &[SortField::field("name")], 2)
            .unwrap();
        assert_eq!(hits.total, 3);
        assert_eq!(ids(&searcher, &hits), vec!["2", "3"]);

        let hits = searcher
            .search(&Query::All, None, &[SortField::field_desc("name")], 10)
            .unwrap();
        assert_eq!(ids(&searcher, &hits), vec!["1", "3", "2"]);
    }
}
