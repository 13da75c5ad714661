//! BM25 scoring and per-segment query evaluation.

use ahash::AHashMap;

use crate::index::reader::{IndexSnapshot, SegmentView};
use crate::query::query::Query;

/// Matching documents of one segment with their scores, by local id.
pub type SegmentScores = AHashMap<u32, f32>;

/// BM25 parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25 {
    /// Term frequency saturation.
    pub k1: f32,
    /// Field length normalization.
    pub b: f32,
}

impl Default for Bm25 {
    fn default() -> Self {
        Bm25 { k1: 1.2, b: 0.75 }
    }
}

impl Bm25 {
    /// Inverse document frequency, always positive.
    pub fn idf(&self, doc_count: u32, doc_freq: u32) -> f32 {
        let n = doc_count as f32;
        let df = doc_freq as f32;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    /// Score of one term occurrence count in a field of the given length.
    pub fn score(&self, idf: f32, freq: u32, field_length: u32, average_length: f32) -> f32 {
        let tf = freq as f32;
        let norm = if average_length > 0.0 {
            1.0 - self.b + self.b * field_length as f32 / average_length
        } else {
            1.0
        };
        idf * tf * (self.k1 + 1.0) / (tf + self.k1 * norm)
    }
}

/// Evaluates queries segment by segment against snapshot-wide statistics.
#[derive(Debug, Clone, Copy)]
pub struct QueryScorer<'a> {
    snapshot: &'a IndexSnapshot,
    bm25: Bm25,
}

impl<'a> QueryScorer<'a> {
    pub fn new(snapshot: &'a IndexSnapshot, bm25: Bm25) -> Self {
        QueryScorer { snapshot, bm25 }
    }

    /// Documents of `view` matching `query`, deleted ones included.
    pub fn evaluate(&self, query: &Query, view: &SegmentView) -> SegmentScores {
        let segment = view.segment();
        match query {
            Query::All => (0..segment.doc_count()).map(|doc| (doc, 1.0)).collect(),
            Query::Term { field, term } => self.term_scores(view, field, term),
            Query::Prefix { field, prefix } => {
                let mut scores = SegmentScores::new();
                for (_, postings) in segment.terms_with_prefix(field, prefix) {
                    for posting in postings {
                        scores.insert(posting.doc, 1.0);
                    }
                }
                scores
            }
            Query::Phrase { field, terms } => {
                let mut result: Option<SegmentScores> = None;
                for term in terms {
                    let scores = self.term_scores(view, field, term);
                    result = Some(match result {
                        None => scores,
                        Some(acc) => intersect(acc, &scores),
                    });
                }
                result.unwrap_or_default()
            }
            Query::Boolean {
                must,
                should,
                must_not,
            } => self.boolean_scores(view, must, should, must_not),
        }
    }

    fn term_scores(&self, view: &SegmentView, field: &str, term: &str) -> SegmentScores {
        let segment = view.segment();
        let postings = segment.postings(field, term);
        if postings.is_empty() {
            return SegmentScores::new();
        }

        let idf = self
            .bm25
            .idf(self.snapshot.max_doc(), self.snapshot.doc_freq(field, term));
        let average = self.snapshot.average_field_length(field);

        postings
            .iter()
            .map(|posting| {
                let length = segment
                    .doc(posting.doc)
                    .and_then(|doc| doc.lengths.get(field).copied())
                    .unwrap_or(1);
                (
                    posting.doc,
                    self.bm25.score(idf, posting.freq, length, average),
                )
            })
            .collect()
    }

    fn boolean_scores(
        &self,
        view: &SegmentView,
        must: &[Query],
        should: &[Query],
        must_not: &[Query],
    ) -> SegmentScores {
        let mut result = if !must.is_empty() {
            let mut acc: Option<SegmentScores> = None;
            for clause in must {
                let scores = self.evaluate(clause, view);
                acc = Some(match acc {
                    None => scores,
                    Some(acc) => intersect(acc, &scores),
                });
            }
            let mut acc = acc.unwrap_or_default();
            for clause in should {
                for (doc, score) in self.evaluate(clause, view) {
                    if let Some(total) = acc.get_mut(&doc) {
                        *total += score;
                    }
                }
            }
            acc
        } else if !should.is_empty() {
            let mut acc = SegmentScores::new();
            for clause in should {
                for (doc, score) in self.evaluate(clause, view) {
                    *acc.entry(doc).or_insert(0.0) += score;
                }
            }
            acc
        } else if !must_not.is_empty() {
            self.evaluate(&Query::All, view)
        } else {
            return SegmentScores::new();
        };

        for clause in must_not {
            for doc in self.evaluate(clause, view).keys() {
                result.remove(doc);
            }
        }
        result
    }
}

/// Keep documents present in both, adding their scores.
fn intersect(mut acc: SegmentScores, other: &SegmentScores) -> SegmentScores {
    acc.retain(|doc, score| match other.get(doc) {
        Some(extra) => {
            *score += extra;
            true
        }
        None => false,
    });
    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::registry::FieldAnalyzerRegistry;
    use crate::document::document::IndexDocument;
    use crate::document::field::Field;
    use crate::index::segment::Segment;
    use bit_vec::BitVec;
    use std::sync::Arc;

    fn snapshot(contents: &[&str]) -> IndexSnapshot {
        let registry = FieldAnalyzerRegistry::for_files();
        let mut segment = Segment::new(0);
        for (i, content) in contents.iter().enumerate() {
            let doc = IndexDocument::builder()
                .add(Field::keyword("id", i.to_string()))
                .add(Field::unstored_text("content", *content))
                .build();
            segment.add_document(&doc, &registry, "id").unwrap();
        }
        let deleted = BitVec::from_elem(contents.len(), false);
        IndexSnapshot::from_views(
            1,
            0,
            vec![SegmentView::new(Arc::new(segment), Arc::new(deleted))],
        )
    }

    fn docs(scores: &SegmentScores) -> Vec<u32> {
        let mut docs: Vec<u32> = scores.keys().copied().collect();
        docs.sort_unstable();
        docs
    }

    #[test]
    fn test_bm25_prefers_rare_terms_and_short_fields() {
        let bm25 = Bm25::default();
        assert!(bm25.idf(100, 1) > bm25.idf(100, 50));
        assert!(bm25.idf(10, 10) > 0.0);

        let idf = bm25.idf(10, 2);
        assert!(bm25.score(idf, 1, 2, 10.0) > bm25.score(idf, 1, 20, 10.0));
        assert!(bm25.score(idf, 3, 10, 10.0) > bm25.score(idf, 1, 10, 10.0));
    }

    #[test]
    fn test_term_and_phrase() {
        let snapshot = snapshot(&["alpha beta", "alpha", "beta gamma"]);
        let scorer = QueryScorer::new(&snapshot, Bm25::default());
        let view = &snapshot.segments()[0];

        let alpha = scorer.evaluate(&Query::term("content", "alpha"), view);
        assert_eq!(docs(&alpha), vec![0, 1]);
        // The shorter field scores higher
        assert!(alpha[&1] > alpha[&0]);

        let phrase = Query::Phrase {
            field: "content".to_string(),
            terms: vec!["alpha".to_string(), "beta".to_string()],
        };
        assert_eq!(docs(&scorer.evaluate(&phrase, view)), vec![0]);
        assert_eq!(docs(&scorer.evaluate(&Query::prefix("content", "gam"), view)), vec![2]);
    }

    #[test]
    fn test_boolean() {
        let snapshot = snapshot(&["alpha beta", "alpha", "beta gamma", "delta"]);
        let scorer = QueryScorer::new(&snapshot, Bm25::default());
        let view = &snapshot.segments()[0];

        let query = Query::boolean()
            .should(Query::term("content", "alpha"))
            .should(Query::term("content", "gamma"));
        assert_eq!(docs(&scorer.evaluate(&query, view)), vec![0, 1, 2]);

        let query = Query::boolean()
            .must(Query::term("content", "beta"))
            .should(Query::term("content", "gamma"));
        let scores = scorer.evaluate(&query, view);
        assert_eq!(docs(&scores), vec![0, 2]);
        assert!(scores[&2] > scores[&0]);

        let query = Query::boolean().must_not(Query::term("content", "alpha"));
        assert_eq!(docs(&scorer.evaluate(&query, view)), vec![2, 3]);

        assert!(scorer.evaluate(&Query::boolean(), view).is_empty());
        assert_eq!(scorer.evaluate(&Query::All, view).len(), 4);
    }
}
