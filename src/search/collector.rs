//! Bounded top-N collection under a sort order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::document::field::FieldValue;

/// One component of a hit's position in the sort order.
#[derive(Debug, Clone, PartialEq)]
pub enum SortKey {
    /// Relevance score, higher first.
    Score(f32),
    /// Field value, ascending unless reversed. Missing values sort last.
    Value {
        value: Option<FieldValue>,
        reverse: bool,
    },
}

impl SortKey {
    /// Greater means `self` ranks below `other`.
    fn rank_cmp(&self, other: &SortKey) -> Ordering {
        match (self, other) {
            (SortKey::Score(a), SortKey::Score(b)) => b.total_cmp(a),
            (
                SortKey::Value { value: a, reverse },
                SortKey::Value { value: b, .. },
            ) => match (a, b) {
                (Some(a), Some(b)) => {
                    let ord = a.compare(b);
                    if *reverse { ord.reverse() } else { ord }
                }
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
            // Keys are built from one sort list, so kinds always line up
            _ => Ordering::Equal,
        }
    }
}

/// A candidate hit with its sort keys.
#[derive(Debug, Clone)]
pub struct RankedHit {
    pub doc: u32,
    pub score: f32,
    pub keys: Vec<SortKey>,
}

impl PartialEq for RankedHit {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RankedHit {}

impl PartialOrd for RankedHit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RankedHit {
    // Greater is worse, so the heap top is the weakest kept hit
    fn cmp(&self, other: &Self) -> Ordering {
        self.keys
            .iter()
            .zip(&other.keys)
            .map(|(a, b)| a.rank_cmp(b))
            .find(|ord| ord.is_ne())
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.doc.cmp(&other.doc))
    }
}

/// Keeps the best `limit` hits seen and counts every hit offered.
#[derive(Debug)]
pub struct TopCollector {
    limit: usize,
    hits: BinaryHeap<RankedHit>,
    total_hits: usize,
}

impl TopCollector {
    pub fn new(limit: usize) -> Self {
        TopCollector {
            limit,
            hits: BinaryHeap::with_capacity(limit.min(1024)),
            total_hits: 0,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn total_hits(&self) -> usize {
        self.total_hits
    }

    pub fn collect(&mut self, hit: RankedHit) {
        self.total_hits += 1;
        self.offer(hit);
    }

    /// Fold another collector's hits and count into this one.
    pub fn merge(&mut self, other: TopCollector) {
        self.total_hits += other.total_hits;
        for hit in other.hits {
            self.offer(hit);
        }
    }

    /// Kept hits, best first.
    pub fn into_sorted_vec(self) -> Vec<RankedHit> {
        self.hits.into_sorted_vec()
    }

    fn offer(&mut self, hit: RankedHit) {
        if self.limit == 0 {
            return;
        }
        if self.hits.len() < self.limit {
            self.hits.push(hit);
        } else if let Some(mut worst) = self.hits.peek_mut() {
            if hit < *worst {
                *worst = hit;
            }
        }
    }
}
