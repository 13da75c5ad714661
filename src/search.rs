//! Query execution: BM25 scoring, top-N collection and the snapshot searcher.

pub mod collector;
pub mod scorer;
pub mod searcher;

pub use collector::{RankedHit, SortKey, TopCollector};
pub use scorer::{Bm25, QueryScorer};
pub use searcher::{ScoredHit, Searcher, TopHits};
