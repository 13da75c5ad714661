//! Query construction: structured filters, scored queries, sorts and the
//! free-text parser.
//!
//! - [`filter::Filter`] - Non-scoring clauses that restrict candidates
//! - [`query::Query`] - Scored term, prefix, phrase and boolean queries
//! - [`sort::SortField`] - Relevance or field-value ordering
//! - [`parser::QueryParser`] - Free text to [`query::Query`]

pub mod filter;
pub mod parser;
#[allow(clippy::module_inception)]
pub mod query;
pub mod sort;

pub use filter::{Filter, FilterClause};
pub use parser::QueryParser;
pub use query::Query;
pub use sort::SortField;
