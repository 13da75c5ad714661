//! Non-scoring filters.
//!
//! A [`Filter`] restricts the candidate set before ranking. Its clauses are
//! combined with AND; an empty filter matches every document.
//!
//! `Eq`, `NotEq`, `AnyOf` and `Prefix` compare terms, so text values go through
//! the field's registered analysis exactly as they did at index time. `Range`
//! compares the raw typed values recorded for fields that are not tokenized
//! text: numerically for integers and datetimes, lexicographically for text.
//!
//! # Example
//!
//! ```
//! use folio::query::filter::{Filter, FilterClause};
//!
//! let filter = Filter::new()
//!     .with(FilterClause::eq("folder", "/docs"))
//!     .with(FilterClause::range("size", Some(1024i64), None::<i64>));
//!
//! assert_eq!(filter.clauses().len(), 2);
//! ```

use std::cmp::Ordering;

use bit_vec::BitVec;

use crate::analysis::registry::FieldAnalyzerRegistry;
use crate::document::field::FieldValue;
use crate::error::Result;
use crate::index::segment::Segment;

/// One structured condition on a field.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterClause {
    /// The field holds the value.
    Eq { field: String, value: FieldValue },

    /// The field does not hold the value (documents without the field match).
    NotEq { field: String, value: FieldValue },

    /// The field holds a term starting with the prefix.
    Prefix { field: String, prefix: String },

    /// The field holds at least one of the values.
    AnyOf {
        field: String,
        values: Vec<FieldValue>,
    },

    /// The field's value lies within inclusive bounds.
    Range {
        field: String,
        lower: Option<FieldValue>,
        upper: Option<FieldValue>,
    },
}

impl FilterClause {
    pub fn eq<S: Into<String>, V: Into<FieldValue>>(field: S, value: V) -> Self {
        FilterClause::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn not_eq<S: Into<String>, V: Into<FieldValue>>(field: S, value: V) -> Self {
        FilterClause::NotEq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn prefix<S: Into<String>, P: Into<String>>(field: S, prefix: P) -> Self {
        FilterClause::Prefix {
            field: field.into(),
            prefix: prefix.into(),
        }
    }

    pub fn any_of<S, V, I>(field: S, values: I) -> Self
    where
        S: Into<String>,
        V: Into<FieldValue>,
        I: IntoIterator<Item = V>,
    {
        FilterClause::AnyOf {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn range<S, V, W>(field: S, lower: Option<V>, upper: Option<W>) -> Self
    where
        S: Into<String>,
        V: Into<FieldValue>,
        W: Into<FieldValue>,
    {
        FilterClause::Range {
            field: field.into(),
            lower: lower.map(Into::into),
            upper: upper.map(Into::into),
        }
    }

    /// Name of the field the clause applies to.
    pub fn field(&self) -> &str {
        match self {
            FilterClause::Eq { field, .. }
            | FilterClause::NotEq { field, .. }
            | FilterClause::Prefix { field, .. }
            | FilterClause::AnyOf { field, .. }
            | FilterClause::Range { field, .. } => field,
        }
    }

    /// Documents of a segment satisfying this clause.
    pub fn matching_docs(
        &self,
        segment: &Segment,
        registry: &FieldAnalyzerRegistry,
    ) -> Result<BitVec> {
        let doc_count = segment.doc_count() as usize;
        match self {
            FilterClause::Eq { field, value } => {
                value_matches(segment, registry, field, value, doc_count)
            }
            FilterClause::NotEq { field, value } => {
                let mut bits = value_matches(segment, registry, field, value, doc_count)?;
                bits.negate();
                Ok(bits)
            }
            FilterClause::Prefix { field, prefix } => {
                let mut bits = BitVec::from_elem(doc_count, false);
                let prefix = registry.normalize_prefix(field, prefix);
                for (_, postings) in segment.terms_with_prefix(field, &prefix) {
                    for posting in postings {
                        bits.set(posting.doc as usize, true);
                    }
                }
                Ok(bits)
            }
            FilterClause::AnyOf { field, values } => {
                let mut bits = BitVec::from_elem(doc_count, false);
                for value in values {
                    bits.or(&value_matches(segment, registry, field, value, doc_count)?);
                }
                Ok(bits)
            }
            FilterClause::Range {
                field,
                lower,
                upper,
            } => {
                let mut bits = BitVec::from_elem(doc_count, false);
                for local in 0..segment.doc_count() {
                    let Some(value) = segment.value(local, field) else {
                        continue;
                    };
                    let above = lower
                        .as_ref()
                        .is_none_or(|lower| in_order(lower, value));
                    let below = upper
                        .as_ref()
                        .is_none_or(|upper| in_order(value, upper));
                    if above && below {
                        bits.set(local as usize, true);
                    }
                }
                Ok(bits)
            }
        }
    }
}

/// Whether `low <= high` for values of the same type.
fn in_order(low: &FieldValue, high: &FieldValue) -> bool {
    same_type(low, high) && low.compare(high) != Ordering::Greater
}

fn same_type(a: &FieldValue, b: &FieldValue) -> bool {
    std::mem::discriminant(a) == std::mem::discriminant(b)
}

/// Documents holding every term the value analyzes to.
fn value_matches(
    segment: &Segment,
    registry: &FieldAnalyzerRegistry,
    field: &str,
    value: &FieldValue,
    doc_count: usize,
) -> Result<BitVec> {
    let terms = match value {
        FieldValue::Text(text) => registry.terms(field, text)?,
        other => vec![other.to_term_text()],
    };
    if terms.is_empty() {
        return Ok(BitVec::from_elem(doc_count, false));
    }

    let mut result: Option<BitVec> = None;
    for term in &terms {
        let mut bits = BitVec::from_elem(doc_count, false);
        for posting in segment.postings(field, term) {
            bits.set(posting.doc as usize, true);
        }
        match result.as_mut() {
            Some(acc) => {
                acc.and(&bits);
            }
            None => result = Some(bits),
        }
    }
    Ok(result.unwrap_or_else(|| BitVec::from_elem(doc_count, false)))
}

/// A conjunction of filter clauses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<FilterClause>,
}

impl Filter {
    /// Create a filter that matches everything.
    pub fn new() -> Self {
        Filter {
            clauses: Vec::new(),
        }
    }

    /// Add a clause (builder style).
    pub fn with(mut self, clause: FilterClause) -> Self {
        self.clauses.push(clause);
        self
    }

    /// Add a clause.
    pub fn add(&mut self, clause: FilterClause) {
        self.clauses.push(clause);
    }

    pub fn clauses(&self) -> &[FilterClause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Documents of a segment satisfying every clause.
    pub fn matching_docs(
        &self,
        segment: &Segment,
        registry: &FieldAnalyzerRegistry,
    ) -> Result<BitVec> {
        let mut bits = BitVec::from_elem(segment.doc_count() as usize, true);
        for clause in &self.clauses {
            bits.and(&clause.matching_docs(segment, registry)?);
        }
        Ok(bits)
    }
}

impl From<FilterClause> for Filter {
    fn from(clause: FilterClause) -> Self {
        Filter::new().with(clause)
    }
}
