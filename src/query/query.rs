//! Scored queries.

use std::fmt;

/// A scored query over analyzed terms.
///
/// Terms held by a query are already analyzed; [`QueryParser`] produces them
/// from free text using the field registry.
///
/// [`QueryParser`]: crate::query::parser::QueryParser
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Every live document, with a constant score.
    All,

    /// An exact term in one field.
    Term { field: String, term: String },

    /// Any term of the field starting with `prefix`, with a constant score.
    Prefix { field: String, prefix: String },

    /// Every term must occur in the field; scores add up.
    Phrase { field: String, terms: Vec<String> },

    /// A combination of clauses.
    ///
    /// With `must` clauses the result is their intersection and `should`
    /// clauses only add score. Without them the result is the union of the
    /// `should` clauses, or every document when only `must_not` clauses are
    /// present. `must_not` matches are always removed. A boolean query with no
    /// clauses at all matches nothing.
    Boolean {
        must: Vec<Query>,
        should: Vec<Query>,
        must_not: Vec<Query>,
    },
}

impl Query {
    pub fn term<F: Into<String>, T: Into<String>>(field: F, term: T) -> Self {
        Query::Term {
            field: field.into(),
            term: term.into(),
        }
    }

    pub fn prefix<F: Into<String>, P: Into<String>>(field: F, prefix: P) -> Self {
        Query::Prefix {
            field: field.into(),
            prefix: prefix.into(),
        }
    }

    /// An empty boolean query, to be filled with [`Query::must`] and friends.
    pub fn boolean() -> Self {
        Query::Boolean {
            must: Vec::new(),
            should: Vec::new(),
            must_not: Vec::new(),
        }
    }

    /// Add a required clause to a boolean query; other queries are wrapped first.
    pub fn must(self, clause: Query) -> Self {
        let (mut must, should, must_not) = self.into_parts();
        must.push(clause);
        Query::Boolean {
            must,
            should,
            must_not,
        }
    }

    /// Add an optional clause.
    pub fn should(self, clause: Query) -> Self {
        let (must, mut should, must_not) = self.into_parts();
        should.push(clause);
        Query::Boolean {
            must,
            should,
            must_not,
        }
    }

    /// Add an excluding clause.
    pub fn must_not(self, clause: Query) -> Self {
        let (must, should, mut must_not) = self.into_parts();
        must_not.push(clause);
        Query::Boolean {
            must,
            should,
            must_not,
        }
    }

    fn into_parts(self) -> (Vec<Query>, Vec<Query>, Vec<Query>) {
        match self {
            Query::Boolean {
                must,
                should,
                must_not,
            } => (must, should, must_not),
            other => (vec![other], Vec::new(), Vec::new()),
        }
    }

    /// Whether this is a boolean query without clauses.
    pub fn is_empty_boolean(&self) -> bool {
        matches!(
            self,
            Query::Boolean { must, should, must_not }
                if must.is_empty() && should.is_empty() && must_not.is_empty()
        )
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::All => write!(f, "*:*"),
            Query::Term { field, term } => write!(f, "{field}:{term}"),
            Query::Prefix { field, prefix } => write!(f, "{field}:{prefix}*"),
            Query::Phrase { field, terms } => write!(f, "{field}:\"{}\"", terms.join(" ")),
            Query::Boolean {
                must,
                should,
                must_not,
            } => {
                let clauses: Vec<String> = must
                    .iter()
                    .map(|q| format!("+{q}"))
                    .chain(should.iter().map(|q| q.to_string()))
                    .chain(must_not.iter().map(|q| format!("-{q}")))
                    .collect();
                write!(f, "({})", clauses.join(" "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boolean_builder() {
        let query = Query::boolean()
            .must(Query::term("folder", "/docs"))
            .should(Query::prefix("content", "rep"))
            .must_not(Query::term("name", "x"));

        assert_eq!(query.to_string(), "(+folder:/docs content:rep* -name:x)");
        assert!(!query.is_empty_boolean());
        assert!(Query::boolean().is_empty_boolean());
    }

    #[test]
    fn test_wrapping_non_boolean() {
        let query = Query::term("a", "1").must(Query::term("b", "2"));
        assert_eq!(query.to_string(), "(+a:1 +b:2)");
    }
}
