//! Result orderings.

use std::fmt;
use std::str::FromStr;

use crate::error::{FolioError, Result};

/// One sort key. A sort is a list of keys applied in order; ties on all of
/// them fall back to ascending document id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortField {
    /// Descending relevance score.
    Relevance,

    /// A field's value, ascending unless `reverse`. Documents without the
    /// field sort last in either direction.
    Field { name: String, reverse: bool },
}

impl SortField {
    pub fn field<S: Into<String>>(name: S) -> Self {
        SortField::Field {
            name: name.into(),
            reverse: false,
        }
    }

    pub fn field_desc<S: Into<String>>(name: S) -> Self {
        SortField::Field {
            name: name.into(),
            reverse: true,
        }
    }
}

/// Parses `relevance`, `name`, `name:asc` or `name:desc`.
impl FromStr for SortField {
    type Err = FolioError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(FolioError::invalid_argument("empty sort field"));
        }
        if s.eq_ignore_ascii_case("relevance") || s == "_score" {
            return Ok(SortField::Relevance);
        }

        match s.rsplit_once(':') {
            Some((name, dir)) if dir.eq_ignore_ascii_case("asc") => Ok(SortField::field(name)),
            Some((name, dir)) if dir.eq_ignore_ascii_case("desc") => {
                Ok(SortField::field_desc(name))
            }
            Some((_, dir)) => Err(FolioError::invalid_argument(format!(
                "unknown sort direction '{dir}' in '{s}'"
            ))),
            None => Ok(SortField::field(s)),
        }
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortField::Relevance => write!(f, "relevance"),
            SortField::Field { name, reverse } => {
                write!(f, "{name}:{}", if *reverse { "desc" } else { "asc" })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sort_field() {
        assert_eq!("relevance".parse::<SortField>().unwrap(), SortField::Relevance);
        assert_eq!("name".parse::<SortField>().unwrap(), SortField::field("name"));
        assert_eq!(
            "modified:DESC".parse::<SortField>().unwrap(),
            SortField::field_desc("modified")
        );
        assert!("name:sideways".parse::<SortField>().is_err());
        assert!("".parse::<SortField>().is_err());
    }
}
