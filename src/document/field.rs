//! Field and field value types.
//!
//! # Examples
//!
//! ```
//! use folio::document::field::{Field, FieldValue};
//!
//! let folder = Field::keyword("folder", "/docs");
//! assert!(folder.stored);
//! assert!(!folder.analyzed);
//!
//! let size = FieldValue::Integer(2048);
//! assert_eq!(size.to_term_text(), "2048");
//! ```

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// A value held by a document field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Text value
    Text(String),
    /// Integer value
    Integer(i64),
    /// DateTime value
    DateTime(DateTime<Utc>),
}

impl FieldValue {
    /// Get the text, if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get the integer, if this is an integer value.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get the timestamp, if this is a datetime value.
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    /// The canonical term text used when the value is indexed verbatim.
    ///
    /// Datetimes use RFC 3339 in UTC at second precision, so equality filters
    /// on timestamps compare whole seconds.
    pub fn to_term_text(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Integer(i) => i.to_string(),
            FieldValue::DateTime(dt) => dt.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    /// Total order over values: same-typed values compare naturally, mixed
    /// types order text before integers before datetimes.
    pub fn compare(&self, other: &FieldValue) -> Ordering {
        match (self, other) {
            (FieldValue::Text(a), FieldValue::Text(b)) => a.cmp(b),
            (FieldValue::Integer(a), FieldValue::Integer(b)) => a.cmp(b),
            (FieldValue::DateTime(a), FieldValue::DateTime(b)) => a.cmp(b),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }

    /// Approximate heap footprint in bytes.
    pub fn estimated_size(&self) -> usize {
        match self {
            FieldValue::Text(s) => s.len() + std::mem::size_of::<String>(),
            FieldValue::Integer(_) | FieldValue::DateTime(_) => std::mem::size_of::<FieldValue>(),
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            FieldValue::Text(_) => 0,
            FieldValue::Integer(_) => 1,
            FieldValue::DateTime(_) => 2,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_term_text())
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::DateTime(value)
    }
}

/// A named value inside an [`IndexDocument`](crate::document::document::IndexDocument).
///
/// `stored` controls whether the value comes back in search hits. `analyzed`
/// controls whether text is run through the field's registered analyzer; when
/// false the value is indexed as one verbatim term. Integer and datetime
/// values are always indexed verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Field name.
    pub name: String,
    /// Field value.
    pub value: FieldValue,
    /// Whether the value is retrievable from hits.
    pub stored: bool,
    /// Whether text goes through the field analyzer.
    pub analyzed: bool,
}

impl Field {
    /// Create a field with explicit flags.
    pub fn new<S: Into<String>, V: Into<FieldValue>>(
        name: S,
        value: V,
        stored: bool,
        analyzed: bool,
    ) -> Self {
        Field {
            name: name.into(),
            value: value.into(),
            stored,
            analyzed,
        }
    }

    /// A stored, analyzed text field.
    pub fn text<S: Into<String>, V: Into<String>>(name: S, value: V) -> Self {
        Self::new(name, FieldValue::Text(value.into()), true, true)
    }

    /// An analyzed text field that is searchable but not returned in hits.
    pub fn unstored_text<S: Into<String>, V: Into<String>>(name: S, value: V) -> Self {
        Self::new(name, FieldValue::Text(value.into()), false, true)
    }

    /// A stored field indexed as a single verbatim term.
    pub fn keyword<S: Into<String>, V: Into<String>>(name: S, value: V) -> Self {
        Self::new(name, FieldValue::Text(value.into()), true, false)
    }

    /// A stored integer field.
    pub fn integer<S: Into<String>>(name: S, value: i64) -> Self {
        Self::new(name, FieldValue::Integer(value), true, false)
    }

    /// A stored datetime field.
    pub fn datetime<S: Into<String>>(name: S, value: DateTime<Utc>) -> Self {
        Self::new(name, FieldValue::DateTime(value), true, false)
    }

    /// Approximate heap footprint in bytes.
    pub fn estimated_size(&self) -> usize {
        self.name.len() + self.value.estimated_size() + std::mem::size_of::<Field>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_field_constructors() {
        let field = Field::unstored_text("content", "quarterly numbers");
        assert!(!field.stored);
        assert!(field.analyzed);
        assert_eq!(field.value.as_text(), Some("quarterly numbers"));

        let field = Field::integer("size", 42);
        assert_eq!(field.value.as_integer(), Some(42));
        assert!(!field.analyzed);
    }

    #[test]
    fn test_datetime_term_text() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
        assert_eq!(
            FieldValue::DateTime(dt).to_term_text(),
            "2024-03-01T12:30:05Z"
        );
    }

    #[test]
    fn test_compare() {
        let a = FieldValue::Integer(9);
        let b = FieldValue::Integer(10);
        assert_eq!(a.compare(&b), Ordering::Less);

        // Text compares lexicographically
        assert_eq!(
            FieldValue::Text("9".into()).compare(&FieldValue::Text("10".into())),
            Ordering::Greater
        );

        // Mixed types order by type
        assert_eq!(
            FieldValue::Text("z".into()).compare(&FieldValue::Integer(0)),
            Ordering::Less
        );
    }
}
