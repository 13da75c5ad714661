//! Stored-field records returned by searches.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::field::FieldValue;

/// The stored fields of one document, as read back from a snapshot.
///
/// Repeated fields keep every value in insertion order; the single-value
/// accessors return the first one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    fields: BTreeMap<String, Vec<FieldValue>>,
}

impl StoredDocument {
    /// Create an empty record.
    pub fn new() -> Self {
        StoredDocument {
            fields: BTreeMap::new(),
        }
    }

    /// Append a value to a field.
    pub fn insert<S: Into<String>>(&mut self, name: S, value: FieldValue) {
        self.fields.entry(name.into()).or_default().push(value);
    }

    /// First value of a field.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name).and_then(|values| values.first())
    }

    /// All values of a field.
    pub fn get_all(&self, name: &str) -> &[FieldValue] {
        self.fields.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get_text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_text)
    }

    pub fn get_integer(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(FieldValue::as_integer)
    }

    pub fn get_datetime(&self, name: &str) -> Option<DateTime<Utc>> {
        self.get(name).and_then(FieldValue::as_datetime)
    }

    /// Names of all stored fields, sorted.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_valued_field() {
        let mut doc = StoredDocument::new();
        doc.insert("tag", FieldValue::Text("a".into()));
        doc.insert("tag", FieldValue::Text("b".into()));

        assert_eq!(doc.get_text("tag"), Some("a"));
        assert_eq!(doc.get_all("tag").len(), 2);
        assert_eq!(doc.get_all("missing").len(), 0);
        assert_eq!(doc.field_names().collect::<Vec<_>>(), vec!["tag"]);
    }
}
