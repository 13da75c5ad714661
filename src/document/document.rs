//! The document handed to the index writer.

use serde::{Deserialize, Serialize};

use crate::document::field::{Field, FieldValue};
use crate::document::stored::StoredDocument;

/// An ordered set of fields describing one indexed item.
///
/// Documents are never mutated once handed to the writer; replacing an item
/// means deleting by its key and adding a new document.
///
/// # Examples
///
/// ```
/// use folio::document::document::IndexDocument;
/// use folio::document::field::Field;
///
/// let doc = IndexDocument::builder()
///     .add(Field::keyword("id", "42"))
///     .add(Field::keyword("folder", "/docs"))
///     .add(Field::text("name", "a.txt"))
///     .build();
///
/// assert_eq!(doc.len(), 3);
/// assert_eq!(doc.key("id").as_deref(), Some("42"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    fields: Vec<Field>,
}

impl IndexDocument {
    /// Create an empty document.
    pub fn new() -> Self {
        IndexDocument { fields: Vec::new() }
    }

    /// Start building a document.
    pub fn builder() -> IndexDocumentBuilder {
        IndexDocumentBuilder::new()
    }

    /// Append a field.
    pub fn add_field(&mut self, field: Field) {
        self.fields.push(field);
    }

    /// All fields in insertion order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// The first field with the given name.
    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The first value of the given field.
    pub fn value(&self, name: &str) -> Option<&FieldValue> {
        self.get(name).map(|f| &f.value)
    }

    /// Check whether the document has a field with the given name.
    pub fn has_field(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// The key value used for replace-on-add, read from `key_field`.
    pub fn key(&self, key_field: &str) -> Option<String> {
        self.value(key_field).map(FieldValue::to_term_text)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the document carries no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The stored subset of this document, as returned in hits.
    pub fn to_stored(&self) -> StoredDocument {
        let mut stored = StoredDocument::new();
        for field in self.fields.iter().filter(|f| f.stored) {
            stored.insert(field.name.clone(), field.value.clone());
        }
        stored
    }

    /// Approximate heap footprint in bytes.
    pub fn estimated_size(&self) -> usize {
        self.fields.iter().map(Field::estimated_size).sum()
    }
}

/// Builder for [`IndexDocument`].
#[derive(Debug, Default)]
pub struct IndexDocumentBuilder {
    document: IndexDocument,
}

impl IndexDocumentBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field.
    pub fn add(mut self, field: Field) -> Self {
        self.document.add_field(field);
        self
    }

    /// Add a field only when a value is present.
    pub fn add_opt(self, field: Option<Field>) -> Self {
        match field {
            Some(field) => self.add(field),
            None => self,
        }
    }

    /// Finish building.
    pub fn build(self) -> IndexDocument {
        self.document
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_subset() {
        let doc = IndexDocument::builder()
            .add(Field::keyword("id", "7"))
            .add(Field::unstored_text("content", "secret body"))
            .add(Field::integer("size", 10))
            .build();

        let stored = doc.to_stored();
        assert_eq!(stored.get_text("id"), Some("7"));
        assert_eq!(stored.get_integer("size"), Some(10));
        assert!(stored.get("content").is_none());
    }

    #[test]
    fn test_key_and_empty() {
        let doc = IndexDocument::new();
        assert!(doc.is_empty());
        assert_eq!(doc.key("id"), None);

        let doc = IndexDocument::builder()
            .add(Field::integer("id", 99))
            .add_opt(None)
            .build();
        assert_eq!(doc.key("id"), Some("99".to_string()));
        assert_eq!(doc.len(), 1);
        assert!(doc.estimated_size() > 0);
    }
}
