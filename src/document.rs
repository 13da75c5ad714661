//! Documents: the fields written to the index and the stored records read
//! back from it.
//!
//! - [`document::IndexDocument`] - Ordered field list handed to the writer
//! - [`field::Field`] / [`field::FieldValue`] - Field name, value and flags
//! - [`stored::StoredDocument`] - Stored fields returned with a hit

#[allow(clippy::module_inception)]
pub mod document;
pub mod field;
pub mod stored;

pub use document::{IndexDocument, IndexDocumentBuilder};
pub use field::{Field, FieldValue};
pub use stored::StoredDocument;
