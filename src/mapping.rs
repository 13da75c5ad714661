//! Conversion between file descriptions and index documents.
//!
//! [`FileRecord`] is what producers push; [`FileHit`] is what a search
//! returns. Field conventions match [`FieldAnalyzerRegistry::for_files`]:
//! `id` and `folder` are exact, `name` is case-insensitive exact with a
//! tokenized `name_text` twin, and `content` is tokenized but not stored.
//!
//! [`FieldAnalyzerRegistry::for_files`]: crate::analysis::registry::FieldAnalyzerRegistry::for_files

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::tokenizer::whole::normalize_path;
use crate::document::document::IndexDocument;
use crate::document::field::Field;
use crate::document::stored::StoredDocument;
use crate::error::{FolioError, Result};

pub const ID_FIELD: &str = "id";
pub const NAME_FIELD: &str = "name";
pub const NAME_TEXT_FIELD: &str = "name_text";
pub const FOLDER_FIELD: &str = "folder";
pub const EXTENSION_FIELD: &str = "extension";
pub const CONTENT_FIELD: &str = "content";
pub const CREATED_FIELD: &str = "created";
pub const MODIFIED_FIELD: &str = "modified";
pub const SIZE_FIELD: &str = "size";

/// Fields free-text queries search when none is named.
pub const DEFAULT_TEXT_FIELDS: [&str; 2] = [NAME_TEXT_FIELD, CONTENT_FIELD];

/// Turns a stored record into an application result.
pub trait HitMapper<T> {
    fn map(&self, doc: &StoredDocument) -> Result<T>;
}

impl<T, F> HitMapper<T> for F
where
    F: Fn(&StoredDocument) -> Result<T>,
{
    fn map(&self, doc: &StoredDocument) -> Result<T> {
        self(doc)
    }
}

/// A file to index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub name: String,
    pub folder: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub size: Option<i64>,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub modified: Option<DateTime<Utc>>,
}

impl FileRecord {
    pub fn new<I, N, F>(id: I, name: N, folder: F) -> Self
    where
        I: Into<String>,
        N: Into<String>,
        F: Into<String>,
    {
        FileRecord {
            id: id.into(),
            name: name.into(),
            folder: folder.into(),
            content: None,
            size: None,
            created: None,
            modified: None,
        }
    }

    pub fn with_content<S: Into<String>>(mut self, content: S) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_size(mut self, size: i64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_modified(mut self, modified: DateTime<Utc>) -> Self {
        self.modified = Some(modified);
        self
    }

    pub fn with_created(mut self, created: DateTime<Utc>) -> Self {
        self.created = Some(created);
        self
    }

    /// Lower-cased extension without the dot, if the name has one.
    pub fn extension(&self) -> Option<String> {
        let (stem, extension) = self.name.rsplit_once('.')?;
        if stem.is_empty() || extension.is_empty() {
            return None;
        }
        Some(extension.to_lowercase())
    }

    pub fn to_index_document(&self) -> IndexDocument {
        IndexDocument::builder()
            .add(Field::keyword(ID_FIELD, self.id.as_str()))
            .add(Field::keyword(FOLDER_FIELD, normalize_folder(&self.folder)))
            .add(Field::new(NAME_FIELD, self.name.as_str(), true, true))
            .add(Field::new(NAME_TEXT_FIELD, self.name.as_str(), false, true))
            .add_opt(
                self.extension()
                    .map(|ext| Field::new(EXTENSION_FIELD, ext, true, true)),
            )
            .add_opt(
                self.content
                    .as_deref()
                    .map(|content| Field::unstored_text(CONTENT_FIELD, content)),
            )
            .add_opt(self.size.map(|size| Field::integer(SIZE_FIELD, size)))
            .add_opt(self.created.map(|at| Field::datetime(CREATED_FIELD, at)))
            .add_opt(self.modified.map(|at| Field::datetime(MODIFIED_FIELD, at)))
            .build()
    }
}

/// A file found by a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileHit {
    pub id: String,
    pub name: String,
    pub folder: String,
    pub extension: Option<String>,
    pub size: Option<i64>,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
}

impl FileHit {
    /// Map a stored record. `id`, `name` and `folder` must be present.
    pub fn from_stored(doc: &StoredDocument) -> Result<FileHit> {
        let required = |field: &str| {
            doc.get_text(field).map(str::to_string).ok_or_else(|| {
                FolioError::index(format!("stored document has no '{field}' field"))
            })
        };
        Ok(FileHit {
            id: required(ID_FIELD)?,
            name: required(NAME_FIELD)?,
            folder: required(FOLDER_FIELD)?,
            extension: doc.get_text(EXTENSION_FIELD).map(str::to_string),
            size: doc.get_integer(SIZE_FIELD),
            created: doc.get_datetime(CREATED_FIELD),
            modified: doc.get_datetime(MODIFIED_FIELD),
        })
    }
}

/// Normalize a folder path: backslashes become `/`, then leading and
/// trailing `~` and `/` are trimmed.
///
/// The `folder` field applies the same normalization to indexed values and
/// filter values, so callers only need this for display or comparisons.
///
/// ```
/// use folio::mapping::normalize_folder;
///
/// assert_eq!(normalize_folder("~/Images\\2024/"), "Images/2024");
/// assert_eq!(normalize_folder("/"), "");
/// ```
pub fn normalize_folder(path: &str) -> String {
    normalize_path(path)
}
