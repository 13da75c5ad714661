//! Immutable segments: the unit of persisted index data.
//!
//! A segment holds the stored record, the sortable values and the inverted
//! postings for a contiguous range of documents. The writer fills one
//! in-memory segment as a buffer and freezes it on commit; from then on the
//! segment never changes and deletions live beside it in a `.del` file.

use std::collections::BTreeMap;
use std::ops::Bound;

use bit_vec::BitVec;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::analysis::registry::{FieldAnalysis, FieldAnalyzerRegistry};
use crate::document::document::IndexDocument;
use crate::document::field::FieldValue;
use crate::document::stored::StoredDocument;
use crate::error::{FolioError, Result};
use crate::storage::structured::{read_framed, write_framed};
use crate::storage::traits::Storage;

/// Magic number of segment files ("FSEG").
pub const SEGMENT_MAGIC: u32 = 0x4653_4547;

/// Magic number of deletion files ("FDEL").
pub const DELETES_MAGIC: u32 = 0x4644_454c;

/// On-disk format version of segment and deletion files.
pub const FORMAT_VERSION: u32 = 1;

/// File name of a segment.
pub fn segment_file_name(id: u64) -> String {
    format!("seg_{id:08}.seg")
}

/// File name of a segment's deletions at a given generation.
pub fn deletions_file_name(id: u64, generation: u64) -> String {
    format!("seg_{id:08}_{generation}.del")
}

/// One document's occurrence of a term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    /// Segment-local document id.
    pub doc: u32,
    /// Number of occurrences in the field.
    pub freq: u32,
}

/// Per-document data kept by a segment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentDoc {
    /// Key value used for replace-on-add.
    pub key: Option<String>,

    /// Stored fields returned in hits.
    pub stored: StoredDocument,

    /// First value of every field that is not tokenized text, used for
    /// sorting and range filters.
    pub values: BTreeMap<String, FieldValue>,

    /// Number of terms per analyzed field, used for length normalization.
    pub lengths: BTreeMap<String, u32>,
}

type TermMap = BTreeMap<String, Vec<Posting>>;

/// An inverted index over a range of documents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Segment {
    id: u64,

    docs: Vec<SegmentDoc>,

    /// field -> term -> postings sorted by doc.
    terms: BTreeMap<String, TermMap>,

    /// Sum of field lengths over all documents.
    total_lengths: BTreeMap<String, u64>,

    /// key -> local doc ids carrying it.
    key_index: BTreeMap<String, Vec<u32>>,

    #[serde(skip)]
    estimated_bytes: usize,
}

impl Segment {
    /// Create an empty segment.
    pub fn new(id: u64) -> Self {
        Segment {
            id,
            ..Default::default()
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Assign the id a buffered segment is persisted under.
    pub fn set_id(&mut self, id: u64) {
        self.id = id;
    }

    /// Number of documents, including deleted ones.
    pub fn doc_count(&self) -> u32 {
        self.docs.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Approximate memory held by documents added since creation.
    pub fn estimated_bytes(&self) -> usize {
        self.estimated_bytes
    }

    /// Per-document data for a local id.
    pub fn doc(&self, local: u32) -> Option<&SegmentDoc> {
        self.docs.get(local as usize)
    }

    /// Sortable value of a field.
    pub fn value(&self, local: u32, field: &str) -> Option<&FieldValue> {
        self.doc(local).and_then(|doc| doc.values.get(field))
    }

    /// Postings of an exact term.
    pub fn postings(&self, field: &str, term: &str) -> &[Posting] {
        self.terms
            .get(field)
            .and_then(|terms| terms.get(term))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Terms of a field starting with `prefix`, in term order.
    pub fn terms_with_prefix<'a>(
        &'a self,
        field: &str,
        prefix: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a [Posting])> + 'a {
        self.terms
            .get(field)
            .into_iter()
            .flat_map(move |terms| {
                terms
                    .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
                    .take_while(move |(term, _)| term.starts_with(prefix))
            })
            .map(|(term, postings)| (term.as_str(), postings.as_slice()))
    }

    /// Number of distinct terms in a field.
    pub fn term_count(&self, field: &str) -> usize {
        self.terms.get(field).map(BTreeMap::len).unwrap_or(0)
    }

    /// Sum of the field's lengths over all documents.
    pub fn total_length(&self, field: &str) -> u64 {
        self.total_lengths.get(field).copied().unwrap_or(0)
    }

    /// Local ids of documents carrying a key.
    pub fn docs_with_key(&self, key: &str) -> &[u32] {
        self.key_index.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Analyze and append a document, returning its local id.
    pub fn add_document(
        &mut self,
        doc: &IndexDocument,
        registry: &FieldAnalyzerRegistry,
        key_field: &str,
    ) -> Result<u32> {
        let local = self.doc_count();
        self.docs.try_reserve(1).map_err(|e| {
            FolioError::resource_exhausted(format!("cannot grow segment buffer: {e}"))
        })?;

        let mut entry = SegmentDoc {
            key: doc.key(key_field),
            stored: doc.to_stored(),
            ..Default::default()
        };
        let mut bytes = doc.estimated_size();

        // Analyze everything first so a failure leaves the segment untouched
        let mut analyzed = Vec::with_capacity(doc.len());
        for field in doc.fields() {
            let analysis = registry.analysis_for(&field.name);
            let tokenized = field.analyzed && analysis == FieldAnalysis::Text;
            if !tokenized && !entry.values.contains_key(&field.name) {
                entry.values.insert(field.name.clone(), field.value.clone());
            }

            // Single-term analysis always applies; filters analyze their values the same way
            let terms = match &field.value {
                FieldValue::Text(text) if field.analyzed || analysis.is_single_term() => {
                    registry.terms(&field.name, text)?
                }
                value => vec![value.to_term_text()],
            };
            analyzed.push((field.name.as_str(), terms));
        }

        for (name, terms) in analyzed {
            let mut length = 0u32;
            for term in terms.into_iter().filter(|t| !t.is_empty()) {
                length += 1;
                bytes += term.len();
                let postings = self
                    .terms
                    .entry(name.to_string())
                    .or_default()
                    .entry(term)
                    .or_default();
                match postings.last_mut() {
                    Some(last) if last.doc == local => last.freq += 1,
                    _ => postings.push(Posting {
                        doc: local,
                        freq: 1,
                    }),
                }
            }

            if length > 0 {
                *entry.lengths.entry(name.to_string()).or_insert(0) += length;
                *self.total_lengths.entry(name.to_string()).or_insert(0) += length as u64;
            }
        }

        if let Some(key) = &entry.key {
            self.key_index.entry(key.clone()).or_default().push(local);
        }

        self.docs.push(entry);
        self.estimated_bytes += bytes;
        Ok(local)
    }

    /// Merge the live documents of `parts` into a new segment.
    ///
    /// Documents keep their relative order; deleted documents are dropped.
    pub fn merge(id: u64, parts: &[(&Segment, &BitVec)]) -> Segment {
        let mut merged = Segment::new(id);

        for (segment, deleted) in parts {
            let mut remap: Vec<Option<u32>> = Vec::with_capacity(segment.docs.len());
            for (local, doc) in segment.docs.iter().enumerate() {
                if deleted.get(local).unwrap_or(false) {
                    remap.push(None);
                    continue;
                }
                let new_local = merged.doc_count();
                remap.push(Some(new_local));

                for (field, length) in &doc.lengths {
                    *merged.total_lengths.entry(field.clone()).or_insert(0) += *length as u64;
                }
                if let Some(key) = &doc.key {
                    merged.key_index.entry(key.clone()).or_default().push(new_local);
                }
                merged.docs.push(doc.clone());
            }

            for (field, terms) in &segment.terms {
                for (term, postings) in terms {
                    let mapped: Vec<Posting> = postings
                        .iter()
                        .filter_map(|p| {
                            remap[p.doc as usize].map(|doc| Posting { doc, freq: p.freq })
                        })
                        .collect();
                    if mapped.is_empty() {
                        continue;
                    }
                    merged
                        .terms
                        .entry(field.clone())
                        .or_default()
                        .entry(term.clone())
                        .or_default()
                        .extend(mapped);
                }
            }
        }

        debug!(
            "Merged {} segments into seg_{id:08} ({} docs)",
            parts.len(),
            merged.doc_count()
        );
        merged
    }

    /// Persist the segment under its file name.
    pub fn write_to(&self, storage: &dyn Storage) -> Result<()> {
        let payload = bincode::serialize(self)?;
        let output = storage.create_output(&segment_file_name(self.id))?;
        write_framed(output, SEGMENT_MAGIC, FORMAT_VERSION, &payload)
    }

    /// Load a persisted segment.
    pub fn read_from(storage: &dyn Storage, id: u64) -> Result<Segment> {
        let input = storage.open_input(&segment_file_name(id))?;
        let payload = read_framed(input, SEGMENT_MAGIC, FORMAT_VERSION)?;
        let mut segment: Segment = bincode::deserialize(&payload)?;
        if segment.id != id {
            return Err(FolioError::index(format!(
                "{} holds segment {}",
                segment_file_name(id),
                segment.id
            )));
        }
        segment.estimated_bytes = payload.len();
        Ok(segment)
    }
}

/// Persist the deletion bits of a segment.
pub fn write_deletions(
    storage: &dyn Storage,
    id: u64,
    generation: u64,
    deleted: &BitVec,
) -> Result<()> {
    let payload = bincode::serialize(deleted)?;
    let output = storage.create_output(&deletions_file_name(id, generation))?;
    write_framed(output, DELETES_MAGIC, FORMAT_VERSION, &payload)
}

/// Load the deletion bits of a segment; generation 0 means none.
pub fn read_deletions(
    storage: &dyn Storage,
    id: u64,
    generation: u64,
    doc_count: u32,
) -> Result<BitVec> {
    if generation == 0 {
        return Ok(BitVec::from_elem(doc_count as usize, false));
    }

    let input = storage.open_input(&deletions_file_name(id, generation))?;
    let payload = read_framed(input, DELETES_MAGIC, FORMAT_VERSION)?;
    let deleted: BitVec = bincode::deserialize(&payload)?;
    if deleted.len() != doc_count as usize {
        return Err(FolioError::index(format!(
            "{} covers {} docs, segment has {doc_count}",
            deletions_file_name(id, generation),
            deleted.len()
        )));
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::field::Field;
    use crate::storage::file::FileStorage;
    use tempfile::TempDir;

    fn file_doc(id: &str, name: &str, content: &str) -> IndexDocument {
        IndexDocument::builder()
            .add(Field::keyword("id", id))
            .add(Field::new("name", name, true, true))
            .add(Field::unstored_text("content", content))
            .add(Field::integer("size", content.len() as i64))
            .build()
    }

    #[test]
    fn test_add_document() {
        let registry = FieldAnalyzerRegistry::for_files();
        let mut segment = Segment::new(0);

        let local = segment
            .add_document(&file_doc("1", "Report.PDF", "files and more files"), &registry, "id")
            .unwrap();
        assert_eq!(local, 0);

        assert_eq!(segment.postings("id", "1"), &[Posting { doc: 0, freq: 1 }]);
        assert_eq!(segment.postings("name", "report.pdf").len(), 1);
        assert_eq!(segment.postings("content", "file"), &[Posting { doc: 0, freq: 2 }]);
        // "and" is a stop word
        assert!(segment.postings("content", "and").is_empty());
        assert_eq!(segment.total_length("content"), 3);

        let doc = segment.doc(0).unwrap();
        assert_eq!(doc.key.as_deref(), Some("1"));
        assert_eq!(doc.stored.get_text("name"), Some("Report.PDF"));
        assert!(doc.stored.get("content").is_none());
        assert_eq!(segment.value(0, "size"), Some(&FieldValue::Integer(20)));
        assert!(segment.value(0, "content").is_none());
        assert_eq!(segment.docs_with_key("1"), &[0]);
        assert!(segment.estimated_bytes() > 0);
    }

    #[test]
    fn test_terms_with_prefix() {
        let registry = FieldAnalyzerRegistry::for_files();
        let mut segment = Segment::new(0);
        segment
            .add_document(&file_doc("1", "a", "report reporting repo other"), &registry, "id")
            .unwrap();

        let terms: Vec<&str> = segment
            .terms_with_prefix("content", "repo")
            .map(|(term, _)| term)
            .collect();
        assert_eq!(terms, vec!["repo", "report", "reporting"]);
        assert_eq!(segment.terms_with_prefix("missing", "r").count(), 0);
    }

    #[test]
    fn test_merge_drops_deleted() {
        let registry = FieldAnalyzerRegistry::for_files();
        let mut first = Segment::new(0);
        first.add_document(&file_doc("1", "a", "alpha"), &registry, "id").unwrap();
        first.add_document(&file_doc("2", "b", "beta"), &registry, "id").unwrap();
        let mut second = Segment::new(1);
        second.add_document(&file_doc("3", "c", "alpha"), &registry, "id").unwrap();

        let mut first_deleted = BitVec::from_elem(2, false);
        first_deleted.set(0, true);
        let second_deleted = BitVec::from_elem(1, false);

        let merged = Segment::merge(2, &[(&first, &first_deleted), (&second, &second_deleted)]);
        assert_eq!(merged.id(), 2);
        assert_eq!(merged.doc_count(), 2);
        assert_eq!(merged.postings("content", "alpha"), &[Posting { doc: 1, freq: 1 }]);
        assert_eq!(merged.docs_with_key("2"), &[0]);
        assert!(merged.docs_with_key("1").is_empty());
        assert_eq!(merged.total_length("content"), 2);
    }

    #[test]
    fn test_persist_segment_and_deletions() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path());
        let registry = FieldAnalyzerRegistry::for_files();

        let mut segment = Segment::new(7);
        segment.add_document(&file_doc("1", "a.txt", "alpha"), &registry, "id").unwrap();
        segment.write_to(&storage).unwrap();
        assert!(storage.file_exists("seg_00000007.seg"));

        let loaded = Segment::read_from(&storage, 7).unwrap();
        assert_eq!(loaded.doc_count(), 1);
        assert_eq!(loaded.postings("content", "alpha").len(), 1);
        assert!(Segment::read_from(&storage, 8).is_err());

        let mut deleted = BitVec::from_elem(1, false);
        deleted.set(0, true);
        write_deletions(&storage, 7, 1, &deleted).unwrap();
        assert_eq!(read_deletions(&storage, 7, 1, 1).unwrap(), deleted);
        assert!(read_deletions(&storage, 7, 1, 2).is_err());
        assert_eq!(read_deletions(&storage, 7, 0, 3).unwrap().len(), 3);
    }
}
