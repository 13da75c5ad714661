//! The persisted index: segments, commit points, snapshots and the writer.
//!
//! - [`segment::Segment`] - Immutable inverted index over a range of documents
//! - [`manifest::Manifest`] - The `segments.json` commit point
//! - [`reader::IndexSnapshot`] - Point-in-time view over segments
//! - [`writer::IndexWriter`] - The single mutable writer of a directory

pub mod manifest;
pub mod reader;
pub mod segment;
pub mod writer;

pub use manifest::{MANIFEST_NAME, Manifest, SegmentMeta};
pub use reader::{IndexSnapshot, SegmentView};
pub use segment::{Posting, Segment};
pub use writer::{IndexWriter, WriterStats};
