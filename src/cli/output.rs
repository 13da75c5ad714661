//! Output formatting for CLI commands.

use std::fmt::Write as _;

use serde::Serialize;

use crate::cli::args::{FolioArgs, OutputFormat};
use crate::error::Result;
use crate::mapping::FileHit;
use crate::service::IndexStats;

/// Human-readable rendering of a command result.
pub trait HumanOutput {
    fn to_human(&self) -> String;
}

/// Result structure for adding files.
#[derive(Debug, Serialize)]
pub struct AddResult {
    pub files_added: usize,
    pub lines_skipped: usize,
    pub committed: bool,
    pub duration_ms: u64,
}

/// Result structure for deleting a file.
#[derive(Debug, Serialize)]
pub struct DeleteResult {
    pub key: String,
    pub deleted: usize,
}

/// Result structure for search operations.
#[derive(Debug, Serialize)]
pub struct SearchOutput {
    pub items: Vec<FileHit>,
    pub total_count: usize,
    pub page_index: usize,
    pub page_size: usize,
    /// Hits dropped because their file no longer exists.
    pub removed_missing: usize,
    pub duration_ms: u64,
}

/// Result structure for compaction.
#[derive(Debug, Serialize)]
pub struct OptimizeResult {
    pub started: bool,
    pub waited: bool,
}

/// Result structure for clearing an index.
#[derive(Debug, Serialize)]
pub struct ClearResult {
    pub cleared: bool,
}

impl HumanOutput for AddResult {
    fn to_human(&self) -> String {
        let mut out = format!("Added {} files in {}ms", self.files_added, self.duration_ms);
        if self.lines_skipped > 0 {
            let _ = write!(out, " ({} lines skipped)", self.lines_skipped);
        }
        if !self.committed {
            out.push_str(" (not committed)");
        }
        out
    }
}

impl HumanOutput for DeleteResult {
    fn to_human(&self) -> String {
        match self.deleted {
            0 => format!("No document with key {}", self.key),
            n => format!("Deleted {n} document(s) with key {}", self.key),
        }
    }
}

impl HumanOutput for SearchOutput {
    fn to_human(&self) -> String {
        let mut out = String::from("Search Results:\n═══════════════\n");
        let first = self.page_index * self.page_size;
        for (i, hit) in self.items.iter().enumerate() {
            let path = if hit.folder.is_empty() {
                hit.name.clone()
            } else {
                format!("{}/{}", hit.folder, hit.name)
            };
            let _ = write!(out, "\n{:>4}. {path}  [{}]", first + i + 1, hit.id);
            if let Some(size) = hit.size {
                let _ = write!(out, "  {}", format_bytes(size.max(0) as u64));
            }
            if let Some(modified) = hit.modified {
                let _ = write!(out, "  {}", modified.format("%Y-%m-%d %H:%M"));
            }
        }
        if self.items.is_empty() {
            out.push_str("\nNo results");
        }
        let _ = write!(
            out,
            "\n\nPage {} ({} per page), total hits: {}\nSearch time: {}ms",
            self.page_index, self.page_size, self.total_count, self.duration_ms
        );
        if self.removed_missing > 0 {
            let _ = write!(
                out,
                "\nRemoved {} entries for missing files",
                self.removed_missing
            );
        }
        out
    }
}

impl HumanOutput for OptimizeResult {
    fn to_human(&self) -> String {
        match (self.started, self.waited) {
            (false, _) => "Nothing to compact".to_string(),
            (true, true) => "Compaction finished".to_string(),
            (true, false) => "Compaction started in the background".to_string(),
        }
    }
}

impl HumanOutput for ClearResult {
    fn to_human(&self) -> String {
        if self.cleared {
            "Index cleared".to_string()
        } else {
            "No index to clear".to_string()
        }
    }
}

impl HumanOutput for IndexStats {
    fn to_human(&self) -> String {
        format!(
            "Index Statistics:\n════════════════\n\
             Location: {}\n\
             Generation: {}\n\
             Segments: {}\n\
             Searchable documents: {}\n\
             Document slots: {}\n\
             Has deletions: {}",
            self.location.display(),
            self.generation,
            self.segments,
            self.num_docs,
            self.max_doc,
            self.has_deletions
        )
    }
}

/// Output a result in the specified format.
pub fn output_result<T: Serialize + HumanOutput>(result: &T, args: &FolioArgs) -> Result<()> {
    println!("{}", render(result, args.output_format, args.pretty)?);
    Ok(())
}

fn render<T: Serialize + HumanOutput>(
    result: &T,
    format: OutputFormat,
    pretty: bool,
) -> Result<String> {
    Ok(match format {
        OutputFormat::Human => result.to_human(),
        OutputFormat::Json if pretty => serde_json::to_string_pretty(result)?,
        OutputFormat::Json => serde_json::to_string(result)?,
    })
}

/// Format bytes into human-readable format.
fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    let unit = UNITS[unit_index];
    if unit_index == 0 {
        format!("{bytes} {unit}")
    } else {
        format!("{size:.1} {unit}")
    }
}
