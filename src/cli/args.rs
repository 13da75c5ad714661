//! Command line argument parsing for the folio CLI using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

/// Folio - a near-real-time file search index
#[derive(Parser, Debug, Clone)]
#[command(name = "folio")]
#[command(about = "Index file descriptions and search them by folder, text and filters")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct FolioArgs {
    /// Increase log detail (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors (overrides verbose)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human", global = true)]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// JSON index configuration; the index path argument overrides its directory
    #[arg(short, long, value_name = "CONFIG_FILE", env = "FOLIO_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl FolioArgs {
    /// Log filter directive for the chosen verbosity.
    pub fn log_directive(&self) -> &'static str {
        if self.quiet {
            return "folio=error";
        }
        match self.verbose {
            0 => "folio=info",
            1 => "folio=debug",
            _ => "folio=trace",
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Add or replace files from JSON lines (one file description per line)
    Add(AddArgs),

    /// Delete a file by its key
    Delete(DeleteArgs),

    /// Search an index
    Search(SearchArgs),

    /// Compact an index that has deletions
    Optimize(OptimizeArgs),

    /// Show index statistics
    Stats(StatsArgs),

    /// Remove every document from an index
    Clear(ClearArgs),
}

impl Command {
    pub fn index_path(&self) -> &PathBuf {
        match self {
            Command::Add(args) => &args.index_path,
            Command::Delete(args) => &args.index_path,
            Command::Search(args) => &args.index_path,
            Command::Optimize(args) => &args.index_path,
            Command::Stats(args) => &args.index_path,
            Command::Clear(args) => &args.index_path,
        }
    }
}

/// Arguments for adding files
#[derive(Parser, Debug, Clone)]
pub struct AddArgs {
    /// Path to the index directory
    #[arg(value_name = "INDEX_PATH")]
    pub index_path: PathBuf,

    /// JSON lines file; standard input when omitted
    #[arg(value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Commit after this many files
    #[arg(short, long, default_value = "1000")]
    pub batch_size: usize,

    /// Don't commit after adding
    #[arg(long)]
    pub no_commit: bool,
}

/// Arguments for deleting a file
#[derive(Parser, Debug, Clone)]
pub struct DeleteArgs {
    /// Path to the index directory
    #[arg(value_name = "INDEX_PATH")]
    pub index_path: PathBuf,

    /// Key of the file to delete
    #[arg(short, long)]
    pub key: String,
}

/// Arguments for searching
#[derive(Parser, Debug, Clone)]
pub struct SearchArgs {
    /// Path to the index directory
    #[arg(value_name = "INDEX_PATH")]
    pub index_path: PathBuf,

    /// Only files directly in this folder
    #[arg(long)]
    pub folder: Option<String>,

    /// Free-text query
    #[arg(short = 'Q', long)]
    pub query: Option<String>,

    /// Sort order, e.g. `name`, `modified:desc` or `relevance` (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    pub sort: Vec<String>,

    /// Results per page
    #[arg(long, default_value = "10")]
    pub page_size: usize,

    /// Zero-based page number
    #[arg(long, default_value = "0")]
    pub page_index: usize,

    /// Drop and unindex hits whose file is missing under this directory
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,
}

/// Arguments for compaction
#[derive(Parser, Debug, Clone)]
pub struct OptimizeArgs {
    /// Path to the index directory
    #[arg(value_name = "INDEX_PATH")]
    pub index_path: PathBuf,

    /// Wait for the merge and its commit to finish
    #[arg(short, long)]
    pub wait: bool,
}

/// Arguments for statistics
#[derive(Parser, Debug, Clone)]
pub struct StatsArgs {
    /// Path to the index directory
    #[arg(value_name = "INDEX_PATH")]
    pub index_path: PathBuf,
}

/// Arguments for clearing an index
#[derive(Parser, Debug, Clone)]
pub struct ClearArgs {
    /// Path to the index directory
    #[arg(value_name = "INDEX_PATH")]
    pub index_path: PathBuf,
}

/// Output formats
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}
