//! # Folio
//!
//! A near-real-time search index for file descriptions.
//!
//! ## Features
//!
//! - Single writer per index directory with stale-lock recovery
//! - Cached snapshots refreshed on a staleness TTL, shared by concurrent searches
//! - Per-field analysis: exact, case-insensitive exact, or tokenized text
//! - Structured filters, free-text queries, field sorts and pagination
//! - BM25 scoring

pub mod analysis;
pub mod cli;
pub mod config;
pub mod document;
pub mod error;
pub mod index;
pub mod mapping;
pub mod query;
pub mod search;
pub mod service;
pub mod storage;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
