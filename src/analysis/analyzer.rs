//! Analyzers combine a tokenizer with a chain of filters.
//!
//! ```text
//! Raw Text → Analyzer → Token Stream → Index
//!             ↓
//!         Tokenizer
//!             ↓
//!         Filter 1 .. Filter N
//! ```
//!
//! # Available Implementations
//!
//! - [`keyword::KeywordAnalyzer`] - Whole input as one token, optionally case-folded
//! - [`standard::StandardAnalyzer`] - Word splitting, lowercasing, stop words, plural folding
//! - [`pipeline::PipelineAnalyzer`] - Custom tokenizer + filter chains

use crate::analysis::token::TokenStream;
use crate::error::Result;

/// Trait for analyzers that convert text into processed tokens.
///
/// # Examples
///
/// ```
/// use folio::analysis::analyzer::Analyzer;
/// use folio::analysis::analyzer::standard::StandardAnalyzer;
///
/// let analyzer = StandardAnalyzer::new();
/// let tokens: Vec<_> = analyzer.analyze("The quarterly Reports").unwrap().collect();
///
/// assert_eq!(tokens.len(), 2);
/// assert_eq!(tokens[0].text, "quarterly");
/// assert_eq!(tokens[1].text, "report");
/// ```
pub trait Analyzer: Send + Sync {
    /// Analyze the given text and return a stream of tokens.
    fn analyze(&self, text: &str) -> Result<TokenStream>;

    /// Get the name of this analyzer (for debugging and configuration).
    fn name(&self) -> &'static str;

    /// Provide access to the concrete type for downcasting.
    fn as_any(&self) -> &dyn std::any::Any;
}

pub mod keyword;
pub mod pipeline;
pub mod standard;
