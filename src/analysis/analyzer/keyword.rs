//! Keyword analyzer that treats the entire input as a single token.
//!
//! Used for identifier fields that must match exactly, in its case-folded
//! form for names that should match regardless of case, and in its path form
//! for folders.
//!
//! # Examples
//!
//! ```
//! use folio::analysis::analyzer::Analyzer;
//! use folio::analysis::analyzer::keyword::KeywordAnalyzer;
//!
//! let exact = KeywordAnalyzer::new();
//! let tokens: Vec<_> = exact.analyze("Invoice-2024.PDF").unwrap().collect();
//! assert_eq!(tokens[0].text, "Invoice-2024.PDF");
//!
//! let folded = KeywordAnalyzer::lowercase();
//! let tokens: Vec<_> = folded.analyze("Invoice-2024.PDF").unwrap().collect();
//! assert_eq!(tokens[0].text, "invoice-2024.pdf");
//!
//! let folder = KeywordAnalyzer::path();
//! let tokens: Vec<_> = folder.analyze("~/Invoices\\2024/").unwrap().collect();
//! assert_eq!(tokens[0].text, "Invoices/2024");
//! ```

use std::sync::Arc;

use crate::analysis::analyzer::Analyzer;
use crate::analysis::analyzer::pipeline::PipelineAnalyzer;
use crate::analysis::token::TokenStream;
use crate::analysis::token_filter::lowercase::LowercaseFilter;
use crate::analysis::tokenizer::whole::WholeTokenizer;
use crate::error::Result;

/// A keyword analyzer that treats the entire input as a single token.
pub struct KeywordAnalyzer {
    inner: PipelineAnalyzer,
    case_folded: bool,
    name: &'static str,
}

impl KeywordAnalyzer {
    /// Create a keyword analyzer that keeps the input verbatim.
    pub fn new() -> Self {
        KeywordAnalyzer {
            inner: PipelineAnalyzer::new(Arc::new(WholeTokenizer::new())).with_name("keyword"),
            case_folded: false,
            name: "keyword",
        }
    }

    /// Create a keyword analyzer for folder paths.
    ///
    /// Case is kept; separators and surrounding `~` and `/` are normalized.
    pub fn path() -> Self {
        KeywordAnalyzer {
            inner: PipelineAnalyzer::new(Arc::new(WholeTokenizer::path())).with_name("keyword_path"),
            case_folded: false,
            name: "keyword_path",
        }
    }

    /// Create a keyword analyzer that lowercases the single token.
    pub fn lowercase() -> Self {
        KeywordAnalyzer {
            inner: PipelineAnalyzer::new(Arc::new(WholeTokenizer::new()))
                .add_filter(Arc::new(LowercaseFilter::new()))
                .with_name("keyword_lowercase"),
            case_folded: true,
            name: "keyword_lowercase",
        }
    }

    /// Whether the token is lowercased.
    pub fn is_case_folded(&self) -> bool {
        self.case_folded
    }
}

impl Default for KeywordAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer for KeywordAnalyzer {
    fn analyze(&self, text: &str) -> Result<TokenStream> {
        self.inner.analyze(text)
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

impl std::fmt::Debug for KeywordAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeywordAnalyzer")
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::token::Token;

    #[test]
    fn test_keyword_analyzer() {
        let analyzer = KeywordAnalyzer::new();
        let tokens: Vec<Token> = analyzer.analyze("/Docs/Finance").unwrap().collect();

        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].text, "/Docs/Finance");
        assert_eq!(analyzer.name(), "keyword");
    }

    #[test]
    fn test_lowercase_keyword_analyzer() {
        let analyzer = KeywordAnalyzer::lowercase();
        let tokens: Vec<Token> = analyzer.analyze("ReadMe.TXT").unwrap().collect();

        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].text, "readme.txt");
        assert!(analyzer.is_case_folded());
    }

    #[test]
    fn test_path_keyword_analyzer() {
        let analyzer = KeywordAnalyzer::path();
        let tokens: Vec<Token> = analyzer.analyze("/Docs/Finance/").unwrap().collect();

        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].text, "Docs/Finance");
        assert_eq!(analyzer.name(), "keyword_path");
        assert!(!analyzer.is_case_folded());
    }
}
