//! Unicode word tokenizer implementation.
//!
//! Splits text using Unicode word boundary rules (UAX #29) and then breaks
//! each word on any remaining non-alphanumeric characters, so file names such
//! as `report.pdf` or `draft_v2` yield their component words.
//!
//! # Examples
//!
//! ```
//! use folio::analysis::tokenizer::Tokenizer;
//! use folio::analysis::tokenizer::unicode_word::UnicodeWordTokenizer;
//!
//! let tokenizer = UnicodeWordTokenizer::new();
//! let tokens: Vec<_> = tokenizer.tokenize("Budget report.pdf, 你好").unwrap().collect();
//!
//! assert_eq!(tokens[0].text, "Budget");
//! assert_eq!(tokens[1].text, "report");
//! assert_eq!(tokens[2].text, "pdf");
//! ```

use unicode_segmentation::UnicodeSegmentation;

use crate::analysis::token::{Token, TokenStream};
use crate::analysis::tokenizer::Tokenizer;
use crate::error::Result;

/// A tokenizer that splits text on Unicode word boundaries.
#[derive(Clone, Debug, Default)]
pub struct UnicodeWordTokenizer;

impl UnicodeWordTokenizer {
    /// Create a new Unicode word tokenizer.
    pub fn new() -> Self {
        UnicodeWordTokenizer
    }

    /// Split a single boundary segment into alphanumeric runs.
    fn push_runs(word: &str, base: usize, tokens: &mut Vec<Token>) {
        let mut start: Option<usize> = None;

        for (idx, c) in word.char_indices() {
            match (c.is_alphanumeric(), start) {
                (true, None) => start = Some(idx),
                (false, Some(s)) => {
                    let position = tokens.len();
                    tokens.push(Token::with_offsets(
                        &word[s..idx],
                        position,
                        base + s,
                        base + idx,
                    ));
                    start = None;
                }
                _ => {}
            }
        }

        if let Some(s) = start {
            let position = tokens.len();
            tokens.push(Token::with_offsets(
                &word[s..],
                position,
                base + s,
                base + word.len(),
            ));
        }
    }
}

impl Tokenizer for UnicodeWordTokenizer {
    fn tokenize(&self, text: &str) -> Result<TokenStream> {
        let mut tokens = Vec::new();

        for (offset, word) in text.split_word_bound_indices() {
            // Whitespace and pure punctuation segments carry no terms
            if word.chars().any(|c| c.is_alphanumeric()) {
                Self::push_runs(word, offset, &mut tokens);
            }
        }

        Ok(Box::new(tokens.into_iter()))
    }

    fn name(&self) -> &'static str {
        "unicode_word"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unicode_word_tokenizer() {
        let tokenizer = UnicodeWordTokenizer::new();
        let tokens: Vec<Token> = tokenizer.tokenize("hello, world!").unwrap().collect();

        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].text, "hello");
        assert_eq!(tokens[1].text, "world");
        assert_eq!(tokens[1].start_offset, 7);
        assert_eq!(tokens[1].end_offset, 12);
    }

    #[test]
    fn test_file_name_is_split() {
        let tokenizer = UnicodeWordTokenizer::new();
        let tokens: Vec<Token> = tokenizer.tokenize("draft_v2.final.docx").unwrap().collect();
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();

        assert_eq!(texts, vec!["draft", "v2", "final", "docx"]);
        assert_eq!(tokens[3].position, 3);
    }

    #[test]
    fn test_tokenizer_name() {
        assert_eq!(UnicodeWordTokenizer::new().name(), "unicode_word");
    }
}
