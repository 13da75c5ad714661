//! Single-token tokenizer for identifiers and folder paths.

use super::Tokenizer;

use crate::analysis::token::{Token, TokenStream};
use crate::error::Result;

/// How [`WholeTokenizer`] shapes its one token.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WholeMode {
    /// The input as given.
    #[default]
    Verbatim,
    /// A folder path: `\` becomes `/`, then surrounding `~` and `/` are trimmed.
    Path,
}

/// Emits the entire input as one token, or nothing when it is empty.
#[derive(Clone, Debug, Default)]
pub struct WholeTokenizer {
    mode: WholeMode,
}

impl WholeTokenizer {
    pub fn new() -> Self {
        WholeTokenizer {
            mode: WholeMode::Verbatim,
        }
    }

    /// Folder paths, so `/docs/`, `docs` and `~\docs` all become `docs`.
    pub fn path() -> Self {
        WholeTokenizer {
            mode: WholeMode::Path,
        }
    }

    pub fn mode(&self) -> WholeMode {
        self.mode
    }
}

impl Tokenizer for WholeTokenizer {
    fn tokenize(&self, text: &str) -> Result<TokenStream> {
        let token = match self.mode {
            WholeMode::Verbatim => {
                (!text.is_empty()).then(|| Token::with_offsets(text, 0, 0, text.len()))
            }
            WholeMode::Path => {
                // Separators are single bytes, so offsets into `unified` hold for `text`
                let unified = text.replace('\\', "/");
                let (start, end) = path_span(&unified);
                (start < end).then(|| Token::with_offsets(&unified[start..end], 0, start, end))
            }
        };
        Ok(Box::new(token.into_iter()))
    }

    fn name(&self) -> &'static str {
        match self.mode {
            WholeMode::Verbatim => "whole",
            WholeMode::Path => "whole_path",
        }
    }
}

/// Normalize a folder path the way [`WholeTokenizer::path`] does.
pub fn normalize_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let (start, end) = path_span(&unified);
    unified[start..end].to_string()
}

/// Byte range left after trimming `~`, then `/`, from both ends.
fn path_span(path: &str) -> (usize, usize) {
    let (start, end) = trim_span(path, 0, path.len(), '~');
    trim_span(path, start, end, '/')
}

fn trim_span(text: &str, start: usize, end: usize, c: char) -> (usize, usize) {
    let slice = &text[start..end];
    let lead = slice.len() - slice.trim_start_matches(c).len();
    let rest = &slice[lead..];
    let tail = rest.len() - rest.trim_end_matches(c).len();
    (start + lead, end - tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(tokenizer: &WholeTokenizer, text: &str) -> Vec<Token> {
        tokenizer.tokenize(text).unwrap().collect()
    }

    #[test]
    fn test_verbatim_keeps_input() {
        let tokenizer = WholeTokenizer::new();
        let result = tokens(&tokenizer, "/docs/Annual Report");
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].text, "/docs/Annual Report");
        assert_eq!(result[0].end_offset, 19);

        assert!(tokens(&tokenizer, "").is_empty());
    }

    #[test]
    fn test_path_mode() {
        let tokenizer = WholeTokenizer::path();
        let result = tokens(&tokenizer, "~/Docs\\Q1/");
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].text, "Docs/Q1");
        assert_eq!((result[0].start_offset, result[0].end_offset), (2, 9));

        assert_eq!(tokens(&tokenizer, "/docs")[0].text, "docs");
        // The root folder has no term
        assert!(tokens(&tokenizer, "/").is_empty());
        assert!(tokens(&tokenizer, "~").is_empty());
    }

    #[test]
    fn test_normalize_path_trims_in_order() {
        assert_eq!(normalize_path("docs"), "docs");
        assert_eq!(normalize_path("\\\\server\\share\\"), "server/share");
        // `~` is trimmed before `/`, so an inner `~` survives
        assert_eq!(normalize_path("/~docs"), "~docs");
    }
}
