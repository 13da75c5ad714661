//! Stemming token filter and stemmer implementations.

use crate::analysis::token::TokenStream;
use crate::analysis::token_filter::Filter;
use crate::error::Result;

/// Trait for stemming algorithms.
pub trait Stemmer: Send + Sync {
    /// Stem a word to its root form.
    fn stem(&self, word: &str) -> String;

    /// Get the name of this stemmer.
    fn name(&self) -> &'static str;
}

/// Conservative English stemmer that only folds plural forms.
///
/// `files` → `file`, `policies` → `policy`, while `class`, `status` and
/// `shoes` are left alone. Folding only plurals keeps file names such as
/// `running-notes` recognizable in queries.
#[derive(Debug, Clone, Copy, Default)]
pub struct PluralStemmer;

impl PluralStemmer {
    /// Create a new plural stemmer.
    pub fn new() -> Self {
        PluralStemmer
    }
}

impl Stemmer for PluralStemmer {
    fn stem(&self, word: &str) -> String {
        let chars: Vec<char> = word.chars().collect();
        let len = chars.len();

        if len < 3 || chars[len - 1] != 's' {
            return word.to_string();
        }

        match chars[len - 2] {
            'u' | 's' => word.to_string(),
            'e' => {
                if len > 3 && chars[len - 3] == 'i' && chars[len - 4] != 'a' && chars[len - 4] != 'e'
                {
                    let mut stem: String = chars[..len - 3].iter().collect();
                    stem.push('y');
                    stem
                } else if matches!(chars[len - 3], 'i' | 'a' | 'o' | 'e') {
                    word.to_string()
                } else {
                    chars[..len - 1].iter().collect()
                }
            }
            _ => chars[..len - 1].iter().collect(),
        }
    }

    fn name(&self) -> &'static str {
        "plural"
    }
}

/// Filter that applies stemming to tokens.
pub struct StemFilter {
    stemmer: Box<dyn Stemmer>,
}

impl std::fmt::Debug for StemFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StemFilter")
            .field("stemmer", &self.stemmer.name())
            .finish()
    }
}

impl StemFilter {
    /// Create a new stem filter with the plural stemmer.
    pub fn new() -> Self {
        StemFilter {
            stemmer: Box::new(PluralStemmer::new()),
        }
    }

    /// Create a stem filter with a custom stemmer.
    pub fn with_stemmer(stemmer: Box<dyn Stemmer>) -> Self {
        StemFilter { stemmer }
    }
}

impl Default for StemFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for StemFilter {
    fn filter(&self, tokens: TokenStream) -> Result<TokenStream> {
        let stemmed = tokens
            .map(|token| {
                if token.is_stopped() {
                    token
                } else {
                    let stem = self.stemmer.stem(&token.text);
                    token.with_text(stem)
                }
            })
            .collect::<Vec<_>>();

        Ok(Box::new(stemmed.into_iter()))
    }

    fn name(&self) -> &'static str {
        "stem"
    }
}
