//! Field analyzer registry.
//!
//! Maps each field name to one of four analysis strategies. The same registry
//! is consulted when a document is indexed and when a query or filter is built
//! against a field, so write-time and query-time terms always agree.
//!
//! # Example
//!
//! ```
//! use folio::analysis::registry::{FieldAnalysis, FieldAnalyzerRegistry};
//!
//! let registry = FieldAnalyzerRegistry::new()
//!     .with_field("id", FieldAnalysis::Keyword)
//!     .with_field("name", FieldAnalysis::Lowercase);
//!
//! assert_eq!(registry.terms("id", "A-17").unwrap(), vec!["A-17"]);
//! assert_eq!(registry.terms("name", "A-17.TXT").unwrap(), vec!["a-17.txt"]);
//! assert_eq!(registry.terms("content", "Two Files").unwrap(), vec!["two", "file"]);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::analysis::analyzer::Analyzer;
use crate::analysis::analyzer::keyword::KeywordAnalyzer;
use crate::analysis::analyzer::standard::StandardAnalyzer;
use crate::error::Result;

/// How a field's text is turned into terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldAnalysis {
    /// The whole value is a single term, matched exactly.
    Keyword,
    /// The whole value is a single lowercased term (case-insensitive exact match).
    Lowercase,
    /// The whole value is a single folder path with normalized separators.
    Path,
    /// Tokenized free text: word splitting, lowercasing, stop words, plural folding.
    Text,
}

impl FieldAnalysis {
    /// Whether the field produces a single term per value.
    pub fn is_single_term(&self) -> bool {
        !matches!(self, FieldAnalysis::Text)
    }
}

impl fmt::Display for FieldAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldAnalysis::Keyword => "keyword",
            FieldAnalysis::Lowercase => "lowercase",
            FieldAnalysis::Path => "path",
            FieldAnalysis::Text => "text",
        };
        f.write_str(name)
    }
}

/// Shared analyzer instances, one per strategy.
#[derive(Clone)]
struct AnalyzerSet {
    keyword: Arc<dyn Analyzer>,
    lowercase: Arc<dyn Analyzer>,
    path: Arc<dyn Analyzer>,
    text: Arc<dyn Analyzer>,
}

impl Default for AnalyzerSet {
    fn default() -> Self {
        AnalyzerSet {
            keyword: Arc::new(KeywordAnalyzer::new()),
            lowercase: Arc::new(KeywordAnalyzer::lowercase()),
            path: Arc::new(KeywordAnalyzer::path()),
            text: Arc::new(StandardAnalyzer::new()),
        }
    }
}

/// Serialized form of the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegistryRepr {
    #[serde(default = "default_analysis")]
    default: FieldAnalysis,
    #[serde(default)]
    fields: BTreeMap<String, FieldAnalysis>,
}

fn default_analysis() -> FieldAnalysis {
    FieldAnalysis::Text
}

/// A static mapping from field name to analysis strategy.
///
/// Fields that are not registered fall back to the default strategy
/// ([`FieldAnalysis::Text`] unless changed).
#[derive(Clone, Serialize, Deserialize)]
#[serde(from = "RegistryRepr", into = "RegistryRepr")]
pub struct FieldAnalyzerRegistry {
    default: FieldAnalysis,
    fields: BTreeMap<String, FieldAnalysis>,
    analyzers: AnalyzerSet,
}

impl FieldAnalyzerRegistry {
    /// Create an empty registry where every field is tokenized text.
    pub fn new() -> Self {
        FieldAnalyzerRegistry {
            default: FieldAnalysis::Text,
            fields: BTreeMap::new(),
            analyzers: AnalyzerSet::default(),
        }
    }

    /// The conventions used for file documents.
    ///
    /// `id` is exact, `folder` is a normalized path, `name` and `extension`
    /// are case-insensitive exact, while `name_text` and `content` are
    /// tokenized.
    pub fn for_files() -> Self {
        Self::new()
            .with_field("id", FieldAnalysis::Keyword)
            .with_field("folder", FieldAnalysis::Path)
            .with_field("extension", FieldAnalysis::Lowercase)
            .with_field("name", FieldAnalysis::Lowercase)
            .with_field("name_text", FieldAnalysis::Text)
            .with_field("content", FieldAnalysis::Text)
    }

    /// Register a field (builder style).
    pub fn with_field<S: Into<String>>(mut self, field: S, analysis: FieldAnalysis) -> Self {
        self.set_field(field, analysis);
        self
    }

    /// Change the strategy used for unregistered fields (builder style).
    pub fn with_default(mut self, analysis: FieldAnalysis) -> Self {
        self.default = analysis;
        self
    }

    /// Register a field.
    pub fn set_field<S: Into<String>>(&mut self, field: S, analysis: FieldAnalysis) {
        self.fields.insert(field.into(), analysis);
    }

    /// Get the strategy for a field.
    pub fn analysis_for(&self, field: &str) -> FieldAnalysis {
        self.fields.get(field).copied().unwrap_or(self.default)
    }

    /// Get the analyzer that implements a field's strategy.
    pub fn analyzer_for(&self, field: &str) -> &Arc<dyn Analyzer> {
        self.analyzer_of(self.analysis_for(field))
    }

    /// Get the analyzer for a strategy.
    pub fn analyzer_of(&self, analysis: FieldAnalysis) -> &Arc<dyn Analyzer> {
        match analysis {
            FieldAnalysis::Keyword => &self.analyzers.keyword,
            FieldAnalysis::Lowercase => &self.analyzers.lowercase,
            FieldAnalysis::Path => &self.analyzers.path,
            FieldAnalysis::Text => &self.analyzers.text,
        }
    }

    /// Registered fields and their strategies.
    pub fn fields(&self) -> impl Iterator<Item = (&str, FieldAnalysis)> {
        self.fields.iter().map(|(name, analysis)| (name.as_str(), *analysis))
    }

    /// Analyze text for a field and return the resulting terms in order.
    pub fn terms(&self, field: &str, text: &str) -> Result<Vec<String>> {
        Ok(self
            .analyzer_for(field)
            .analyze(text)?
            .filter(|token| !token.is_stopped() && !token.is_empty())
            .map(|token| token.text)
            .collect())
    }

    /// Normalize a prefix so it can be compared against a field's terms.
    ///
    /// Prefixes are not run through the full analyzer: tokenizing or stemming
    /// a partial word would change what it matches.
    pub fn normalize_prefix(&self, field: &str, prefix: &str) -> String {
        match self.analysis_for(field) {
            FieldAnalysis::Keyword => prefix.to_string(),
            // Only the leading end is trimmed; a trailing `/` still narrows
            FieldAnalysis::Path => prefix
                .replace('\\', "/")
                .trim_start_matches('~')
                .trim_start_matches('/')
                .to_string(),
            FieldAnalysis::Lowercase | FieldAnalysis::Text => prefix.to_lowercase(),
        }
    }
}

impl Default for FieldAnalyzerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FieldAnalyzerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldAnalyzerRegistry")
            .field("default", &self.default)
            .field("fields", &self.fields)
            .finish()
    }
}

impl PartialEq for FieldAnalyzerRegistry {
    fn eq(&self, other: &Self) -> bool {
        self.default == other.default && self.fields == other.fields
    }
}

impl From<RegistryRepr> for FieldAnalyzerRegistry {
    fn from(repr: RegistryRepr) -> Self {
        FieldAnalyzerRegistry {
            default: repr.default,
            fields: repr.fields,
            analyzers: AnalyzerSet::default(),
        }
    }
}

impl From<FieldAnalyzerRegistry> for RegistryRepr {
    fn from(registry: FieldAnalyzerRegistry) -> Self {
        RegistryRepr {
            default: registry.default,
            fields: registry.fields,
        }
    }
}
