//! Text analysis: tokenizers, token filters, analyzers and the per-field
//! analyzer registry.

pub mod analyzer;
pub mod registry;
pub mod token;
pub mod token_filter;
pub mod tokenizer;

pub use analyzer::Analyzer;
pub use registry::{FieldAnalysis, FieldAnalyzerRegistry};
pub use token::{Token, TokenStream};
