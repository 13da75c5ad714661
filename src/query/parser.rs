//! Free-text query parser.
//!
//! Supported syntax:
//! - Bare terms, optional and scored: `quarterly report`
//! - Field-specific terms: `name:report.pdf`
//! - Required and excluded clauses: `+report -draft`, `NOT draft`, `!draft`
//! - `AND` / `OR` between clauses: `report AND annual`
//! - Prefixes: `rep*`
//! - Quoted phrases, all terms required: `"annual report"`
//! - Groups: `(report OR summary) -draft`
//! - Backslash escapes for any special character: `c\+\+`
//!
//! Terms are analyzed with the field's registered analysis, so a bare term
//! searched across several default fields is matched with each field's own
//! rules. Clauses whose text analyzes to nothing (stop words) are dropped.
//!
//! # Example
//!
//! ```
//! use folio::analysis::registry::FieldAnalyzerRegistry;
//! use folio::query::parser::QueryParser;
//!
//! let registry = FieldAnalyzerRegistry::for_files();
//! let parser = QueryParser::new(&registry, ["content"]);
//!
//! let query = parser.parse("+Reports -draft").unwrap();
//! assert_eq!(query.to_string(), "(+content:report -content:draft)");
//!
//! assert!(parser.parse("(unbalanced").is_err());
//! let escaped = QueryParser::escape("(unbalanced");
//! assert!(parser.parse(&escaped).is_ok());
//! ```

use std::iter::Peekable;
use std::str::Chars;

use crate::analysis::registry::FieldAnalyzerRegistry;
use crate::error::{FolioError, Result};
use crate::query::query::Query;

/// Characters with a meaning in the query syntax.
const SPECIAL_CHARS: &[char] = &[
    '\\', '+', '-', '!', '(', ')', ':', '^', '[', ']', '"', '{', '}', '~', '*', '?', '|', '&',
    '/',
];

/// Characters reserved for syntax this parser does not support.
const UNSUPPORTED_CHARS: &[char] = &['^', '[', ']', '{', '}', '~', '?'];

const KEYWORDS: &[&str] = &["AND", "OR", "NOT"];

/// Parses free text into a [`Query`] against a set of default fields.
#[derive(Debug, Clone)]
pub struct QueryParser<'a> {
    registry: &'a FieldAnalyzerRegistry,
    default_fields: Vec<String>,
}

impl<'a> QueryParser<'a> {
    /// Create a parser that searches unqualified terms in `default_fields`.
    pub fn new<I, S>(registry: &'a FieldAnalyzerRegistry, default_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        QueryParser {
            registry,
            default_fields: default_fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn default_fields(&self) -> &[String] {
        &self.default_fields
    }

    /// Parse query text.
    ///
    /// Fails with `MalformedQuery` on empty text or broken syntax.
    pub fn parse(&self, text: &str) -> Result<Query> {
        if text.trim().is_empty() {
            return Err(FolioError::malformed_query("query text is empty"));
        }

        let tokens = Lexer::new(text).tokenize()?;
        let clauses = ClauseParser::new(tokens).parse()?;
        Ok(self.compile_clauses(&clauses)?.unwrap_or_else(Query::boolean))
    }

    /// Parse text, falling back to the escaped literal when the syntax is
    /// broken. A second failure is returned to the caller.
    pub fn parse_lenient(&self, text: &str) -> Result<Query> {
        match self.parse(text) {
            Err(FolioError::MalformedQuery(reason)) => {
                log::debug!("Reparsing query as literal text ({reason}): {text}");
                self.parse(&Self::escape(text))
            }
            other => other,
        }
    }

    /// Escape text so every character is taken literally.
    pub fn escape(text: &str) -> String {
        text.split_whitespace()
            .map(|word| {
                let mut escaped = String::with_capacity(word.len() * 2);
                if KEYWORDS.contains(&word) {
                    escaped.push('\\');
                }
                for c in word.chars() {
                    if SPECIAL_CHARS.contains(&c) {
                        escaped.push('\\');
                    }
                    escaped.push(c);
                }
                escaped
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn compile_clauses(&self, clauses: &[Clause]) -> Result<Option<Query>> {
        let mut must = Vec::new();
        let mut should = Vec::new();
        let mut must_not = Vec::new();

        for clause in clauses {
            let Some(query) = self.compile_node(&clause.node)? else {
                continue;
            };
            match clause.occur {
                Occur::Must => must.push(query),
                Occur::Should => should.push(query),
                Occur::MustNot => must_not.push(query),
            }
        }

        if must.is_empty() && should.is_empty() && must_not.is_empty() {
            return Ok(None);
        }
        // A lone optional clause needs no wrapper
        if must.is_empty() && must_not.is_empty() && should.len() == 1 {
            return Ok(should.pop());
        }
        Ok(Some(Query::Boolean {
            must,
            should,
            must_not,
        }))
    }

    fn compile_node(&self, node: &Node) -> Result<Option<Query>> {
        match node {
            Node::Group(clauses) => self.compile_clauses(clauses),
            Node::Term {
                field,
                text,
                prefix,
            } => self.across_fields(field.as_deref(), |field| {
                if *prefix {
                    let prefix = self.registry.normalize_prefix(field, text);
                    return Ok((!prefix.is_empty()).then(|| Query::prefix(field, prefix)));
                }
                self.analyzed(field, text)
            }),
            Node::Phrase { field, text } => {
                self.across_fields(field.as_deref(), |field| self.analyzed(field, text))
            }
        }
    }

    /// Build one query per target field and OR them together.
    fn across_fields<F>(&self, field: Option<&str>, build: F) -> Result<Option<Query>>
    where
        F: Fn(&str) -> Result<Option<Query>>,
    {
        let fields: Vec<&str> = match field {
            Some(field) => vec![field],
            None => self.default_fields.iter().map(String::as_str).collect(),
        };
        if fields.is_empty() {
            return Err(FolioError::malformed_query(
                "term has no field and no default fields are configured",
            ));
        }

        let mut queries = Vec::with_capacity(fields.len());
        for field in fields {
            if let Some(query) = build(field)? {
                queries.push(query);
            }
        }

        Ok(match queries.len() {
            0 => None,
            1 => queries.pop(),
            _ => Some(Query::Boolean {
                must: Vec::new(),
                should: queries,
                must_not: Vec::new(),
            }),
        })
    }

    fn analyzed(&self, field: &str, text: &str) -> Result<Option<Query>> {
        let mut terms = self.registry.terms(field, text)?;
        Ok(match terms.len() {
            0 => None,
            1 => terms.pop().map(|term| Query::term(field, term)),
            _ => Some(Query::Phrase {
                field: field.to_string(),
                terms,
            }),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    Plus,
    Minus,
    Not,
    And,
    Or,
    Term {
        field: Option<String>,
        text: String,
        prefix: bool,
    },
    Phrase {
        field: Option<String>,
        text: String,
    },
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Lexer {
            chars: text.chars().peekable(),
        }
    }

    fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        while let Some(&c) = self.chars.peek() {
            match c {
                c if c.is_whitespace() => {
                    self.chars.next();
                }
                '(' => {
                    self.chars.next();
                    tokens.push(Token::LParen);
                }
                ')' => {
                    self.chars.next();
                    tokens.push(Token::RParen);
                }
                '+' => {
                    self.chars.next();
                    tokens.push(Token::Plus);
                }
                '-' => {
                    self.chars.next();
                    tokens.push(Token::Minus);
                }
                '!' => {
                    self.chars.next();
                    tokens.push(Token::Not);
                }
                '"' => {
                    self.chars.next();
                    let text = self.read_phrase()?;
                    tokens.push(Token::Phrase { field: None, text });
                }
                _ => tokens.push(self.read_word()?),
            }
        }
        Ok(tokens)
    }

    /// Read up to the closing quote; the opening one is consumed.
    fn read_phrase(&mut self) -> Result<String> {
        let mut text = String::new();
        while let Some(c) = self.chars.next() {
            match c {
                '\\' => match self.chars.next() {
                    Some(escaped) => text.push(escaped),
                    None => return Err(FolioError::malformed_query("dangling escape")),
                },
                '"' => return Ok(text),
                c => text.push(c),
            }
        }
        Err(FolioError::malformed_query("unterminated phrase"))
    }

    fn read_word(&mut self) -> Result<Token> {
        let mut field: Option<String> = None;
        let mut text = String::new();
        let mut escaped_any = false;
        let mut prefix = false;

        while let Some(&c) = self.chars.peek() {
            if c.is_whitespace() || c == '(' || c == ')' {
                break;
            }
            self.chars.next();

            match c {
                '\\' => match self.chars.next() {
                    Some(escaped) => {
                        text.push(escaped);
                        escaped_any = true;
                    }
                    None => return Err(FolioError::malformed_query("dangling escape")),
                },
                ':' if field.is_none() && !text.is_empty() => {
                    field = Some(std::mem::take(&mut text));
                    escaped_any = false;
                    match self.chars.peek() {
                        Some('"') => {
                            self.chars.next();
                            let text = self.read_phrase()?;
                            return Ok(Token::Phrase { field, text });
                        }
                        Some(c) if !c.is_whitespace() && *c != ')' && *c != '(' => {}
                        _ => {
                            return Err(FolioError::malformed_query(format!(
                                "missing value after '{}:'",
                                field.unwrap_or_default()
                            )));
                        }
                    }
                }
                '*' if self.at_word_end() => prefix = true,
                c if UNSUPPORTED_CHARS.contains(&c) => {
                    return Err(FolioError::malformed_query(format!(
                        "unsupported syntax '{c}'"
                    )));
                }
                '"' => return Err(FolioError::malformed_query("quote inside a term")),
                c => text.push(c),
            }
        }

        if field.is_none() && !escaped_any && !prefix {
            match text.as_str() {
                "AND" => return Ok(Token::And),
                "OR" => return Ok(Token::Or),
                "NOT" => return Ok(Token::Not),
                _ => {}
            }
        }
        if text.is_empty() {
            return Err(FolioError::malformed_query("empty term"));
        }

        Ok(Token::Term {
            field,
            text,
            prefix,
        })
    }

    fn at_word_end(&mut self) -> bool {
        match self.chars.peek() {
            None => true,
            Some(c) => c.is_whitespace() || *c == ')' || *c == '(',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Occur {
    Must,
    Should,
    MustNot,
}

#[derive(Debug, Clone)]
struct Clause {
    occur: Occur,
    node: Node,
}

#[derive(Debug, Clone)]
enum Node {
    Term {
        field: Option<String>,
        text: String,
        prefix: bool,
    },
    Phrase {
        field: Option<String>,
        text: String,
    },
    Group(Vec<Clause>),
}

struct ClauseParser {
    tokens: Vec<Token>,
    position: usize,
}

impl ClauseParser {
    fn new(tokens: Vec<Token>) -> Self {
        ClauseParser {
            tokens,
            position: 0,
        }
    }

    fn parse(mut self) -> Result<Vec<Clause>> {
        let clauses = self.parse_clauses(false)?;
        if clauses.is_empty() {
            return Err(FolioError::malformed_query("query has no clauses"));
        }
        Ok(clauses)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        self.position += 1;
        token
    }

    fn parse_clauses(&mut self, nested: bool) -> Result<Vec<Clause>> {
        let mut clauses: Vec<Clause> = Vec::new();
        let mut pending: Option<Token> = None;

        loop {
            match self.peek() {
                None if nested => return Err(FolioError::malformed_query("missing ')'")),
                None => break,
                Some(Token::RParen) if !nested => {
                    return Err(FolioError::malformed_query("unbalanced ')'"));
                }
                Some(Token::RParen) => {
                    self.advance();
                    break;
                }
                Some(op @ (Token::And | Token::Or)) => {
                    let name = if *op == Token::And { "AND" } else { "OR" };
                    if clauses.is_empty() || pending.is_some() {
                        return Err(FolioError::malformed_query(format!(
                            "'{name}' needs a clause on both sides"
                        )));
                    }
                    if let Some(Token::And) = self.advance() {
                        if let Some(last) = clauses.last_mut() {
                            if last.occur == Occur::Should {
                                last.occur = Occur::Must;
                            }
                        }
                        pending = Some(Token::And);
                    } else {
                        pending = Some(Token::Or);
                    }
                    continue;
                }
                _ => {}
            }

            let mut occur = match pending.take() {
                Some(Token::And) => Occur::Must,
                _ => Occur::Should,
            };
            match self.peek() {
                Some(Token::Plus) => {
                    self.advance();
                    occur = Occur::Must;
                }
                Some(Token::Minus | Token::Not) => {
                    self.advance();
                    occur = Occur::MustNot;
                }
                _ => {}
            }

            let node = self.parse_atom()?;
            clauses.push(Clause { occur, node });
        }

        if pending.is_some() {
            return Err(FolioError::malformed_query(
                "query ends with a dangling operator",
            ));
        }
        if nested && clauses.is_empty() {
            return Err(FolioError::malformed_query("empty group"));
        }
        Ok(clauses)
    }

    fn parse_atom(&mut self) -> Result<Node> {
        match self.advance() {
            Some(Token::Term {
                field,
                text,
                prefix,
            }) => Ok(Node::Term {
                field,
                text,
                prefix,
            }),
            Some(Token::Phrase { field, text }) => Ok(Node::Phrase { field, text }),
            Some(Token::LParen) => Ok(Node::Group(self.parse_clauses(true)?)),
            _ => Err(FolioError::malformed_query(
                "operator is not followed by a term",
            )),
        }
    }
}
