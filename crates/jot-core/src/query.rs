//! Query parsing.
//!
//! Query strings are parsed into a small boolean AST. The grammar:
//!
//! - `word` - a term; bare words next to each other are OR-ed
//! - `"several words"` - a phrase, the words must appear consecutively
//! - `a AND b`, `a OR b`, `a NOT b`, `NOT a` - operators (upper case only)
//! - `( ... )` - grouping
//! - `content:word`, `filename:name` - field scoping; `content` is the default
//!
//! Operators have no precedence and combine left to right, so `a OR b AND c`
//! means `(a OR b) AND c`. Words go through the same analyzer as documents;
//! a word that splits into several tokens (`follow-up`) becomes a phrase.
//!
//! Runs of the same operator collapse into one n-ary node, so a long list of
//! bare words stays flat. Queries that nest deeper than [`MAX_DEPTH`] are
//! rejected.

use crate::analyzer;
use crate::error::{JotError, Result};
use std::fmt;

/// Deepest query tree or group nesting the parser accepts
pub const MAX_DEPTH: usize = 64;

/// A parsed query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Single normalized term in the content field
    Term(String),

    /// Consecutive normalized terms in the content field
    Phrase(Vec<String>),

    /// Case-insensitive file name, with or without extension
    FileName(String),

    /// Every clause must match
    And(Vec<Query>),

    /// Any clause may match
    Or(Vec<Query>),

    /// Documents not matching the inner query
    Not(Box<Query>),
}

/// Fields a query clause can be scoped to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// Note text (default)
    Content,
    /// Note file name
    FileName,
}

impl Field {
    fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "content" => Some(Field::Content),
            "filename" => Some(Field::FileName),
            _ => None,
        }
    }
}

impl Query {
    /// Combine two queries with AND, extending `left` if it already is one
    pub fn and(left: Query, right: Query) -> Self {
        match left {
            Query::And(mut clauses) => {
                clauses.push(right);
                Query::And(clauses)
            }
            left => Query::And(vec![left, right]),
        }
    }

    /// Combine two queries with OR, extending `left` if it already is one
    pub fn or(left: Query, right: Query) -> Self {
        match left {
            Query::Or(mut clauses) => {
                clauses.push(right);
                Query::Or(clauses)
            }
            left => Query::Or(vec![left, right]),
        }
    }

    /// Negate a query
    pub fn negate(inner: Query) -> Self {
        Query::Not(Box::new(inner))
    }

    /// Leaf clauses that contribute matches, skipping negated ones.
    ///
    /// These are the clauses worth highlighting in a hit.
    pub fn positive_leaves(&self) -> Vec<&Query> {
        let mut leaves = Vec::new();
        self.collect_leaves(true, &mut leaves);
        leaves
    }

    fn collect_leaves<'a>(&'a self, positive: bool, out: &mut Vec<&'a Query>) {
        match self {
            Query::Term(_) | Query::Phrase(_) | Query::FileName(_) => {
                if positive {
                    out.push(self);
                }
            }
            Query::And(clauses) | Query::Or(clauses) => {
                for clause in clauses {
                    clause.collect_leaves(positive, out);
                }
            }
            Query::Not(inner) => inner.collect_leaves(!positive, out),
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Term(t) => write!(f, "{}", t),
            Query::Phrase(terms) => write!(f, "\"{}\"", terms.join(" ")),
            Query::FileName(name) => write!(f, "filename:{}", name),
            Query::And(clauses) => write_joined(f, clauses, " AND "),
            Query::Or(clauses) => write_joined(f, clauses, " OR "),
            Query::Not(inner) => write!(f, "NOT {}", inner),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, clauses: &[Query], separator: &str) -> fmt::Result {
    f.write_str("(")?;
    for (i, clause) in clauses.iter().enumerate() {
        if i > 0 {
            f.write_str(separator)?;
        }
        write!(f, "{}", clause)?;
    }
    f.write_str(")")
}

/// Parse a query string.
///
/// # Example
/// ```
/// use jot_core::query::parse;
/// let query = parse("\"quarterly report\" AND friday").unwrap();
/// assert_eq!(query.to_string(), "(\"quarterly report\" AND friday)");
/// ```
pub fn parse(input: &str) -> Result<Query> {
    let tokens = lex(input)?;
    let mut parser = Parser {
        input,
        tokens,
        pos: 0,
        nesting: 0,
    };

    if parser.tokens.is_empty() {
        return Err(JotError::query_syntax(input, 0, "query is empty"));
    }

    let (query, _) = parser.parse_expr(Field::Content)?;
    if let Some(token) = parser.peek() {
        return Err(JotError::query_syntax(
            input,
            token.offset,
            "unbalanced ')'",
        ));
    }
    Ok(query)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LexKind {
    Word(String),
    Quoted(String),
    Field(String),
    And,
    Or,
    Not,
    Open,
    Close,
}

#[derive(Debug, Clone)]
struct LexToken {
    kind: LexKind,
    offset: usize,
}

fn lex(input: &str) -> Result<Vec<LexToken>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(offset, ch)) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(LexToken { kind: LexKind::Open, offset });
            }
            ')' => {
                chars.next();
                tokens.push(LexToken { kind: LexKind::Close, offset });
            }
            '"' => {
                chars.next();
                let start = offset + 1;
                let mut end = None;
                for (i, c) in chars.by_ref() {
                    if c == '"' {
                        end = Some(i);
                        break;
                    }
                }
                let end = end.ok_or_else(|| {
                    JotError::query_syntax(input, offset, "unterminated phrase, missing '\"'")
                })?;
                tokens.push(LexToken {
                    kind: LexKind::Quoted(input[start..end].to_string()),
                    offset,
                });
            }
            _ => {
                let mut end = input.len();
                let mut field_end = None;
                while let Some(&(i, c)) = chars.peek() {
                    if c.is_whitespace() || c == '(' || c == ')' || c == '"' {
                        end = i;
                        break;
                    }
                    chars.next();
                    if c == ':' && field_end.is_none() {
                        let prefix = &input[offset..i];
                        if !prefix.is_empty() && prefix.chars().all(|p| p.is_ascii_alphabetic()) {
                            field_end = Some(i);
                            break;
                        }
                    }
                }

                if let Some(name_end) = field_end {
                    tokens.push(LexToken {
                        kind: LexKind::Field(input[offset..name_end].to_string()),
                        offset,
                    });
                    continue;
                }

                let word = &input[offset..end];
                let kind = match word {
                    "AND" | "&&" => LexKind::And,
                    "OR" | "||" => LexKind::Or,
                    "NOT" => LexKind::Not,
                    _ => LexKind::Word(word.to_string()),
                };
                tokens.push(LexToken { kind, offset });
            }
        }
    }

    Ok(tokens)
}

/// A parsed subtree and the depth of its tree
type Parsed = (Query, usize);

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<LexToken>,
    pos: usize,
    /// Open groups and NOTs around the current token
    nesting: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&LexToken> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<LexToken> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, offset: usize, reason: &str) -> JotError {
        JotError::query_syntax(self.input, offset, reason)
    }

    fn end_offset(&self) -> usize {
        self.input.len()
    }

    fn enter(&mut self, offset: usize) -> Result<()> {
        self.nesting += 1;
        if self.nesting > MAX_DEPTH {
            return Err(self.error(offset, "query nests too deeply"));
        }
        Ok(())
    }

    fn parse_expr(&mut self, field: Field) -> Result<Parsed> {
        let (mut left, mut depth) = self.parse_unary(field)?;

        loop {
            let (kind, offset) = match self.peek() {
                None => break,
                Some(token) if token.kind == LexKind::Close => break,
                Some(token) => (token.kind.clone(), token.offset),
            };

            let conjunction = matches!(kind, LexKind::And | LexKind::Not);
            let (right, right_depth) = match kind {
                LexKind::And | LexKind::Or => {
                    self.advance();
                    self.parse_unary(field)?
                }
                LexKind::Not => {
                    self.advance();
                    let (inner, inner_depth) = self.parse_unary(field)?;
                    (Query::negate(inner), inner_depth + 1)
                }
                _ => self.parse_unary(field)?,
            };

            // Extending a node of the same kind keeps the tree flat.
            let extends = match &left {
                Query::And(_) => conjunction,
                Query::Or(_) => !conjunction,
                _ => false,
            };
            depth = if extends {
                depth.max(right_depth + 1)
            } else {
                depth.max(right_depth) + 1
            };
            if depth > MAX_DEPTH {
                return Err(self.error(offset, "query nests too deeply"));
            }

            left = if conjunction {
                Query::and(left, right)
            } else {
                Query::or(left, right)
            };
        }

        Ok((left, depth))
    }

    fn parse_unary(&mut self, field: Field) -> Result<Parsed> {
        if let Some(token) = self.peek().filter(|t| t.kind == LexKind::Not) {
            let offset = token.offset;
            self.advance();
            self.enter(offset)?;
            let (inner, depth) = self.parse_unary(field)?;
            self.nesting -= 1;
            return Ok((Query::negate(inner), depth + 1));
        }
        self.parse_primary(field)
    }

    fn parse_primary(&mut self, field: Field) -> Result<Parsed> {
        let token = match self.advance() {
            Some(token) => token,
            None => {
                return Err(self.error(self.end_offset(), "expected a term after operator"));
            }
        };

        match token.kind {
            LexKind::Word(word) => Ok((self.leaf(field, &word, token.offset)?, 1)),
            LexKind::Quoted(text) => Ok((self.leaf(field, &text, token.offset)?, 1)),
            LexKind::Open => {
                if matches!(self.peek(), Some(t) if t.kind == LexKind::Close) {
                    return Err(self.error(token.offset, "empty group '()'"));
                }
                self.enter(token.offset)?;
                let inner = self.parse_expr(field)?;
                self.nesting -= 1;
                match self.advance() {
                    Some(close) if close.kind == LexKind::Close => Ok(inner),
                    _ => Err(self.error(token.offset, "unbalanced '(', missing ')'")),
                }
            }
            LexKind::Field(name) => {
                let scoped = Field::parse(&name)
                    .ok_or_else(|| self.error(token.offset, &format!("unknown field '{}'", name)))?;
                match self.peek() {
                    Some(t)
                        if matches!(
                            t.kind,
                            LexKind::Word(_) | LexKind::Quoted(_) | LexKind::Open
                        ) =>
                    {
                        self.parse_primary(scoped)
                    }
                    _ => Err(self.error(token.offset, &format!("field '{}' has no value", name))),
                }
            }
            LexKind::And | LexKind::Or => {
                Err(self.error(token.offset, "operator is missing its left operand"))
            }
            LexKind::Not => Err(self.error(token.offset, "dangling NOT")),
            LexKind::Close => Err(self.error(token.offset, "unbalanced ')'")),
        }
    }

    fn leaf(&self, field: Field, text: &str, offset: usize) -> Result<Query> {
        match field {
            Field::Content => {
                let mut terms = analyzer::terms(text);
                match terms.len() {
                    0 => Err(self.error(offset, "term contains no searchable text")),
                    1 => Ok(Query::Term(terms.remove(0))),
                    _ => Ok(Query::Phrase(terms)),
                }
            }
            Field::FileName => {
                let name = text.trim().to_lowercase();
                if name.is_empty() {
                    Err(self.error(offset, "empty file name"))
                } else {
                    Ok(Query::FileName(name))
                }
            }
        }
    }
}
