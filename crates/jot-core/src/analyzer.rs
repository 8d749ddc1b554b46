//! Text analysis shared by indexing and querying.
//!
//! The analyzer splits text on every non-alphanumeric character and lowercases
//! each resulting word. There is no stemming and no stop-word list, so a query
//! term matches a document term exactly when their lowercase forms are equal.

use serde::{Deserialize, Serialize};

/// A normalized word together with where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Lowercased token text
    pub text: String,

    /// Byte offset of the first character in the source text
    pub start: usize,

    /// Byte offset one past the last character in the source text
    pub end: usize,

    /// Ordinal of this token within the source text
    pub position: u32,
}

/// Split `text` into lowercase alphanumeric tokens.
///
/// Offsets always fall on character boundaries of `text`, and no token is
/// empty.
pub fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut word_start: Option<usize> = None;

    for (offset, ch) in text.char_indices() {
        if ch.is_alphanumeric() {
            if word_start.is_none() {
                word_start = Some(offset);
            }
        } else if let Some(start) = word_start.take() {
            push_token(&mut tokens, text, start, offset);
        }
    }

    if let Some(start) = word_start {
        push_token(&mut tokens, text, start, text.len());
    }

    tokens
}

/// Analyze text down to its term strings only.
pub fn terms(text: &str) -> Vec<String> {
    tokenize(text).into_iter().map(|t| t.text).collect()
}

fn push_token(tokens: &mut Vec<Token>, text: &str, start: usize, end: usize) {
    let position = tokens.len() as u32;
    tokens.push(Token {
        text: text[start..end].to_lowercase(),
        start,
        end,
        position,
    });
}
