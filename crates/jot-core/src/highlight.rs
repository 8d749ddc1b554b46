//! Excerpt extraction and match highlighting.
//!
//! A hit's excerpt is cut from the note as it is on disk at search time. Two
//! strategies exist:
//!
//! - `Highlighter::best_excerpt` re-tokenizes the note, finds every token or
//!   phrase the query matched, and picks the window of text holding the most
//!   matches. Each match is wrapped in start/end markers; the text around
//!   them is left untouched.
//! - `Highlighter::literal_excerpt` scans line by line for the raw query
//!   string, case-insensitively. It is used when the token scan finds nothing
//!   (the note changed since indexing, or only a file name clause matched).

use crate::analyzer::{tokenize, Token};
use crate::query::Query;
use regex::RegexBuilder;
use std::collections::HashSet;

/// Characters kept before a literal match
pub const LITERAL_LOOKBACK: usize = 20;
/// Characters kept after the start of a literal match, beyond its own length
pub const LITERAL_TRAILING: usize = 100;

/// A fragment of a note ready for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Excerpt {
    /// Fragment text with match markers
    pub text: String,

    /// 1-based line of the first match
    pub line_number: usize,
}

/// Marks matches in note text.
#[derive(Debug, Clone)]
pub struct Highlighter {
    start_marker: String,
    end_marker: String,
}

impl Default for Highlighter {
    fn default() -> Self {
        Highlighter::new("**", "**")
    }
}

impl Highlighter {
    /// Create a highlighter wrapping matches in the given markers
    pub fn new(start_marker: impl Into<String>, end_marker: impl Into<String>) -> Self {
        Highlighter {
            start_marker: start_marker.into(),
            end_marker: end_marker.into(),
        }
    }

    /// Cut the window of about `max_length` bytes with the densest matches.
    ///
    /// Returns `None` if no token of `content` satisfies a positive term or
    /// phrase of `query`.
    pub fn best_excerpt(&self, content: &str, query: &Query, max_length: usize) -> Option<Excerpt> {
        let tokens = tokenize(content);
        let spans = match_spans(&tokens, query);
        let first = *spans.first()?;

        let (mut start, mut end) = if content.len() <= max_length {
            (0, content.len())
        } else {
            densest_window(content, &spans, max_length)
        };

        if start > 0 {
            start = advance_to_word_start(content, start, covered_start(&spans, start, end));
        }
        if end < content.len() {
            end = retreat_to_word_end(content, end, covered_end(&spans, start, end));
        }

        let window = &content[start..end];
        start += window.len() - window.trim_start().len();
        end -= window.len() - window.trim_end().len();

        let mut text = String::with_capacity(end - start + 16);
        let mut cursor = start;
        let mut first_marked = None;
        for &(s, e) in &spans {
            let s = s.max(start);
            let e = e.min(end);
            if s >= e {
                continue;
            }
            first_marked.get_or_insert(s);
            text.push_str(&content[cursor..s]);
            text.push_str(&self.start_marker);
            text.push_str(&content[s..e]);
            text.push_str(&self.end_marker);
            cursor = e;
        }
        text.push_str(&content[cursor..end]);

        let anchor = first_marked.unwrap_or(first.0);
        Some(Excerpt {
            text,
            line_number: line_of(content, anchor),
        })
    }

    /// Find the first line containing `raw_query` literally, ignoring case.
    ///
    /// The excerpt starts `LITERAL_LOOKBACK` characters before the match and
    /// runs for the query length plus `LITERAL_TRAILING` characters, clipped to
    /// the trimmed line.
    pub fn literal_excerpt(&self, content: &str, raw_query: &str) -> Option<Excerpt> {
        let needle = raw_query.trim().trim_matches('"').trim();
        if needle.is_empty() {
            return None;
        }
        let pattern = RegexBuilder::new(&regex::escape(needle))
            .case_insensitive(true)
            .build()
            .ok()?;

        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            let found = match pattern.find(line) {
                Some(found) => found,
                None => continue,
            };

            let hit_char = line[..found.start()].chars().count();
            let hit_len = found.as_str().chars().count();
            let start = hit_char.saturating_sub(LITERAL_LOOKBACK);
            let length = needle.chars().count() + LITERAL_TRAILING;

            let before = safe_substring(line, start, hit_char - start);
            let matched = safe_substring(line, hit_char, hit_len);
            let remaining = length.saturating_sub(hit_char - start + hit_len);
            let after = safe_substring(line, hit_char + hit_len, remaining);

            let text = format!(
                "{}{}{}{}{}",
                before, self.start_marker, matched, self.end_marker, after
            );
            return Some(Excerpt {
                text,
                line_number: idx + 1,
            });
        }

        None
    }
}

/// Substring by character positions that never panics.
///
/// Returns an empty string if `start` is at or past the end, and the rest of
/// the string if `length` runs past the end.
pub fn safe_substring(text: &str, start: usize, length: usize) -> &str {
    let mut boundaries = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()));

    let begin = match boundaries.nth(start) {
        Some(begin) => begin,
        None => return "",
    };
    if length == 0 {
        return "";
    }
    let end = boundaries.nth(length - 1).unwrap_or(text.len());
    &text[begin..end]
}

/// Byte ranges of all matched terms and phrases, sorted and merged.
fn match_spans(tokens: &[Token], query: &Query) -> Vec<(usize, usize)> {
    let mut terms: HashSet<&str> = HashSet::new();
    let mut phrases: Vec<&[String]> = Vec::new();
    for leaf in query.positive_leaves() {
        match leaf {
            Query::Term(term) => {
                terms.insert(term.as_str());
            }
            Query::Phrase(words) if !words.is_empty() => phrases.push(words.as_slice()),
            _ => {}
        }
    }

    let mut spans: Vec<(usize, usize)> = tokens
        .iter()
        .filter(|t| terms.contains(t.text.as_str()))
        .map(|t| (t.start, t.end))
        .collect();

    for phrase in phrases {
        if phrase.len() > tokens.len() {
            continue;
        }
        for window in tokens.windows(phrase.len()) {
            if window.iter().zip(phrase).all(|(t, w)| t.text == *w) {
                spans.push((window[0].start, window[phrase.len() - 1].end));
            }
        }
    }

    spans.sort_unstable();
    let mut merged: Vec<(usize, usize)> = Vec::with_capacity(spans.len());
    for (s, e) in spans {
        match merged.last_mut() {
            Some(last) if s <= last.1 => last.1 = last.1.max(e),
            _ => merged.push((s, e)),
        }
    }
    merged
}

/// Window of `max_length` bytes around the span with the most neighbours.
fn densest_window(content: &str, spans: &[(usize, usize)], max_length: usize) -> (usize, usize) {
    let limit = content.len() - max_length;
    let mut best = (0, max_length.min(content.len()));
    let mut best_count = 0;

    for &(s, e) in spans {
        let center = s + (e - s) / 2;
        let start = center.saturating_sub(max_length / 2).min(limit);
        let end = start + max_length;
        let count = spans
            .iter()
            .filter(|&&(os, oe)| os >= start && oe <= end)
            .count();
        if count > best_count {
            best_count = count;
            best = (start, end);
        }
    }

    if best_count == 0 {
        // A single match longer than the window: start at the match.
        let start = spans[0].0.min(limit);
        best = (start, start + max_length);
    }

    (floor_boundary(content, best.0), floor_boundary(content, best.1))
}

/// Start of the first span inside the window, or the window end
fn covered_start(spans: &[(usize, usize)], start: usize, end: usize) -> usize {
    spans
        .iter()
        .filter(|&&(s, e)| e > start && s < end)
        .map(|&(s, _)| s.max(start))
        .next()
        .unwrap_or(end)
}

/// End of the last span inside the window, or the window start
fn covered_end(spans: &[(usize, usize)], start: usize, end: usize) -> usize {
    spans
        .iter()
        .filter(|&&(s, e)| e > start && s < end)
        .map(|&(_, e)| e.min(end))
        .last()
        .unwrap_or(start)
}

/// Move `start` past a partial word, without passing `limit`.
fn advance_to_word_start(content: &str, start: usize, limit: usize) -> usize {
    let preceded_by_space = content[..start]
        .chars()
        .next_back()
        .map_or(true, char::is_whitespace);
    if preceded_by_space || limit <= start {
        return start;
    }
    match content[start..limit].find(char::is_whitespace) {
        Some(offset) => {
            let ws = start + offset;
            let ch_len = content[ws..].chars().next().map_or(1, char::len_utf8);
            ws + ch_len
        }
        None => start,
    }
}

/// Move `end` back before a partial word, without passing `limit`.
fn retreat_to_word_end(content: &str, end: usize, limit: usize) -> usize {
    let followed_by_space = content[end..]
        .chars()
        .next()
        .map_or(true, char::is_whitespace);
    if followed_by_space || limit >= end {
        return end;
    }
    match content[limit..end].rfind(char::is_whitespace) {
        Some(offset) => limit + offset,
        None => end,
    }
}

fn floor_boundary(content: &str, mut index: usize) -> usize {
    index = index.min(content.len());
    while !content.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn line_of(content: &str, offset: usize) -> usize {
    content[..offset].matches('\n').count() + 1
}
