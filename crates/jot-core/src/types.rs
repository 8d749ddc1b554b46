//! Core data types for Jot.
//!
//! This module defines the fundamental data structures shared by the indexer,
//! the on-disk store and the query engine. These types are designed to be:
//!
//! - **Serializable**: For persistence to disk
//! - **Fixed-shape**: Tagged structs rather than open-ended property maps
//! - **Deterministic**: Timestamps compare as plain strings

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

/// Position of a document within a committed snapshot.
///
/// Identifiers are assigned in insertion order and are only meaningful for
/// the `IndexReader` that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocId(pub u32);

impl DocId {
    /// Create a new document ID
    pub fn new(id: u32) -> Self {
        DocId(id)
    }

    /// Get the raw ID as a vector index
    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A local timestamp encoded as a fixed-width `yyyyMMddHHmmss` string.
///
/// The encoding sorts lexicographically in chronological order, so ordering
/// and range checks are plain string comparisons.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(String);

impl Timestamp {
    /// Storage format understood by `chrono`
    pub const FORMAT: &'static str = "%Y%m%d%H%M%S";

    /// Width of the encoded string
    pub const WIDTH: usize = 14;

    /// Encode a local date-time
    pub fn from_local(time: DateTime<Local>) -> Self {
        Timestamp(time.format(Self::FORMAT).to_string())
    }

    /// Encode a filesystem time in the local time zone
    pub fn from_system_time(time: SystemTime) -> Self {
        Self::from_local(DateTime::<Local>::from(time))
    }

    /// Parse an already encoded timestamp, rejecting anything that is not
    /// exactly fourteen digits forming a valid date.
    pub fn parse(encoded: &str) -> Option<Self> {
        if encoded.len() != Self::WIDTH || !encoded.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        NaiveDateTime::parse_from_str(encoded, Self::FORMAT).ok()?;
        Some(Timestamp(encoded.to_string()))
    }

    /// The encoded string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode back into a naive local date-time
    pub fn to_naive(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.0, Self::FORMAT).ok()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_naive() {
            Some(time) => write!(f, "{}", time.format("%Y-%m-%d %H:%M:%S")),
            None => write!(f, "{}", self.0),
        }
    }
}

/// A record for one indexed note.
///
/// Records are immutable once written; a rebuild replaces them wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// File name relative to the document root (e.g., "2024-03-01-standup.md")
    pub file_name: String,

    /// Creation time reported by the filesystem
    pub created: Timestamp,

    /// Last modification time reported by the filesystem
    pub modified: Timestamp,

    /// Number of tokens the analyzer produced for the content
    pub token_count: u32,
}

impl DocumentRecord {
    /// Create a new document record
    pub fn new(file_name: impl Into<String>, created: Timestamp, modified: Timestamp) -> Self {
        DocumentRecord {
            file_name: file_name.into(),
            created,
            modified,
            token_count: 0,
        }
    }

    /// Set the token count
    pub fn with_token_count(mut self, token_count: u32) -> Self {
        self.token_count = token_count;
        self
    }

    /// File name without its extension, lowercased
    pub fn stem_lower(&self) -> String {
        let lower = self.file_name.to_lowercase();
        match lower.rfind('.') {
            Some(dot) if dot > 0 => lower[..dot].to_string(),
            _ => lower,
        }
    }
}

/// Occurrences of one term within one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    /// The document containing the term
    pub doc: DocId,

    /// Token positions, strictly increasing
    pub positions: Vec<u32>,
}

impl Posting {
    /// Term frequency within the document
    pub fn term_frequency(&self) -> usize {
        self.positions.len()
    }
}

/// A ranked search result with its highlighted excerpt.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    /// File name relative to the document root
    pub file_name: String,

    /// Creation time at indexing
    pub created: Timestamp,

    /// Modification time at indexing
    pub modified: Timestamp,

    /// Relevance score (higher is more relevant)
    pub score: f32,

    /// Excerpt with match markers; empty if the document could not be read
    pub excerpt: String,

    /// 1-based line of the first highlighted match
    pub line_number: Option<usize>,
}

/// Statistics about the committed index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStats {
    /// Number of indexed documents
    pub documents: u64,

    /// Number of distinct terms across all segments
    pub terms: u64,

    /// Number of committed segments
    pub segments: u32,

    /// Commit generation (increments on every commit)
    pub generation: u64,

    /// When the index was last committed
    pub committed_at: Option<DateTime<Utc>>,

    /// Index format version
    pub version: u32,
}
