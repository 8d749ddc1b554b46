//! In-memory inverted index structures.
//!
//! Two structures live here:
//!
//! - `SegmentBuilder` collects documents and postings during a write pass.
//!   It becomes one immutable `StoredSegment` on commit.
//! - `IndexReader` is a committed snapshot: every segment of one commit point
//!   merged into a single term dictionary with snapshot-wide document ids.
//!
//! ## Architecture
//!
//! - A `Vec<DocumentRecord>` stores documents; a `DocId` is an index into it
//! - A `HashMap<String, Vec<Posting>>` maps each term to its postings, sorted
//!   by document, so document frequency is the postings length
//! - Each document remembers which segment it came from, so the reader can
//!   report the folder the document must be re-read from
//!
//! A reader never changes after construction. Whatever happens on disk
//! afterwards, it keeps answering from the state it was built from.

use crate::analyzer::Token;
use crate::types::{DocId, DocumentRecord, Posting};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Serialized body of a segment file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoredSegment {
    /// Documents in insertion order; local ids are positions in this list
    pub documents: Vec<DocumentRecord>,

    /// Term dictionary sorted by term, postings sorted by local doc id
    pub terms: Vec<(String, Vec<Posting>)>,
}

/// Accumulates documents for one write pass.
#[derive(Debug, Default)]
pub struct SegmentBuilder {
    documents: Vec<DocumentRecord>,
    terms: BTreeMap<String, Vec<Posting>>,
}

impl SegmentBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents buffered so far
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Check if nothing has been buffered
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Append a document and its analyzed tokens.
    ///
    /// Returns the document's id local to this segment. Positions for each
    /// term are sorted and deduplicated, so callers may pass tokens in any
    /// order.
    pub fn add_document(&mut self, record: DocumentRecord, tokens: &[Token]) -> DocId {
        let doc = DocId::new(self.documents.len() as u32);

        let mut by_term: BTreeMap<&str, Vec<u32>> = BTreeMap::new();
        for token in tokens {
            by_term.entry(token.text.as_str()).or_default().push(token.position);
        }

        for (term, mut positions) in by_term {
            positions.sort_unstable();
            positions.dedup();
            self.terms
                .entry(term.to_string())
                .or_default()
                .push(Posting { doc, positions });
        }

        self.documents
            .push(record.with_token_count(tokens.len() as u32));
        doc
    }

    /// Freeze the buffered state into a serializable segment.
    pub fn finish(self) -> StoredSegment {
        StoredSegment {
            documents: self.documents,
            terms: self.terms.into_iter().collect(),
        }
    }
}

/// A read-only snapshot of a committed index.
#[derive(Debug, Default)]
pub struct IndexReader {
    /// Commit generation this snapshot was loaded from
    generation: u64,

    /// All documents across segments
    documents: Vec<DocumentRecord>,

    /// Segment index for every document
    doc_segment: Vec<usize>,

    /// Document root of every segment
    segment_roots: Vec<PathBuf>,

    /// Merged term dictionary
    terms: HashMap<String, Vec<Posting>>,
}

impl IndexReader {
    /// Build a snapshot from segments in commit order.
    ///
    /// Local document ids are shifted by the number of documents in earlier
    /// segments, which keeps every postings list sorted by `DocId`.
    pub fn from_segments(generation: u64, segments: Vec<(PathBuf, StoredSegment)>) -> Self {
        let mut reader = IndexReader {
            generation,
            ..Default::default()
        };

        for (segment_idx, (root, segment)) in segments.into_iter().enumerate() {
            let offset = reader.documents.len() as u32;
            let count = segment.documents.len();

            reader.documents.extend(segment.documents);
            reader
                .doc_segment
                .extend(std::iter::repeat(segment_idx).take(count));
            reader.segment_roots.push(root);

            for (term, postings) in segment.terms {
                let merged = reader.terms.entry(term).or_default();
                merged.extend(postings.into_iter().map(|p| Posting {
                    doc: DocId::new(p.doc.0 + offset),
                    positions: p.positions,
                }));
            }
        }

        debug!(
            generation,
            documents = reader.documents.len(),
            terms = reader.terms.len(),
            "Snapshot assembled"
        );

        reader
    }

    /// Commit generation of this snapshot
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Total number of documents
    pub fn num_docs(&self) -> usize {
        self.documents.len()
    }

    /// Number of distinct terms
    pub fn num_terms(&self) -> usize {
        self.terms.len()
    }

    /// Number of segments merged into this snapshot
    pub fn num_segments(&self) -> usize {
        self.segment_roots.len()
    }

    /// Look up a document record
    pub fn document(&self, doc: DocId) -> Option<&DocumentRecord> {
        self.documents.get(doc.as_usize())
    }

    /// Folder the document was indexed from
    pub fn document_root(&self, doc: DocId) -> Option<&Path> {
        let segment = *self.doc_segment.get(doc.as_usize())?;
        self.segment_roots.get(segment).map(PathBuf::as_path)
    }

    /// Iterate over every document id in the snapshot
    pub fn doc_ids(&self) -> impl Iterator<Item = DocId> + '_ {
        (0..self.documents.len() as u32).map(DocId::new)
    }

    /// Iterate over every document with its id
    pub fn documents(&self) -> impl Iterator<Item = (DocId, &DocumentRecord)> + '_ {
        self.documents
            .iter()
            .enumerate()
            .map(|(i, d)| (DocId::new(i as u32), d))
    }

    /// Postings for a term, sorted by document; empty if the term is unknown
    pub fn postings(&self, term: &str) -> &[Posting] {
        self.terms.get(term).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of distinct documents containing a term
    pub fn doc_frequency(&self, term: &str) -> usize {
        self.postings(term).len()
    }
}
