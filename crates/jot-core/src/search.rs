//! Query execution and ranking.
//!
//! `execute` evaluates a parsed `Query` against an `IndexReader` snapshot and
//! returns ranked document ids. `Searcher` adds everything a caller needs on
//! top: reader caching, excerpt extraction and `SearchHit` assembly.
//!
//! ## Scoring
//!
//! Each matched term or phrase contributes `tf * (1 + ln(N / df))`, where `N`
//! is the number of documents in the snapshot. A phrase is one unit: its
//! `tf` is the number of aligned occurrences and its `df` the number of
//! documents containing it at least once. `AND` and `OR` sum the scores of
//! their clauses; `NOT` contributes nothing.
//!
//! Ranking is by score descending, then `modified` descending, then file name
//! ascending. Truncation to `max_results` happens after ranking.

use crate::error::{JotError, Result};
use crate::highlight::{Excerpt, Highlighter};
use crate::index::IndexReader;
use crate::persistence::IndexStore;
use crate::query::{self, Query};
use crate::source::{DocumentSource, FolderSource};
use crate::types::{DocId, Posting, SearchHit};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Default number of hits returned by a search
pub const DEFAULT_MAX_RESULTS: usize = 20;

/// Default excerpt length in bytes
pub const DEFAULT_EXCERPT_LENGTH: usize = 120;

/// Matching documents with their accumulated scores
type Matches = BTreeMap<DocId, f32>;

/// Evaluate `query` against `reader` and return the top `max_results`
/// documents with their scores, best first.
pub fn execute(query: &Query, reader: &IndexReader, max_results: usize) -> Vec<(DocId, f32)> {
    if max_results == 0 {
        return Vec::new();
    }

    let matches = evaluate(query, reader);
    let mut ranked: Vec<(DocId, f32)> = matches.into_iter().collect();
    ranked.sort_by(|a, b| compare_hits(reader, *a, *b));
    ranked.truncate(max_results);
    ranked
}

fn compare_hits(reader: &IndexReader, a: (DocId, f32), b: (DocId, f32)) -> Ordering {
    let by_record = match (reader.document(a.0), reader.document(b.0)) {
        (Some(da), Some(db)) => db
            .modified
            .cmp(&da.modified)
            .then_with(|| da.file_name.cmp(&db.file_name)),
        _ => Ordering::Equal,
    };
    b.1.total_cmp(&a.1)
        .then(by_record)
        .then_with(|| a.0.cmp(&b.0))
}

fn evaluate(query: &Query, reader: &IndexReader) -> Matches {
    match query {
        Query::Term(term) => {
            let postings = reader.postings(term);
            let idf = idf(reader.num_docs(), postings.len());
            postings
                .iter()
                .map(|p| (p.doc, p.term_frequency() as f32 * idf))
                .collect()
        }
        Query::Phrase(words) => {
            let occurrences = phrase_occurrences(reader, words);
            let idf = idf(reader.num_docs(), occurrences.len());
            occurrences
                .into_iter()
                .map(|(doc, tf)| (doc, tf as f32 * idf))
                .collect()
        }
        Query::FileName(name) => {
            let name = name.to_lowercase();
            let docs: Vec<DocId> = reader
                .documents()
                .filter(|(_, d)| d.file_name.to_lowercase() == name || d.stem_lower() == name)
                .map(|(id, _)| id)
                .collect();
            let idf = idf(reader.num_docs(), docs.len());
            docs.into_iter().map(|doc| (doc, idf)).collect()
        }
        Query::And(clauses) => {
            let mut clauses = clauses.iter();
            let Some(first) = clauses.next() else {
                return Matches::new();
            };
            let mut matched = evaluate(first, reader);
            for clause in clauses {
                if matched.is_empty() {
                    break;
                }
                let other = evaluate(clause, reader);
                matched = matched
                    .into_iter()
                    .filter_map(|(doc, score)| other.get(&doc).map(|s| (doc, score + s)))
                    .collect();
            }
            matched
        }
        Query::Or(clauses) => {
            let mut merged = Matches::new();
            for clause in clauses {
                for (doc, score) in evaluate(clause, reader) {
                    *merged.entry(doc).or_insert(0.0) += score;
                }
            }
            merged
        }
        Query::Not(inner) => {
            let excluded = evaluate(inner, reader);
            reader
                .doc_ids()
                .filter(|doc| !excluded.contains_key(doc))
                .map(|doc| (doc, 0.0))
                .collect()
        }
    }
}

/// Smoothed inverse document frequency; always at least 1 for a match.
fn idf(num_docs: usize, doc_frequency: usize) -> f32 {
    if doc_frequency == 0 {
        return 0.0;
    }
    1.0 + (num_docs as f32 / doc_frequency as f32).ln()
}

/// Documents containing the phrase, with the number of aligned occurrences.
fn phrase_occurrences(reader: &IndexReader, words: &[String]) -> Vec<(DocId, usize)> {
    let Some((first, rest)) = words.split_first() else {
        return Vec::new();
    };

    let lists: Vec<&[Posting]> = rest.iter().map(|w| reader.postings(w)).collect();
    if lists.iter().any(|l| l.is_empty()) {
        return Vec::new();
    }

    let mut found = Vec::new();
    'docs: for posting in reader.postings(first) {
        let mut following: Vec<&[u32]> = Vec::with_capacity(lists.len());
        for list in &lists {
            match list.binary_search_by_key(&posting.doc, |p| p.doc) {
                Ok(idx) => following.push(&list[idx].positions),
                Err(_) => continue 'docs,
            }
        }

        let tf = posting
            .positions
            .iter()
            .filter(|&&start| {
                following.iter().enumerate().all(|(offset, positions)| {
                    positions.binary_search(&(start + offset as u32 + 1)).is_ok()
                })
            })
            .count();

        if tf > 0 {
            found.push((posting.doc, tf));
        }
    }
    found
}

/// Opens the document source a segment was indexed from, given its root.
pub type SourceOpener = dyn Fn(&Path) -> Result<Box<dyn DocumentSource>> + Send + Sync;

struct CachedReader {
    generation: u64,
    committed_at: DateTime<Utc>,
    reader: Arc<IndexReader>,
}

/// Search front end over an index directory.
///
/// The committed snapshot is loaded once and reused until a newer commit
/// appears on disk.
pub struct Searcher {
    store: IndexStore,
    highlighter: Highlighter,
    excerpt_length: usize,
    open_source: Arc<SourceOpener>,
    cached: RwLock<Option<CachedReader>>,
}

impl Searcher {
    /// Create a searcher over the index at `index_path`.
    ///
    /// Nothing is read until the first search.
    pub fn new(index_path: impl AsRef<Path>) -> Self {
        Searcher {
            store: IndexStore::new(index_path),
            highlighter: Highlighter::default(),
            excerpt_length: DEFAULT_EXCERPT_LENGTH,
            open_source: Arc::new(|root: &Path| -> Result<Box<dyn DocumentSource>> {
                let source: Box<dyn DocumentSource> = Box::new(FolderSource::markdown(root)?);
                Ok(source)
            }),
            cached: RwLock::new(None),
        }
    }

    /// Use a custom highlighter
    pub fn with_highlighter(mut self, highlighter: Highlighter) -> Self {
        self.highlighter = highlighter;
        self
    }

    /// Set the target excerpt length
    pub fn with_excerpt_length(mut self, excerpt_length: usize) -> Self {
        self.excerpt_length = excerpt_length;
        self
    }

    /// Re-read notes for excerpts through folder sources using `pattern`
    pub fn with_document_pattern(self, pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        self.with_source_opener(move |root| {
            let source: Box<dyn DocumentSource> = Box::new(FolderSource::new(root, &pattern)?);
            Ok(source)
        })
    }

    /// Re-read notes for excerpts through sources built by `open`
    pub fn with_source_opener<F>(mut self, open: F) -> Self
    where
        F: Fn(&Path) -> Result<Box<dyn DocumentSource>> + Send + Sync + 'static,
    {
        self.open_source = Arc::new(open);
        self
    }

    /// Current committed snapshot, reloaded if the commit changed.
    pub fn reader(&self) -> Result<Arc<IndexReader>> {
        let commit = match self.store.read_commit()? {
            Some(commit) => commit,
            None if !self.store.dir().is_dir() => {
                return Err(JotError::IndexNotFound {
                    path: self.store.dir().to_path_buf(),
                })
            }
            None => {
                return Err(JotError::IndexNotCommitted {
                    path: self.store.dir().to_path_buf(),
                })
            }
        };

        if let Some(cached) = self.cached.read().as_ref() {
            if cached.generation == commit.generation && cached.committed_at == commit.committed_at
            {
                return Ok(Arc::clone(&cached.reader));
            }
        }

        let reader = Arc::new(self.store.open_reader()?);
        debug!(generation = reader.generation(), "Reader reloaded");
        *self.cached.write() = Some(CachedReader {
            generation: commit.generation,
            committed_at: commit.committed_at,
            reader: Arc::clone(&reader),
        });
        Ok(reader)
    }

    /// Parse and run `query_text`, returning at most `max_results` hits.
    ///
    /// A hit whose note can no longer be read is still returned, with an
    /// empty excerpt.
    #[instrument(skip(self), fields(path = %self.store.dir().display()))]
    pub fn search(&self, query_text: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let query = query::parse(query_text)?;
        let reader = self.reader()?;
        let ranked = execute(&query, &reader, max_results);

        let hits: Vec<SearchHit> = ranked
            .par_iter()
            .filter_map(|&(doc, score)| {
                let record = reader.document(doc)?;
                let excerpt = reader
                    .document_root(doc)
                    .and_then(|root| self.excerpt(root, &record.file_name, &query, query_text));

                Some(SearchHit {
                    file_name: record.file_name.clone(),
                    created: record.created.clone(),
                    modified: record.modified.clone(),
                    score,
                    line_number: excerpt.as_ref().map(|e| e.line_number),
                    excerpt: excerpt.map(|e| e.text).unwrap_or_default(),
                })
            })
            .collect();

        debug!(query = %query, hits = hits.len(), "Search complete");
        Ok(hits)
    }

    fn excerpt(&self, root: &Path, file_name: &str, query: &Query, raw: &str) -> Option<Excerpt> {
        let content = match (self.open_source)(root).and_then(|s| s.read_document(file_name)) {
            Ok(content) => content,
            Err(e) => {
                warn!(file = file_name, error = %e, "Could not re-read note for highlighting");
                return None;
            }
        };

        self.highlighter
            .best_excerpt(&content, query, self.excerpt_length)
            .or_else(|| self.highlighter.literal_excerpt(&content, raw))
    }
}

impl std::fmt::Debug for Searcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Searcher")
            .field("path", &self.store.dir())
            .field("excerpt_length", &self.excerpt_length)
            .finish()
    }
}

/// Search the index at `index_path` with default settings.
pub fn search(
    query_text: &str,
    index_path: impl AsRef<Path>,
    max_results: usize,
) -> Result<Vec<SearchHit>> {
    Searcher::new(index_path).search(query_text, max_results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::tokenize;
    use crate::index::{SegmentBuilder, StoredSegment};
    use crate::indexer::{index, Indexer};
    use crate::types::{DocumentRecord, Timestamp};
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn reader(docs: &[(&str, &str, &str)]) -> IndexReader {
        let mut builder = SegmentBuilder::new();
        for (name, modified, content) in docs {
            let ts = Timestamp::parse(modified).unwrap();
            builder.add_document(DocumentRecord::new(*name, ts.clone(), ts), &tokenize(content));
        }
        let segment: StoredSegment = builder.finish();
        IndexReader::from_segments(1, vec![(PathBuf::from("/notes"), segment)])
    }

    fn names(reader: &IndexReader, ranked: &[(DocId, f32)]) -> Vec<String> {
        ranked
            .iter()
            .map(|(doc, _)| reader.document(*doc).unwrap().file_name.clone())
            .collect()
    }

    fn run(reader: &IndexReader, query: &str) -> Vec<String> {
        names(reader, &execute(&query::parse(query).unwrap(), reader, 100))
    }

    const TS: &str = "20240101120000";

    #[test]
    fn test_term_frequency_ranks_higher() {
        let r = reader(&[
            ("once.md", TS, "budget meeting"),
            ("thrice.md", TS, "budget budget budget"),
            ("none.md", TS, "holiday plans"),
        ]);
        assert_eq!(run(&r, "budget"), vec!["thrice.md", "once.md"]);
    }

    #[test]
    fn test_rare_terms_weigh_more() {
        let r = reader(&[
            ("a.md", TS, "common"),
            ("b.md", TS, "common rare"),
            ("c.md", TS, "common"),
        ]);
        let ranked = execute(&query::parse("common rare").unwrap(), &r, 10);
        assert_eq!(names(&r, &ranked)[0], "b.md");
        assert!(ranked.iter().all(|(_, score)| *score > 0.0));
    }

    #[test]
    fn test_term_in_every_document_scores_positive() {
        let r = reader(&[("a.md", TS, "friday"), ("b.md", TS, "friday")]);
        let ranked = execute(&query::parse("friday").unwrap(), &r, 10);
        assert_eq!(ranked.len(), 2);
        assert!(ranked.iter().all(|(_, score)| *score > 0.0));
    }

    #[test]
    fn test_phrase_requires_contiguous_positions() {
        let r = reader(&[
            ("a.md", TS, "the quarterly report is due"),
            ("b.md", TS, "report on the quarterly numbers"),
        ]);
        assert_eq!(run(&r, "\"quarterly report\""), vec!["a.md"]);
        assert_eq!(run(&r, "\"report quarterly\""), Vec::<String>::new());
    }

    #[test]
    fn test_phrase_counts_occurrences() {
        let r = reader(&[
            ("twice.md", TS, "to be or not to be"),
            ("once.md", TS, "to be continued"),
        ]);
        let ranked = execute(&query::parse("\"to be\"").unwrap(), &r, 10);
        assert_eq!(names(&r, &ranked), vec!["twice.md", "once.md"]);
        assert!(ranked[0].1 > ranked[1].1);
    }

    #[test]
    fn test_boolean_operators() {
        let r = reader(&[
            ("a.md", TS, "alpha beta"),
            ("b.md", TS, "alpha"),
            ("c.md", TS, "beta gamma"),
        ]);
        assert_eq!(run(&r, "alpha AND beta"), vec!["a.md"]);
        assert_eq!(run(&r, "alpha NOT beta"), vec!["b.md"]);

        let mut either = run(&r, "alpha OR gamma");
        either.sort();
        assert_eq!(either, vec!["a.md", "b.md", "c.md"]);

        assert_eq!(run(&r, "NOT alpha"), vec!["c.md"]);
        assert_eq!(run(&r, "(alpha OR gamma) AND beta").len(), 2);
    }

    #[test]
    fn test_pure_negation_scores_zero() {
        let r = reader(&[("a.md", TS, "alpha"), ("b.md", TS, "beta")]);
        let ranked = execute(&query::parse("NOT alpha").unwrap(), &r, 10);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].1, 0.0);
    }

    #[test]
    fn test_filename_field() {
        let r = reader(&[
            ("Standup.md", TS, "notes"),
            ("standup-2.md", TS, "notes"),
            ("other.md", TS, "notes"),
        ]);
        assert_eq!(run(&r, "filename:standup"), vec!["Standup.md"]);
        assert_eq!(run(&r, "filename:standup.md"), vec!["Standup.md"]);
        assert_eq!(run(&r, "notes AND filename:other"), vec!["other.md"]);
    }

    #[test]
    fn test_ties_break_on_modified_then_name() {
        let r = reader(&[
            ("b.md", "20240101120000", "friday"),
            ("a.md", "20240101120000", "friday"),
            ("c.md", "20240301120000", "friday"),
        ]);
        assert_eq!(run(&r, "friday"), vec!["c.md", "a.md", "b.md"]);
    }

    #[test]
    fn test_truncation_after_ranking() {
        let r = reader(&[
            ("a.md", TS, "note"),
            ("b.md", TS, "note note"),
            ("c.md", TS, "note note note"),
            ("d.md", TS, "note note note note"),
        ]);
        let query = query::parse("note").unwrap();
        let full = execute(&query, &r, 100);

        assert!(execute(&query, &r, 0).is_empty());
        for k in 1..=5 {
            let top = execute(&query, &r, k);
            assert_eq!(top.len(), k.min(full.len()));
            assert_eq!(top[..], full[..top.len()]);
        }
        assert_eq!(names(&r, &full)[0], "d.md");
    }

    #[test]
    fn test_unknown_term_matches_nothing() {
        let r = reader(&[("a.md", TS, "alpha")]);
        assert!(run(&r, "missing").is_empty());
        assert!(run(&r, "\"alpha missing\"").is_empty());
    }

    fn notes(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            fs::write(dir.path().join(name), content).unwrap();
        }
        dir
    }

    fn friday_notes() -> TempDir {
        notes(&[
            ("a.md", "the quarterly report is due Friday"),
            ("b.md", "Friday standup notes"),
        ])
    }

    #[test]
    fn test_end_to_end_friday() {
        let notes = friday_notes();
        let index_dir = TempDir::new().unwrap();
        assert_eq!(index(notes.path(), index_dir.path()).unwrap(), 2);

        let mut hits: Vec<String> = search("Friday", index_dir.path(), 20)
            .unwrap()
            .into_iter()
            .map(|h| h.file_name)
            .collect();
        hits.sort();
        assert_eq!(hits, vec!["a.md", "b.md"]);

        let phrase = search("\"quarterly report\"", index_dir.path(), 20).unwrap();
        assert_eq!(phrase.len(), 1);
        assert_eq!(phrase[0].file_name, "a.md");
        assert!(phrase[0].score > 0.0);
        assert_eq!(phrase[0].excerpt, "the **quarterly report** is due Friday");
        assert_eq!(phrase[0].line_number, Some(1));
    }

    #[test]
    fn test_rebuild_is_deterministic() {
        let notes = notes(&[
            ("a.md", "alpha beta gamma\nalpha again"),
            ("b.md", "beta only"),
            ("c.md", "gamma alpha"),
            ("d.md", "unrelated"),
        ]);
        let index_dir = TempDir::new().unwrap();

        let summary = |hits: Vec<SearchHit>| -> Vec<(String, String)> {
            hits.into_iter().map(|h| (h.file_name, h.excerpt)).collect()
        };

        index(notes.path(), index_dir.path()).unwrap();
        let first = summary(search("alpha OR beta", index_dir.path(), 20).unwrap());
        index(notes.path(), index_dir.path()).unwrap();
        let second = summary(search("alpha OR beta", index_dir.path(), 20).unwrap());

        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
    }

    #[test]
    fn test_deleted_note_keeps_hit() {
        let notes = friday_notes();
        let index_dir = TempDir::new().unwrap();
        index(notes.path(), index_dir.path()).unwrap();
        fs::remove_file(notes.path().join("b.md")).unwrap();

        let hits = search("standup", index_dir.path(), 20).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].file_name, "b.md");
        assert!(hits[0].excerpt.is_empty());
        assert_eq!(hits[0].line_number, None);
    }

    #[test]
    fn test_edited_note_falls_back_to_literal_scan() {
        let notes = notes(&[("a.md", "stand here")]);
        let index_dir = TempDir::new().unwrap();
        index(notes.path(), index_dir.path()).unwrap();

        fs::write(notes.path().join("a.md"), "standing room only").unwrap();
        let hits = search("stand", index_dir.path(), 20).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].excerpt, "**stand**ing room only");
        assert_eq!(hits[0].line_number, Some(1));

        fs::write(notes.path().join("a.md"), "moved to monday").unwrap();
        let hits = search("stand", index_dir.path(), 20).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].excerpt.is_empty());
    }

    #[test]
    fn test_searcher_sees_new_commit() {
        let notes = friday_notes();
        let index_dir = TempDir::new().unwrap();
        index(notes.path(), index_dir.path()).unwrap();

        let searcher = Searcher::new(index_dir.path());
        assert_eq!(searcher.search("friday", 20).unwrap().len(), 2);
        let before = searcher.reader().unwrap();
        assert!(Arc::ptr_eq(&before, &searcher.reader().unwrap()));

        fs::write(notes.path().join("c.md"), "friday retro").unwrap();
        index(notes.path(), index_dir.path()).unwrap();

        assert_eq!(searcher.search("friday", 20).unwrap().len(), 3);
        assert_eq!(before.num_docs(), 2);
    }

    #[test]
    fn test_search_errors() {
        let index_dir = TempDir::new().unwrap();
        let missing = index_dir.path().join("missing");

        assert!(matches!(
            search("friday", &missing, 20),
            Err(JotError::IndexNotFound { .. })
        ));
        assert!(matches!(
            search("friday", index_dir.path(), 20),
            Err(JotError::IndexNotCommitted { .. })
        ));
        assert!(matches!(
            search("\"unterminated", index_dir.path(), 20),
            Err(JotError::QuerySyntax { .. })
        ));
    }

    #[test]
    fn test_long_bare_word_query() {
        let notes = friday_notes();
        let index_dir = TempDir::new().unwrap();
        index(notes.path(), index_dir.path()).unwrap();

        let mut words: Vec<String> = (0..20_000).map(|i| format!("w{}", i)).collect();
        words.push("friday".to_string());
        let hits = search(&words.join(" "), index_dir.path(), 20).unwrap();
        assert_eq!(hits.len(), 2);

        let long_and = vec!["friday"; 5_000].join(" AND ");
        assert_eq!(search(&long_and, index_dir.path(), 20).unwrap().len(), 2);
    }

    #[test]
    fn test_excerpts_follow_note_pattern() {
        let notes = notes(&[("a.txt", "friday plans")]);
        let index_dir = TempDir::new().unwrap();
        let source = FolderSource::new(notes.path(), "*.txt").unwrap();
        Indexer::new(IndexStore::new(index_dir.path()))
            .rebuild(&source)
            .unwrap();

        let hits = Searcher::new(index_dir.path()).search("friday", 20).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].excerpt.is_empty());

        let hits = Searcher::new(index_dir.path())
            .with_document_pattern("*.txt")
            .search("friday", 20)
            .unwrap();
        assert_eq!(hits[0].excerpt, "**friday** plans");
    }

    struct MemorySource {
        root: PathBuf,
    }

    impl DocumentSource for MemorySource {
        fn root(&self) -> &Path {
            &self.root
        }

        fn list_documents(&self) -> Result<Vec<crate::source::SourceDocument>> {
            Ok(Vec::new())
        }

        fn read_document(&self, file_name: &str) -> Result<String> {
            Ok(format!("{} kept in memory: standup", file_name))
        }
    }

    #[test]
    fn test_source_opener_reads_excerpts() {
        let notes = friday_notes();
        let index_dir = TempDir::new().unwrap();
        index(notes.path(), index_dir.path()).unwrap();

        let searcher = Searcher::new(index_dir.path()).with_source_opener(|root| {
            let source: Box<dyn DocumentSource> = Box::new(MemorySource {
                root: root.to_path_buf(),
            });
            Ok(source)
        });
        let hits = searcher.search("standup", 20).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].excerpt, "b.md kept in memory: **standup**");
    }

    #[test]
    fn test_custom_markers_and_length() {
        let notes = friday_notes();
        let index_dir = TempDir::new().unwrap();
        index(notes.path(), index_dir.path()).unwrap();

        let searcher = Searcher::new(index_dir.path())
            .with_highlighter(Highlighter::new("<b>", "</b>"))
            .with_excerpt_length(200);
        let hits = searcher.search("standup", 20).unwrap();
        assert_eq!(hits[0].excerpt, "Friday <b>standup</b> notes");
    }
}
