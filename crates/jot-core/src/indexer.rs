//! Indexing orchestration.
//!
//! The `Indexer` pulls documents from a `DocumentSource`, runs them through
//! the analyzer and writes them to an `IndexStore` in one commit.

use crate::analyzer::{tokenize, Token};
use crate::error::Result;
use crate::persistence::IndexStore;
use crate::source::{DocumentSource, FolderSource};
use crate::types::DocumentRecord;
use rayon::prelude::*;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument};

/// Documents between two progress reports
const PROGRESS_INTERVAL: usize = 100;

/// Progress reporting for indexing passes
pub trait IndexProgress: Send + Sync {
    /// Called periodically with the number of documents written so far
    fn on_progress(&self, indexed: usize, total: usize);

    /// Called once the pass is committed
    fn on_complete(&self, total: usize);
}

/// A progress reporter that logs to tracing
pub struct LoggingProgress {
    root: String,
}

impl LoggingProgress {
    pub fn new(root: impl Into<String>) -> Self {
        LoggingProgress { root: root.into() }
    }
}

impl IndexProgress for LoggingProgress {
    fn on_progress(&self, indexed: usize, total: usize) {
        tracing::debug!(root = %self.root, indexed, total, "Indexing progress");
    }

    fn on_complete(&self, total: usize) {
        tracing::info!(root = %self.root, total, "Indexing complete");
    }
}

/// Writes documents from a source into an index store.
pub struct Indexer {
    store: IndexStore,
    progress: Option<Arc<dyn IndexProgress>>,
}

impl Indexer {
    /// Create an indexer writing to `store`
    pub fn new(store: IndexStore) -> Self {
        Indexer {
            store,
            progress: None,
        }
    }

    /// Report progress to `progress`
    pub fn with_progress(mut self, progress: Arc<dyn IndexProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// The underlying store
    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    /// Replace the whole index with the documents of `source`.
    ///
    /// The source is listed before the prior index is touched, so a missing
    /// or unreadable notes folder leaves the old index in place. Returns the
    /// number of documents indexed.
    #[instrument(skip_all, fields(root = %source.root().display()))]
    pub fn rebuild(&mut self, source: &dyn DocumentSource) -> Result<usize> {
        let analyzed = analyze(source)?;
        self.store.set_document_root(source.root());
        self.store.begin_rebuild()?;
        self.write(analyzed)
    }

    /// Add the documents of `source` to the index without clearing it.
    ///
    /// Documents indexed earlier are not replaced; a note indexed twice is
    /// returned twice by searches.
    #[instrument(skip_all, fields(root = %source.root().display()))]
    pub fn append(&mut self, source: &dyn DocumentSource) -> Result<usize> {
        let analyzed = analyze(source)?;
        self.store.set_document_root(source.root());
        self.write(analyzed)
    }

    fn write(&mut self, analyzed: Vec<(DocumentRecord, Vec<Token>)>) -> Result<usize> {
        let total = analyzed.len();

        for (written, (record, tokens)) in analyzed.into_iter().enumerate() {
            if let Err(e) = self.store.add_document(record, &tokens) {
                self.store.rollback();
                return Err(e);
            }
            if let Some(progress) = &self.progress {
                if (written + 1) % PROGRESS_INTERVAL == 0 {
                    progress.on_progress(written + 1, total);
                }
            }
        }

        if let Err(e) = self.store.commit() {
            self.store.rollback();
            return Err(e);
        }

        if let Some(progress) = &self.progress {
            progress.on_complete(total);
        }
        info!(documents = total, "Documents indexed");
        Ok(total)
    }
}

/// List and tokenize every document, keeping source order.
fn analyze(source: &dyn DocumentSource) -> Result<Vec<(DocumentRecord, Vec<Token>)>> {
    let documents = source.list_documents()?;
    Ok(documents
        .into_par_iter()
        .map(|doc| {
            let tokens = tokenize(&doc.content);
            (DocumentRecord::new(doc.file_name, doc.created, doc.modified), tokens)
        })
        .collect())
}

/// Rebuild the index at `index_path` from the Markdown notes in `root_path`.
pub fn index(root_path: impl AsRef<Path>, index_path: impl AsRef<Path>) -> Result<usize> {
    let source = FolderSource::markdown(root_path)?;
    Indexer::new(IndexStore::new(index_path)).rebuild(&source)
}
