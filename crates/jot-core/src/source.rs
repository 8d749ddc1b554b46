//! Document sources.
//!
//! The indexer and the search highlighter only talk to documents through the
//! `DocumentSource` trait. `FolderSource` is the implementation used by the
//! CLI: a single flat directory of notes matching one glob pattern.
//!
//! ## Implementing a New Source
//!
//! A source must be able to enumerate its documents with their timestamps and
//! re-read a single document by file name. Anything beyond that (creating,
//! editing or deleting notes) happens outside the core.

use crate::error::{JotError, Result};
use crate::types::Timestamp;
use glob::{MatchOptions, Pattern};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A document as delivered by a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    /// Name unique within the source (e.g., "2024-03-01-standup.md")
    pub file_name: String,

    /// Full text
    pub content: String,

    /// Creation time
    pub created: Timestamp,

    /// Last modification time
    pub modified: Timestamp,
}

/// Abstract provider of documents to index.
pub trait DocumentSource: Send + Sync {
    /// Folder recorded in the index so documents can be re-read at search time
    fn root(&self) -> &Path;

    /// Enumerate every readable document, sorted by file name.
    ///
    /// Entries that cannot be read are logged and left out.
    fn list_documents(&self) -> Result<Vec<SourceDocument>>;

    /// Re-read one document's content.
    ///
    /// Fails with `JotError::DocumentAccess` if the document is gone or
    /// unreadable.
    fn read_document(&self, file_name: &str) -> Result<String>;
}

/// Notes stored as files directly inside one directory.
#[derive(Debug, Clone)]
pub struct FolderSource {
    root: PathBuf,
    pattern: Pattern,
}

impl FolderSource {
    /// Default pattern for note files
    pub const DEFAULT_PATTERN: &'static str = "*.md";

    /// Create a source over `root` selecting files that match `pattern`.
    ///
    /// The pattern applies to file names only; subdirectories are not
    /// visited.
    pub fn new(root: impl AsRef<Path>, pattern: &str) -> Result<Self> {
        let pattern = Pattern::new(pattern).map_err(|e| JotError::ConfigError {
            reason: format!("invalid document pattern {:?}: {}", pattern, e),
        })?;
        Ok(FolderSource {
            root: root.as_ref().to_path_buf(),
            pattern,
        })
    }

    /// Create a source for Markdown notes
    pub fn markdown(root: impl AsRef<Path>) -> Result<Self> {
        Self::new(root, Self::DEFAULT_PATTERN)
    }

    fn matches(&self, file_name: &str) -> bool {
        let options = MatchOptions {
            case_sensitive: false,
            require_literal_separator: true,
            require_literal_leading_dot: true,
        };
        self.pattern.matches_with(file_name, options)
    }

    fn resolve(&self, file_name: &str) -> Option<PathBuf> {
        let relative = Path::new(file_name);
        // Only bare names are valid; anything else would escape the folder.
        if relative.components().count() != 1 || relative.file_name().is_none() {
            return None;
        }
        Some(self.root.join(relative))
    }
}

impl DocumentSource for FolderSource {
    fn root(&self) -> &Path {
        &self.root
    }

    fn list_documents(&self) -> Result<Vec<SourceDocument>> {
        let entries = fs::read_dir(&self.root)
            .map_err(|e| JotError::storage("list documents", &self.root, e))?;

        let mut documents = Vec::new();
        for entry in entries {
            let entry = entry?;
            let file_name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(name) => {
                    warn!(name = ?name, "Skipping file with non UTF-8 name");
                    continue;
                }
            };

            if !self.matches(&file_name) {
                continue;
            }

            let metadata = match fs::metadata(entry.path()) {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!(file = %file_name, error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            if !metadata.is_file() {
                continue;
            }

            let bytes = match fs::read(entry.path()) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(file = %file_name, error = %e, "Skipping unreadable note");
                    continue;
                }
            };

            let modified = match metadata.modified() {
                Ok(modified) => modified,
                Err(e) => {
                    warn!(file = %file_name, error = %e, "Skipping note without modification time");
                    continue;
                }
            };
            // Some filesystems do not record birth time.
            let created = metadata.created().unwrap_or(modified);

            documents.push(SourceDocument {
                file_name,
                content: decode(bytes),
                created: Timestamp::from_system_time(created),
                modified: Timestamp::from_system_time(modified),
            });
        }

        documents.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        debug!(root = %self.root.display(), count = documents.len(), "Documents listed");
        Ok(documents)
    }

    fn read_document(&self, file_name: &str) -> Result<String> {
        let path = self.resolve(file_name).ok_or_else(|| JotError::DocumentAccess {
            file_name: file_name.to_string(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "not a plain file name"),
        })?;
        if !self.matches(file_name) {
            return Err(JotError::DocumentAccess {
                file_name: file_name.to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "not matched by the note pattern"),
            });
        }

        let bytes = fs::read(&path).map_err(|e| JotError::DocumentAccess {
            file_name: file_name.to_string(),
            source: e,
        })?;
        Ok(decode(bytes))
    }
}

/// Note text; invalid UTF-8 sequences become U+FFFD.
fn decode(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}
