//! # Jot Core Library
//!
//! Indexing and full-text search over a folder of personal notes. The CLI
//! in `jot-cli` is a thin layer over this crate.
//!
//! ## Architecture
//!
//! - **Analyzer** (`analyzer`): Text to normalized tokens, shared by indexing and querying
//! - **Types** (`types`): Document records, postings, hits and timestamps
//! - **Index** (`index`): Segment builder and the read-only snapshot
//! - **Persistence** (`persistence`): On-disk segments, commit points and rebuilds
//! - **Source** (`source`): Where documents come from
//! - **Indexer** (`indexer`): Source to analyzer to store
//! - **Query** (`query`): Query string to boolean AST
//! - **Search** (`search`): Execution, ranking and hit assembly
//! - **Highlight** (`highlight`): Excerpts with marked matches
//! - **Config** (`config`): Configuration management
//!
//! ## Example
//!
//! ```rust,ignore
//! use jot_core::{index, search};
//!
//! let count = index("./notes", "./index")?;
//! for hit in search("\"quarterly report\" AND friday", "./index", 20)? {
//!     println!("{} {}", hit.file_name, hit.excerpt);
//! }
//! ```

pub mod analyzer;
pub mod config;
pub mod error;
pub mod highlight;
pub mod index;
pub mod indexer;
pub mod persistence;
pub mod query;
pub mod search;
pub mod source;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{JotError, Result};
pub use highlight::Highlighter;
pub use index::IndexReader;
pub use indexer::{index, IndexProgress, Indexer, LoggingProgress};
pub use persistence::IndexStore;
pub use query::Query;
pub use search::{execute, search, Searcher};
pub use source::{DocumentSource, FolderSource, SourceDocument};
pub use types::{DocId, DocumentRecord, IndexStats, SearchHit, Timestamp};
