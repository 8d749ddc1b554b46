//! Error types for Jot core operations.
//!
//! This module defines well-structured error types using `thiserror` for
//! library-level errors, while the CLI uses `anyhow` for convenient error
//! handling.
//!
//! Errors fall into three families that callers treat differently:
//!
//! - **Storage errors**: the index directory is missing, locked, corrupt or
//!   unwritable. The current operation aborts.
//! - **Query syntax errors**: the query string is malformed. The search aborts
//!   before touching the index.
//! - **Document access errors**: a note referenced by the index can no longer
//!   be read. Searches recover from these per hit.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using JotError
pub type Result<T> = std::result::Result<T, JotError>;

/// Core error types for Jot operations.
#[derive(Error, Debug)]
pub enum JotError {
    // === Index Errors ===
    /// No index exists at the configured location
    #[error("index not found at {path}")]
    IndexNotFound { path: PathBuf },

    /// The index directory exists but holds no committed snapshot
    #[error("index at {path} has no committed data")]
    IndexNotCommitted { path: PathBuf },

    /// The index files exist but are corrupted or unreadable
    #[error("index is corrupted: {reason}")]
    IndexCorrupted { reason: String },

    /// The index format version doesn't match the current version
    #[error("index version mismatch: found {found}, expected {expected}")]
    IndexVersionMismatch { found: u32, expected: u32 },

    /// Another writer holds the index lock
    #[error("index is locked by another writer: {path}")]
    IndexLocked { path: PathBuf },

    /// A filesystem operation on the index directory failed
    #[error("storage error: {operation} failed for {path}: {source}")]
    Storage {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // === Query Errors ===
    /// Malformed query string (unbalanced quotes, dangling operators)
    #[error("invalid query {query:?} at position {position}: {reason}")]
    QuerySyntax {
        query: String,
        position: usize,
        reason: String,
    },

    // === Document Errors ===
    /// A source document can no longer be read
    #[error("cannot read document {file_name}: {source}")]
    DocumentAccess {
        file_name: String,
        #[source]
        source: std::io::Error,
    },

    // === Caller Errors ===
    /// An argument was rejected before reaching the engine
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // === Configuration Errors ===
    /// Configuration file parsing failed
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    // === I/O Errors ===
    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Serialization Errors ===
    /// Serialization/deserialization failed
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl JotError {
    /// Returns true if this error belongs to the storage family.
    pub fn is_storage_error(&self) -> bool {
        matches!(
            self,
            JotError::IndexNotFound { .. }
                | JotError::IndexNotCommitted { .. }
                | JotError::IndexCorrupted { .. }
                | JotError::IndexVersionMismatch { .. }
                | JotError::IndexLocked { .. }
                | JotError::Storage { .. }
                | JotError::Io(_)
                | JotError::Serialization(_)
        )
    }

    /// Returns true if running `jot index` again would resolve this error
    pub fn requires_reindex(&self) -> bool {
        matches!(
            self,
            JotError::IndexNotFound { .. }
                | JotError::IndexNotCommitted { .. }
                | JotError::IndexCorrupted { .. }
                | JotError::IndexVersionMismatch { .. }
        )
    }

    /// Create a storage error for a failed filesystem operation
    pub fn storage(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        JotError::Storage {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Create a query syntax error
    pub fn query_syntax(query: &str, position: usize, reason: impl Into<String>) -> Self {
        JotError::QuerySyntax {
            query: query.to_string(),
            position,
            reason: reason.into(),
        }
    }

    /// Create a corruption error
    pub fn corrupted(reason: impl Into<String>) -> Self {
        JotError::IndexCorrupted {
            reason: reason.into(),
        }
    }
}

impl From<bincode::Error> for JotError {
    fn from(err: bincode::Error) -> Self {
        JotError::Serialization(err.to_string())
    }
}
