//! Persistence layer for the Jot index.
//!
//! The index lives in a directory owned exclusively by the store. The on-disk
//! format is designed for:
//!
//! - All-or-nothing visibility: nothing is searchable until a commit point
//!   names it
//! - Versioning: Format changes are detected and reported
//! - Integrity: CRC32 checksums detect corruption
//! - Snapshot reads: a reader loads one commit point completely into memory
//!
//! ## Directory Layout
//!
//! ```text
//! <index_path>/
//!   commit.jot          commit point: generation + list of live segments
//!   seg-00000001.jseg   immutable segment written by one commit
//!   write.lock          present while a writer is active
//! ```
//!
//! ## File Format
//!
//! Both file kinds share the same framing:
//!
//! ```text
//! [Header: 32 bytes]
//!   - Magic: "JCMT" or "JSEG" (4 bytes)
//!   - Version: u32 (4 bytes)
//!   - Flags: u32 (4 bytes) - compression
//!   - Count: u64 (8 bytes) - segments or documents
//!   - Reserved: 12 bytes
//!
//! [Body: variable]
//!   - bincode data, LZ4 compressed when flagged
//!
//! [Footer: 8 bytes]
//!   - CRC32 checksum of the body: u32
//!   - Magic: "TOJJ" (4 bytes)
//! ```

use crate::analyzer::Token;
use crate::error::{JotError, Result};
use crate::index::{IndexReader, SegmentBuilder, StoredSegment};
use crate::types::{DocumentRecord, IndexStats};
use chrono::{DateTime, Utc};
use memmap2::Mmap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Magic bytes at the start of the commit file
pub const MAGIC_COMMIT: &[u8; 4] = b"JCMT";
/// Magic bytes at the start of segment files
pub const MAGIC_SEGMENT: &[u8; 4] = b"JSEG";
/// Magic bytes at the end of every index file
pub const MAGIC_FOOTER: &[u8; 4] = b"TOJJ";
/// Current index format version
pub const INDEX_VERSION: u32 = 1;

/// Name of the commit point file
pub const COMMIT_FILE: &str = "commit.jot";
/// Name of the writer lock file
pub const LOCK_FILE: &str = "write.lock";

const COMMIT_TEMP_FILE: &str = "commit.jot.tmp";
const SEGMENT_EXTENSION: &str = "jseg";
const HEADER_LEN: usize = 32;
const FOOTER_LEN: usize = 8;

/// Flags for index file format
#[derive(Debug, Clone, Copy)]
pub struct IndexFlags(u32);

impl IndexFlags {
    /// No compression
    pub const NONE: Self = IndexFlags(0);
    /// LZ4 compression
    pub const COMPRESSED_LZ4: Self = IndexFlags(1);

    fn is_compressed(&self) -> bool {
        self.0 & 1 != 0
    }
}

/// Header shared by commit and segment files
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileHeader {
    magic: [u8; 4],
    version: u32,
    flags: u32,
    count: u64,
    reserved: [u8; 12],
}

impl FileHeader {
    fn new(magic: &[u8; 4], count: u64, flags: IndexFlags) -> Self {
        FileHeader {
            magic: *magic,
            version: INDEX_VERSION,
            flags: flags.0,
            count,
            reserved: [0; 12],
        }
    }

    fn validate(&self, expected_magic: &[u8; 4]) -> Result<()> {
        if self.magic != *expected_magic {
            return Err(JotError::corrupted("Invalid magic bytes in header"));
        }
        if self.version != INDEX_VERSION {
            return Err(JotError::IndexVersionMismatch {
                found: self.version,
                expected: INDEX_VERSION,
            });
        }
        Ok(())
    }
}

/// A segment referenced by a commit point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentMeta {
    /// File name inside the index directory
    pub file: String,

    /// Number of documents stored in the segment
    pub doc_count: u64,

    /// Folder the segment's documents were read from
    pub root: PathBuf,
}

/// The set of segments visible to readers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitPoint {
    /// Increments on every commit, across rebuilds
    pub generation: u64,

    /// When this commit was written
    pub committed_at: DateTime<Utc>,

    /// Live segments in commit order
    pub segments: Vec<SegmentMeta>,
}

impl CommitPoint {
    /// Total documents across live segments
    pub fn doc_count(&self) -> u64 {
        self.segments.iter().map(|s| s.doc_count).sum()
    }
}

/// Exclusive writer lock, released when dropped.
#[derive(Debug)]
struct WriteLock {
    path: PathBuf,
}

impl WriteLock {
    fn acquire(dir: &Path) -> Result<Self> {
        let path = dir.join(LOCK_FILE);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let _ = writeln!(file, "{}", std::process::id());
                Ok(WriteLock { path })
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(JotError::IndexLocked { path })
            }
            Err(e) => Err(JotError::storage("acquire write lock", path, e)),
        }
    }
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// State of an active write pass
struct WriteSession {
    _lock: WriteLock,
    builder: SegmentBuilder,
    /// Segments carried over from the prior commit (empty after a rebuild)
    carried: Vec<SegmentMeta>,
    next_generation: u64,
}

/// Manages an on-disk index directory.
///
/// ## Example
///
/// ```rust,ignore
/// use jot_core::IndexStore;
///
/// let mut store = IndexStore::open_or_create("./index")?;
/// store.begin_rebuild()?;
/// store.add_document(record, &tokens)?;
/// store.commit()?;
///
/// let reader = store.open_reader()?;
/// ```
pub struct IndexStore {
    /// Directory holding all index files
    dir: PathBuf,

    /// Whether to compress segment bodies
    use_compression: bool,

    /// Folder recorded for segments written by this store
    document_root: PathBuf,

    /// Pending writes, if a write pass is active
    session: Option<WriteSession>,
}

impl IndexStore {
    /// Create a handle for the given directory without touching the disk.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        IndexStore {
            dir: dir.as_ref().to_path_buf(),
            use_compression: true,
            document_root: PathBuf::new(),
            session: None,
        }
    }

    /// Open an existing index directory, creating an empty one if missing.
    ///
    /// Fails if the path is not a directory, or if it holds a commit point
    /// that is corrupt or of another format version.
    pub fn open_or_create(dir: impl AsRef<Path>) -> Result<Self> {
        let store = Self::new(dir);

        if store.dir.exists() && !store.dir.is_dir() {
            return Err(JotError::storage(
                "open index",
                &store.dir,
                io::Error::new(io::ErrorKind::Other, "path is not a directory"),
            ));
        }

        fs::create_dir_all(&store.dir)
            .map_err(|e| JotError::storage("create index directory", &store.dir, e))?;

        if let Some(commit) = store.read_commit()? {
            debug!(
                path = %store.dir.display(),
                generation = commit.generation,
                documents = commit.doc_count(),
                "Opened existing index"
            );
        }

        Ok(store)
    }

    /// Set whether to use compression when writing segments.
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.use_compression = compress;
        self
    }

    /// Set the document folder recorded with segments written from now on.
    pub fn set_document_root(&mut self, root: impl AsRef<Path>) {
        self.document_root = root.as_ref().to_path_buf();
    }

    /// The index directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn commit_path(&self) -> PathBuf {
        self.dir.join(COMMIT_FILE)
    }

    fn tombstone_path(&self) -> Result<PathBuf> {
        let name = self.dir.file_name().ok_or_else(|| {
            JotError::storage(
                "locate index directory",
                &self.dir,
                io::Error::new(io::ErrorKind::InvalidInput, "index path has no final component"),
            )
        })?;
        let mut tombstone = name.to_os_string();
        tombstone.push(format!(".old-{}", std::process::id()));
        Ok(self.dir.with_file_name(tombstone))
    }

    /// Check if a committed index exists.
    pub fn exists(&self) -> bool {
        self.commit_path().exists()
    }

    /// Number of documents waiting for the next commit
    pub fn pending_documents(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.builder.len())
    }

    /// Read the current commit point, if any.
    pub fn read_commit(&self) -> Result<Option<CommitPoint>> {
        let path = self.commit_path();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(JotError::storage("read commit point", path, e)),
        };

        let (header, body) = unframe(&bytes, MAGIC_COMMIT)?;
        let commit: CommitPoint = bincode::deserialize(body)
            .map_err(|e| JotError::corrupted(format!("Commit deserialization failed: {}", e)))?;

        if commit.segments.len() as u64 != header.count {
            return Err(JotError::corrupted(format!(
                "Commit lists {} segments, header says {}",
                commit.segments.len(),
                header.count
            )));
        }

        Ok(Some(commit))
    }

    /// Start a write pass if none is active.
    fn session(&mut self) -> Result<&mut WriteSession> {
        let session = match self.session.take() {
            Some(session) => session,
            None => self.start_session()?,
        };
        Ok(self.session.insert(session))
    }

    fn start_session(&self) -> Result<WriteSession> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| JotError::storage("create index directory", &self.dir, e))?;
        let lock = WriteLock::acquire(&self.dir)?;
        let (carried, next_generation) = match self.read_commit()? {
            Some(commit) => (commit.segments, commit.generation + 1),
            None => (Vec::new(), 1),
        };
        Ok(WriteSession {
            _lock: lock,
            builder: SegmentBuilder::new(),
            carried,
            next_generation,
        })
    }

    /// Discard all prior content and start an empty write pass.
    ///
    /// The directory is moved aside with a single rename and recreated empty.
    /// If the rename fails, the prior index is left exactly as it was and a
    /// storage error is returned.
    #[instrument(skip(self), fields(path = %self.dir.display()))]
    pub fn begin_rebuild(&mut self) -> Result<()> {
        // Take the lock before touching the directory. A corrupt prior commit
        // must not block the rebuild that replaces it.
        let (prior_lock, next_generation) = match self.session.take() {
            Some(session) => (session._lock, session.next_generation),
            None => {
                fs::create_dir_all(&self.dir)
                    .map_err(|e| JotError::storage("create index directory", &self.dir, e))?;
                let lock = WriteLock::acquire(&self.dir)?;
                let generation = match self.read_commit() {
                    Ok(commit) => commit.map_or(1, |c| c.generation + 1),
                    Err(e) => {
                        warn!(error = %e, "Prior commit unreadable, rebuilding anyway");
                        1
                    }
                };
                (lock, generation)
            }
        };

        let tombstone = self.tombstone_path()?;
        if tombstone.exists() {
            fs::remove_dir_all(&tombstone)
                .map_err(|e| JotError::storage("remove stale index", &tombstone, e))?;
        }

        if let Err(e) = fs::rename(&self.dir, &tombstone) {
            drop(prior_lock);
            return Err(JotError::storage("move prior index aside", &self.dir, e));
        }
        // The old lock file moved with the directory; releasing it is a no-op.
        drop(prior_lock);

        let lock = match fs::create_dir_all(&self.dir)
            .map_err(|e| JotError::storage("recreate index directory", &self.dir, e))
            .and_then(|_| WriteLock::acquire(&self.dir))
        {
            Ok(lock) => lock,
            Err(e) => {
                warn!(error = %e, "Could not recreate index directory, restoring prior index");
                let _ = fs::remove_dir_all(&self.dir);
                let _ = fs::rename(&tombstone, &self.dir);
                let _ = fs::remove_file(self.dir.join(LOCK_FILE));
                return Err(e);
            }
        };

        if let Err(e) = fs::remove_dir_all(&tombstone) {
            warn!(path = %tombstone.display(), error = %e, "Failed to remove prior index");
        }

        self.session = Some(WriteSession {
            _lock: lock,
            builder: SegmentBuilder::new(),
            carried: Vec::new(),
            next_generation,
        });

        info!("Prior index cleared for rebuild");
        Ok(())
    }

    /// Buffer a document and its tokens for the next commit.
    ///
    /// Without a preceding `begin_rebuild`, the document is appended to the
    /// committed index.
    pub fn add_document(&mut self, record: DocumentRecord, tokens: &[Token]) -> Result<()> {
        let session = self.session()?;
        session.builder.add_document(record, tokens);
        Ok(())
    }

    /// Make all buffered writes durable and visible.
    ///
    /// Writes the new segment, then atomically replaces the commit point.
    /// The writer lock is released afterwards.
    #[instrument(skip(self), fields(path = %self.dir.display()))]
    pub fn commit(&mut self) -> Result<CommitPoint> {
        let use_compression = self.use_compression;
        let root = self.document_root.clone();
        let dir = self.dir.clone();
        let session = self.session()?;

        let generation = session.next_generation;
        let mut segments = session.carried.clone();

        if !session.builder.is_empty() {
            let builder = std::mem::take(&mut session.builder);
            let segment = builder.finish();
            let file = format!("seg-{:08}.{}", generation, SEGMENT_EXTENSION);
            write_segment(&dir.join(&file), &segment, use_compression)?;
            segments.push(SegmentMeta {
                file,
                doc_count: segment.documents.len() as u64,
                root,
            });
        }

        let commit = CommitPoint {
            generation,
            committed_at: Utc::now(),
            segments,
        };

        let body = bincode::serialize(&commit)?;
        let header = FileHeader::new(MAGIC_COMMIT, commit.segments.len() as u64, IndexFlags::NONE);
        let temp_path = dir.join(COMMIT_TEMP_FILE);
        write_framed(&temp_path, &header, &body)?;
        fs::rename(&temp_path, dir.join(COMMIT_FILE))
            .map_err(|e| JotError::storage("publish commit point", &dir, e))?;

        self.session = None;

        info!(
            generation,
            segments = commit.segments.len(),
            documents = commit.doc_count(),
            "Index committed"
        );

        Ok(commit)
    }

    /// Drop buffered writes and release the writer lock.
    pub fn rollback(&mut self) {
        if let Some(session) = self.session.take() {
            debug!(discarded = session.builder.len(), "Write pass rolled back");
        }
    }

    /// Load the committed state into a read-only snapshot.
    #[instrument(skip(self), fields(path = %self.dir.display()))]
    pub fn open_reader(&self) -> Result<IndexReader> {
        if !self.dir.is_dir() {
            return Err(JotError::IndexNotFound {
                path: self.dir.clone(),
            });
        }

        let commit = self.read_commit()?.ok_or_else(|| JotError::IndexNotCommitted {
            path: self.dir.clone(),
        })?;

        let segments = commit
            .segments
            .par_iter()
            .map(|meta| {
                let segment = read_segment(&self.dir.join(&meta.file))?;
                if segment.documents.len() as u64 != meta.doc_count {
                    return Err(JotError::corrupted(format!(
                        "Segment {} holds {} documents, commit expects {}",
                        meta.file,
                        segment.documents.len(),
                        meta.doc_count
                    )));
                }
                Ok((meta.root.clone(), segment))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(IndexReader::from_segments(commit.generation, segments))
    }

    /// Summarize the committed index.
    pub fn stats(&self) -> Result<IndexStats> {
        let commit = self.read_commit()?.ok_or_else(|| JotError::IndexNotCommitted {
            path: self.dir.clone(),
        })?;
        let reader = self.open_reader()?;

        Ok(IndexStats {
            documents: reader.num_docs() as u64,
            terms: reader.num_terms() as u64,
            segments: commit.segments.len() as u32,
            generation: commit.generation,
            committed_at: Some(commit.committed_at),
            version: INDEX_VERSION,
        })
    }

    /// Delete all stored index data.
    pub fn clear(&mut self) -> Result<()> {
        self.session = None;
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir)
                .map_err(|e| JotError::storage("remove index", &self.dir, e))?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for IndexStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexStore")
            .field("dir", &self.dir)
            .field("pending", &self.pending_documents())
            .finish()
    }
}

fn write_segment(path: &Path, segment: &StoredSegment, compress: bool) -> Result<()> {
    let bytes = bincode::serialize(segment)?;
    let (body, flags) = if compress {
        (lz4_flex::compress_prepend_size(&bytes), IndexFlags::COMPRESSED_LZ4)
    } else {
        (bytes, IndexFlags::NONE)
    };

    let header = FileHeader::new(MAGIC_SEGMENT, segment.documents.len() as u64, flags);
    write_framed(path, &header, &body)?;

    debug!(
        path = %path.display(),
        documents = segment.documents.len(),
        terms = segment.terms.len(),
        bytes = body.len(),
        "Segment written"
    );
    Ok(())
}

fn read_segment(path: &Path) -> Result<StoredSegment> {
    let file = File::open(path).map_err(|e| JotError::storage("open segment", path, e))?;
    let len = file
        .metadata()
        .map_err(|e| JotError::storage("stat segment", path, e))?
        .len() as usize;
    if len < HEADER_LEN + FOOTER_LEN {
        return Err(JotError::corrupted(format!(
            "Segment {} is truncated",
            path.display()
        )));
    }

    // Segments are never rewritten in place, only replaced by new files.
    let map = unsafe { Mmap::map(&file) }.map_err(|e| JotError::storage("map segment", path, e))?;

    let (header, body) = unframe(&map, MAGIC_SEGMENT)?;
    let flags = IndexFlags(header.flags);

    let decompressed;
    let bytes = if flags.is_compressed() {
        decompressed = lz4_flex::decompress_size_prepended(body)
            .map_err(|e| JotError::corrupted(format!("Decompression failed: {}", e)))?;
        decompressed.as_slice()
    } else {
        body
    };

    let segment: StoredSegment = bincode::deserialize(bytes)
        .map_err(|e| JotError::corrupted(format!("Segment deserialization failed: {}", e)))?;

    if segment.documents.len() as u64 != header.count {
        return Err(JotError::corrupted(format!(
            "Segment {} header count does not match its documents",
            path.display()
        )));
    }

    Ok(segment)
}

/// Write header, body and checksum footer, then flush to stable storage.
fn write_framed(path: &Path, header: &FileHeader, body: &[u8]) -> Result<()> {
    let file = File::create(path).map_err(|e| JotError::storage("create index file", path, e))?;
    let mut writer = BufWriter::new(file);

    let header_bytes = bincode::serialize(header)?;
    writer.write_all(&header_bytes)?;
    writer.write_all(body)?;

    let checksum = crc32fast::hash(body);
    writer.write_all(&checksum.to_le_bytes())?;
    writer.write_all(MAGIC_FOOTER)?;
    writer.flush()?;

    writer
        .get_ref()
        .sync_all()
        .map_err(|e| JotError::storage("sync index file", path, e))?;
    Ok(())
}

/// Validate framing and return the header with the body slice.
fn unframe<'a>(bytes: &'a [u8], expected_magic: &[u8; 4]) -> Result<(FileHeader, &'a [u8])> {
    if bytes.len() < HEADER_LEN + FOOTER_LEN {
        return Err(JotError::corrupted("Index file is truncated"));
    }

    let header: FileHeader = bincode::deserialize(&bytes[..HEADER_LEN])
        .map_err(|e| JotError::corrupted(format!("Header deserialization failed: {}", e)))?;
    header.validate(expected_magic)?;

    let footer = &bytes[bytes.len() - FOOTER_LEN..];
    if &footer[4..8] != MAGIC_FOOTER {
        return Err(JotError::corrupted("Invalid footer magic bytes"));
    }

    let body = &bytes[HEADER_LEN..bytes.len() - FOOTER_LEN];
    let stored_checksum = u32::from_le_bytes([footer[0], footer[1], footer[2], footer[3]]);
    let computed_checksum = crc32fast::hash(body);
    if stored_checksum != computed_checksum {
        return Err(JotError::corrupted(format!(
            "Checksum mismatch: expected {:08x}, got {:08x}",
            stored_checksum, computed_checksum
        )));
    }

    Ok((header, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::tokenize;
    use crate::types::Timestamp;
    use tempfile::TempDir;

    fn record(name: &str) -> DocumentRecord {
        let ts = Timestamp::parse("20240301093000").unwrap();
        DocumentRecord::new(name, ts.clone(), ts)
    }

    fn build(store: &mut IndexStore, docs: &[(&str, &str)]) {
        store.begin_rebuild().unwrap();
        for (name, content) in docs {
            store.add_document(record(name), &tokenize(content)).unwrap();
        }
        store.commit().unwrap();
    }

    #[test]
    fn test_commit_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = IndexStore::open_or_create(temp_dir.path().join("index")).unwrap();

        build(&mut store, &[("a.md", "friday report"), ("b.md", "friday standup")]);
        assert!(store.exists());

        let reader = store.open_reader().unwrap();
        assert_eq!(reader.num_docs(), 2);
        assert_eq!(reader.doc_frequency("friday"), 2);
        assert_eq!(reader.generation(), 1);
    }

    #[test]
    fn test_uncompressed_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = IndexStore::open_or_create(temp_dir.path().join("index"))
            .unwrap()
            .with_compression(false);

        build(&mut store, &[("a.md", "plain body")]);
        let reader = store.open_reader().unwrap();
        assert_eq!(reader.doc_frequency("plain"), 1);
    }

    #[test]
    fn test_uncommitted_is_not_readable() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = IndexStore::open_or_create(temp_dir.path().join("index")).unwrap();

        store.begin_rebuild().unwrap();
        store.add_document(record("a.md"), &tokenize("draft")).unwrap();

        let result = store.open_reader();
        assert!(matches!(result, Err(JotError::IndexNotCommitted { .. })));
    }

    #[test]
    fn test_missing_index() {
        let temp_dir = TempDir::new().unwrap();
        let store = IndexStore::new(temp_dir.path().join("nowhere"));

        let result = store.open_reader();
        assert!(matches!(result, Err(JotError::IndexNotFound { .. })));
        assert!(!store.exists());
    }

    #[test]
    fn test_empty_commit_is_searchable() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = IndexStore::open_or_create(temp_dir.path().join("index")).unwrap();

        build(&mut store, &[]);
        let reader = store.open_reader().unwrap();
        assert_eq!(reader.num_docs(), 0);
    }

    #[test]
    fn test_append_adds_segment() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = IndexStore::open_or_create(temp_dir.path().join("index")).unwrap();

        build(&mut store, &[("a.md", "first")]);
        store.add_document(record("b.md"), &tokenize("second")).unwrap();
        let commit = store.commit().unwrap();

        assert_eq!(commit.generation, 2);
        assert_eq!(commit.segments.len(), 2);

        let reader = store.open_reader().unwrap();
        assert_eq!(reader.num_docs(), 2);
        assert_eq!(reader.doc_frequency("second"), 1);
    }

    #[test]
    fn test_rebuild_replaces_content_and_keeps_generation_rising() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = IndexStore::open_or_create(temp_dir.path().join("index")).unwrap();

        build(&mut store, &[("a.md", "old content")]);
        build(&mut store, &[("b.md", "new content")]);

        let reader = store.open_reader().unwrap();
        assert_eq!(reader.num_docs(), 1);
        assert_eq!(reader.doc_frequency("old"), 0);
        assert_eq!(reader.doc_frequency("new"), 1);
        assert_eq!(reader.generation(), 2);
    }

    #[test]
    fn test_reader_keeps_snapshot_across_rebuild() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = IndexStore::open_or_create(temp_dir.path().join("index")).unwrap();

        build(&mut store, &[("a.md", "alpha")]);
        let before = store.open_reader().unwrap();

        build(&mut store, &[("b.md", "beta"), ("c.md", "gamma")]);

        assert_eq!(before.num_docs(), 1);
        assert_eq!(before.doc_frequency("alpha"), 1);
        assert_eq!(store.open_reader().unwrap().num_docs(), 2);
    }

    #[test]
    fn test_locked_index_rejects_rebuild() {
        let temp_dir = TempDir::new().unwrap();
        let index_dir = temp_dir.path().join("index");
        let mut store = IndexStore::open_or_create(&index_dir).unwrap();
        build(&mut store, &[("a.md", "keep me")]);

        // Another writer holds the lock.
        fs::write(index_dir.join(LOCK_FILE), b"4242").unwrap();

        let mut other = IndexStore::open_or_create(&index_dir).unwrap();
        let err = other.begin_rebuild().unwrap_err();
        assert!(matches!(err, JotError::IndexLocked { .. }));
        assert!(err.is_storage_error());

        let reader = other.open_reader().unwrap();
        assert_eq!(reader.doc_frequency("keep"), 1);
        assert!(index_dir.join(LOCK_FILE).exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_undeletable_index_survives_rebuild() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let parent = temp_dir.path().join("locked");
        fs::create_dir(&parent).unwrap();
        let index_dir = parent.join("index");

        let mut store = IndexStore::open_or_create(&index_dir).unwrap();
        build(&mut store, &[("a.md", "survivor")]);

        fs::set_permissions(&parent, fs::Permissions::from_mode(0o555)).unwrap();

        // Privileged users ignore directory permissions.
        let scratch = parent.join("scratch");
        if fs::write(&scratch, b"").is_ok() {
            let _ = fs::remove_file(&scratch);
            fs::set_permissions(&parent, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let result = store.begin_rebuild();
        fs::set_permissions(&parent, fs::Permissions::from_mode(0o755)).unwrap();

        let err = result.unwrap_err();
        assert!(err.is_storage_error());
        assert!(!index_dir.join(LOCK_FILE).exists());

        let reader = store.open_reader().unwrap();
        assert_eq!(reader.doc_frequency("survivor"), 1);
    }

    #[test]
    fn test_unremovable_tombstone_keeps_prior_index() {
        let temp_dir = TempDir::new().unwrap();
        let index_dir = temp_dir.path().join("index");
        let mut store = IndexStore::open_or_create(&index_dir).unwrap();
        build(&mut store, &[("a.md", "survivor")]);

        // A file where the stale tombstone directory should be cannot be
        // removed as a directory, whatever the user's privileges.
        let tombstone = temp_dir
            .path()
            .join(format!("index.old-{}", std::process::id()));
        fs::write(&tombstone, b"in the way").unwrap();

        let err = store.begin_rebuild().unwrap_err();
        assert!(err.is_storage_error());
        assert!(!index_dir.join(LOCK_FILE).exists());
        assert!(tombstone.is_file());

        let reader = store.open_reader().unwrap();
        assert_eq!(reader.doc_frequency("survivor"), 1);

        fs::remove_file(&tombstone).unwrap();
        build(&mut store, &[("b.md", "replacement")]);
        let reader = store.open_reader().unwrap();
        assert_eq!(reader.doc_frequency("survivor"), 0);
        assert_eq!(reader.doc_frequency("replacement"), 1);
    }

    #[test]
    fn test_corrupted_commit() {
        let temp_dir = TempDir::new().unwrap();
        let index_dir = temp_dir.path().join("index");
        fs::create_dir_all(&index_dir).unwrap();
        fs::write(index_dir.join(COMMIT_FILE), b"not a valid index file").unwrap();

        let result = IndexStore::open_or_create(&index_dir);
        assert!(matches!(result, Err(JotError::IndexCorrupted { .. })));
    }

    #[test]
    fn test_flipped_segment_byte_is_detected() {
        let temp_dir = TempDir::new().unwrap();
        let index_dir = temp_dir.path().join("index");
        let mut store = IndexStore::open_or_create(&index_dir).unwrap();
        build(&mut store, &[("a.md", "checksum guarded text")]);

        let segment_path = index_dir.join("seg-00000001.jseg");
        let mut bytes = fs::read(&segment_path).unwrap();
        bytes[HEADER_LEN + 2] ^= 0xff;
        fs::write(&segment_path, bytes).unwrap();

        let result = store.open_reader();
        assert!(matches!(result, Err(JotError::IndexCorrupted { .. })));
    }

    #[test]
    fn test_version_mismatch() {
        let temp_dir = TempDir::new().unwrap();
        let index_dir = temp_dir.path().join("index");
        fs::create_dir_all(&index_dir).unwrap();

        let mut header = FileHeader::new(MAGIC_COMMIT, 0, IndexFlags::NONE);
        header.version = INDEX_VERSION + 1;
        write_framed(&index_dir.join(COMMIT_FILE), &header, b"").unwrap();

        let result = IndexStore::open_or_create(&index_dir);
        assert!(matches!(
            result,
            Err(JotError::IndexVersionMismatch { found, .. }) if found == INDEX_VERSION + 1
        ));
    }

    #[test]
    fn test_path_is_a_file() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("index");
        fs::write(&file_path, b"").unwrap();

        let err = IndexStore::open_or_create(&file_path).unwrap_err();
        assert!(matches!(err, JotError::Storage { .. }));
    }

    #[test]
    fn test_stats_and_clear() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = IndexStore::open_or_create(temp_dir.path().join("index")).unwrap();
        build(&mut store, &[("a.md", "one two"), ("b.md", "two three")]);

        let stats = store.stats().unwrap();
        assert_eq!(stats.documents, 2);
        assert_eq!(stats.terms, 3);
        assert_eq!(stats.segments, 1);
        assert_eq!(stats.version, INDEX_VERSION);

        store.clear().unwrap();
        assert!(!store.exists());
        assert!(!store.dir().exists());
    }

    #[test]
    fn test_header_is_fixed_width() {
        let header = FileHeader::new(MAGIC_SEGMENT, 7, IndexFlags::COMPRESSED_LZ4);
        assert_eq!(bincode::serialize(&header).unwrap().len(), HEADER_LEN);
    }
}
