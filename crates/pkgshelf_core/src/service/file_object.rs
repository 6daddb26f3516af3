//! File object: identity, lock state, checksum and content writes.
//!
//! # Responsibility
//! - Expose one file's catalog state to callers.
//! - Stream content to disk while hashing it in the same pass.
//! - Drive the lock transitions the project catalog sequences.
//!
//! # Invariants
//! - Content is staged in the project directory and renamed over the target
//!   only by `install`, so a failed or abandoned write never truncates
//!   previously stored bytes.
//! - `write` never touches the catalog. The checksum is recorded while the
//!   lock is still held, before the staged bytes are installed.
//! - Staged files are named `STAGING_PREFIX*`. A process that dies mid-upload
//!   leaves such a file behind together with a `locked = 1` row; both are for
//!   the operator to sweep while the store is stopped.

use crate::model::file::{FileId, FileRecord};
use crate::repo::catalog_repo::CatalogStore;
use crate::service::error::{StoreError, StoreResult};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use tempfile::{Builder, NamedTempFile};

/// Read/write chunk size for content streaming.
pub const STREAM_BUFFER_SIZE: usize = 64 * 1024;

/// File name prefix of uploads staged next to their target.
pub const STAGING_PREFIX: &str = ".pkgshelf-upload-";

/// Result of re-hashing stored bytes against the recorded checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Match,
    Mismatch { expected: String, actual: String },
    /// No write has completed yet.
    NoChecksum,
    /// A write is in progress; the checksum may be stale.
    Locked,
}

/// Fully streamed content waiting to be installed over its target.
///
/// Dropping it removes the staged bytes.
pub struct StagedContent {
    staged: NamedTempFile,
    checksum: String,
}

impl StagedContent {
    /// Lowercase hex SHA-256 of the staged bytes.
    pub fn checksum(&self) -> &str {
        &self.checksum
    }
}

impl fmt::Debug for StagedContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagedContent")
            .field("staged", &self.staged.path())
            .field("checksum", &self.checksum)
            .finish()
    }
}

/// Catalog view of one uploaded file.
pub struct ProjectFile<'s, S: CatalogStore> {
    store: &'s S,
    record: FileRecord,
}

impl<'s, S: CatalogStore> ProjectFile<'s, S> {
    pub(crate) fn from_record(store: &'s S, record: FileRecord) -> Self {
        Self { store, record }
    }

    pub fn id(&self) -> FileId {
        self.record.uuid
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    /// Hex SHA-256 of the last completed write.
    pub fn checksum(&self) -> Option<&str> {
        self.record.checksum.as_deref()
    }

    pub fn is_locked(&self) -> bool {
        self.record.locked
    }

    /// Location of the stored bytes.
    pub fn file_path(&self) -> &Path {
        &self.record.path
    }

    pub fn record(&self) -> &FileRecord {
        &self.record
    }

    /// Takes the write lock with a single conditional catalog update.
    ///
    /// Returns `StoreError::FileLocked` when another writer holds it.
    pub fn lock(&mut self) -> StoreResult<()> {
        if !self.store.try_lock_file(self.record.uuid)? {
            return Err(self.locked_error());
        }
        self.record.locked = true;
        Ok(())
    }

    /// Releases the lock, leaving the checksum untouched.
    pub fn unlock(&mut self) -> StoreResult<()> {
        self.store.unlock_file(self.record.uuid)?;
        self.record.locked = false;
        Ok(())
    }

    /// Streams `content` into a staged file next to the target.
    ///
    /// The caller must hold the lock. Reader errors, including cancellation
    /// surfaced by the reader, are reported as I/O failures; the target path
    /// is not touched until `install`.
    pub fn write(&mut self, mut content: impl Read) -> StoreResult<StagedContent> {
        let target = self.record.path.as_path();
        let directory = target.parent().ok_or_else(|| {
            StoreError::io(
                "resolve directory of",
                target,
                io::Error::new(io::ErrorKind::InvalidInput, "file path has no parent"),
            )
        })?;

        let mut staged = Builder::new()
            .prefix(STAGING_PREFIX)
            .tempfile_in(directory)
            .map_err(|source| StoreError::io("stage upload in", directory, source))?;
        let (_, checksum) = copy_with_digest(&mut content, &mut staged)
            .map_err(|source| StoreError::io("write", target, source))?;
        staged
            .as_file()
            .sync_all()
            .map_err(|source| StoreError::io("sync", target, source))?;

        Ok(StagedContent { staged, checksum })
    }

    /// Stores `checksum` (or clears it) while keeping the lock held.
    pub fn record_checksum(&mut self, checksum: Option<&str>) -> StoreResult<()> {
        self.store.set_file_checksum(self.record.uuid, checksum)?;
        self.record.checksum = checksum.map(str::to_string);
        Ok(())
    }

    /// Renames staged content over the stored bytes.
    pub fn install(&self, content: StagedContent) -> StoreResult<()> {
        let target = self.record.path.as_path();
        content
            .staged
            .persist(target)
            .map_err(|err| StoreError::io("move upload into", target, err.error))?;
        Ok(())
    }

    /// Records `checksum` and releases the lock in one catalog update.
    pub fn complete_write(&mut self, checksum: &str) -> StoreResult<()> {
        self.store.complete_file_write(self.record.uuid, checksum)?;
        self.record.checksum = Some(checksum.to_string());
        self.record.locked = false;
        Ok(())
    }

    /// Removes the catalog record. Stored bytes are left alone.
    pub fn delete(self) -> StoreResult<()> {
        self.store.delete_file(self.record.uuid)?;
        Ok(())
    }

    /// Reloads lock state and checksum from the catalog.
    pub fn refresh(&mut self) -> StoreResult<()> {
        self.record = self
            .store
            .get_file(self.record.uuid)?
            .ok_or_else(|| StoreError::NotFound {
                entity: "file",
                key: self.record.name.clone(),
            })?;
        Ok(())
    }

    /// Opens the stored bytes for reading.
    pub fn open(&self) -> StoreResult<File> {
        File::open(&self.record.path)
            .map_err(|source| StoreError::io("open", &self.record.path, source))
    }

    /// Re-hashes the stored bytes and compares them with the checksum.
    pub fn verify(&self) -> StoreResult<VerifyOutcome> {
        if self.record.locked {
            return Ok(VerifyOutcome::Locked);
        }
        let Some(expected) = self.record.checksum.as_deref() else {
            return Ok(VerifyOutcome::NoChecksum);
        };

        let mut stored = self.open()?;
        let (_, actual) = copy_with_digest(&mut stored, &mut io::sink())
            .map_err(|source| StoreError::io("read", &self.record.path, source))?;
        if actual == expected {
            Ok(VerifyOutcome::Match)
        } else {
            Ok(VerifyOutcome::Mismatch {
                expected: expected.to_string(),
                actual,
            })
        }
    }

    fn locked_error(&self) -> StoreError {
        let project = self
            .record
            .path
            .parent()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        StoreError::FileLocked {
            project,
            file: self.record.name.clone(),
        }
    }
}

impl<S: CatalogStore> fmt::Debug for ProjectFile<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectFile")
            .field("record", &self.record)
            .finish()
    }
}

/// Copies `reader` into `writer`, hashing the same bytes on the way.
///
/// Returns the number of bytes copied and their lowercase hex SHA-256.
pub fn copy_with_digest(
    reader: &mut impl Read,
    writer: &mut impl Write,
) -> io::Result<(u64, String)> {
    let mut buffer = vec![0u8; STREAM_BUFFER_SIZE];
    let mut hasher = Sha256::new();
    let mut total = 0u64;
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        hasher.update(&buffer[..read]);
        writer.write_all(&buffer[..read])?;
        total += read as u64;
    }
    writer.flush()?;
    Ok((total, hex::encode(hasher.finalize())))
}

#[cfg(test)]
mod tests {
    use super::{copy_with_digest, STREAM_BUFFER_SIZE};
    use std::io::{self, Cursor, Read};

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    struct FailAfter {
        remaining: usize,
    }

    impl Read for FailAfter {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.remaining == 0 {
                return Err(io::Error::new(io::ErrorKind::ConnectionAborted, "client went away"));
            }
            let n = buf.len().min(self.remaining);
            buf[..n].fill(0xAB);
            self.remaining -= n;
            Ok(n)
        }
    }

    #[test]
    fn empty_stream_hashes_to_empty_digest() {
        let mut out = Vec::new();
        let (len, digest) = copy_with_digest(&mut Cursor::new(Vec::<u8>::new()), &mut out).unwrap();
        assert_eq!(len, 0);
        assert_eq!(digest, EMPTY_SHA256);
    }

    #[test]
    fn multi_chunk_stream_is_copied_exactly() {
        let content: Vec<u8> = (0..STREAM_BUFFER_SIZE * 3 + 17)
            .map(|i| (i % 251) as u8)
            .collect();
        let mut out = Vec::new();
        let (len, _) = copy_with_digest(&mut Cursor::new(content.clone()), &mut out).unwrap();
        assert_eq!(len as usize, content.len());
        assert_eq!(out, content);
    }

    #[test]
    fn reader_failure_is_propagated() {
        let mut out = Vec::new();
        let err = copy_with_digest(&mut FailAfter { remaining: 100 }, &mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionAborted);
        assert_eq!(out.len(), 100);
    }
}
