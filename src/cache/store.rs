//! Key-value persistence contract behind the fingerprint cache.
//!
//! [`RecordStore`] is the narrow interface the cache needs from a backing
//! store: point reads, upserts, deletes and a full scan. Full scans hand each
//! record to a caller-owned visitor closure, so no global state is needed to
//! route rows back to the caller.

use std::collections::BTreeMap;

use super::entry::CacheRecord;

/// Broad classification of cache failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheErrorKind {
    /// The persistence layer could not be read or written.
    IoFailure,
    /// A stored row could not be decoded into a valid record.
    CorruptRecord,
}

/// Errors raised by the cache and its backing stores.
#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    /// The persistence layer failed.
    #[error("Cache I/O failure: {detail}")]
    IoFailure {
        /// Description of the failure
        detail: String,
    },

    /// A stored row is not a valid record.
    #[error("Corrupt cache record for {key}: {detail}")]
    CorruptRecord {
        /// Key of the offending row
        key: String,
        /// What was wrong with it
        detail: String,
    },
}

impl CacheError {
    /// Build an I/O failure from anything displayable.
    pub fn io(detail: impl std::fmt::Display) -> Self {
        Self::IoFailure {
            detail: detail.to_string(),
        }
    }

    /// Build a corrupt-record error.
    pub fn corrupt(key: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::CorruptRecord {
            key: key.into(),
            detail: detail.into(),
        }
    }

    /// The error classification.
    #[must_use]
    pub fn kind(&self) -> CacheErrorKind {
        match self {
            Self::IoFailure { .. } => CacheErrorKind::IoFailure,
            Self::CorruptRecord { .. } => CacheErrorKind::CorruptRecord,
        }
    }
}

impl From<rusqlite::Error> for CacheError {
    fn from(err: rusqlite::Error) -> Self {
        Self::io(err)
    }
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Persistence contract for cache records.
///
/// Implementations do not need to be thread-safe; the cache serializes all
/// calls through a single lock.
pub trait RecordStore: Send {
    /// Fetch the record stored under `key`.
    fn get(&mut self, key: &str) -> CacheResult<Option<CacheRecord>>;

    /// Insert or replace the record stored under `key`.
    fn put(&mut self, key: &str, record: &CacheRecord) -> CacheResult<()>;

    /// Delete the record stored under `key`, returning whether one existed.
    fn delete(&mut self, key: &str) -> CacheResult<bool>;

    /// Visit every stored record. The visitor returns `false` to stop early.
    ///
    /// Rows that cannot be decoded are skipped with a warning.
    fn scan_all(&mut self, visit: &mut dyn FnMut(CacheRecord) -> bool) -> CacheResult<()>;

    /// Delete every row that cannot be decoded, returning how many went.
    ///
    /// Stores that only ever hold typed records have nothing to purge.
    fn purge_corrupt(&mut self) -> CacheResult<usize> {
        Ok(0)
    }

    /// Remove every record.
    fn clear(&mut self) -> CacheResult<()>;

    /// Number of stored records.
    fn count(&mut self) -> CacheResult<usize>;
}

/// In-memory store, used for ephemeral runs and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: BTreeMap<String, CacheRecord>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryStore {
    fn get(&mut self, key: &str) -> CacheResult<Option<CacheRecord>> {
        Ok(self.records.get(key).cloned())
    }

    fn put(&mut self, key: &str, record: &CacheRecord) -> CacheResult<()> {
        self.records.insert(key.to_string(), record.clone());
        Ok(())
    }

    fn delete(&mut self, key: &str) -> CacheResult<bool> {
        Ok(self.records.remove(key).is_some())
    }

    fn scan_all(&mut self, visit: &mut dyn FnMut(CacheRecord) -> bool) -> CacheResult<()> {
        for record in self.records.values() {
            if !visit(record.clone()) {
                break;
            }
        }
        Ok(())
    }

    fn clear(&mut self) -> CacheResult<()> {
        self.records.clear();
        Ok(())
    }

    fn count(&mut self) -> CacheResult<usize> {
        Ok(self.records.len())
    }
}
