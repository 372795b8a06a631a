//! Fingerprint caching module.
//!
//! This module provides persistent storage for file digests so that files
//! whose modification time has not changed are never hashed twice.
//!
//! # Architecture
//!
//! * [`entry`]: The [`CacheRecord`] model and time encoding helpers.
//! * [`store`]: The [`RecordStore`] persistence contract and an in-memory backend.
//! * [`database`]: The SQLite backend.
//!
//! [`FingerprintCache`] sits on top of a store and is the only type the rest
//! of the crate talks to. It owns the store behind a single mutex, so callers
//! never lock anything themselves.
//!
//! # Cache Invalidation
//!
//! A record is trusted only when both the live size and the live
//! modification time equal the stored ones. Anything else is a miss and the
//! file is re-hashed; the new record replaces the old one.
//!
//! # Example
//!
//! ```
//! use dupecache::cache::FingerprintCache;
//! use std::path::Path;
//! use std::time::SystemTime;
//!
//! let cache = FingerprintCache::in_memory();
//! let mtime = SystemTime::now();
//! cache.store(Path::new("/data/a.bin"), 4096, mtime, "00ff").unwrap();
//!
//! let record = cache.lookup(Path::new("/data/a.bin")).unwrap().unwrap();
//! assert!(record.is_fresh(4096, mtime));
//! ```

pub mod database;
pub mod entry;
pub mod store;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

pub use database::SqliteStore;
pub use entry::CacheRecord;
pub use store::{CacheError, CacheErrorKind, CacheResult, MemoryStore, RecordStore};

use crate::scanner::path_utils::cache_key;

/// Outcome of a deletion sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Records examined
    pub checked: usize,
    /// Records removed because their file is gone
    pub removed: usize,
    /// Records whose removal failed
    pub failed: usize,
    /// Undecodable records removed
    pub corrupt: usize,
}

/// Thread-safe fingerprint cache over a [`RecordStore`].
pub struct FingerprintCache {
    store: Mutex<Box<dyn RecordStore>>,
}

impl std::fmt::Debug for FingerprintCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FingerprintCache")
            .field("store", &"<store>")
            .finish()
    }
}

impl FingerprintCache {
    /// Wrap an arbitrary store.
    #[must_use]
    pub fn with_store(store: Box<dyn RecordStore>) -> Self {
        Self {
            store: Mutex::new(store),
        }
    }

    /// Open or create an SQLite-backed cache at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(path: &Path) -> CacheResult<Self> {
        let store = SqliteStore::open(path)?;
        log::info!("Fingerprint cache: {}", path.display());
        Ok(Self::with_store(Box::new(store)))
    }

    /// Create an ephemeral in-memory cache.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::with_store(Box::new(MemoryStore::new()))
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn RecordStore>> {
        // A panic while holding the lock leaves the store itself intact.
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up the record for `path`.
    ///
    /// This never hashes anything; it is a pure read of persisted state.
    ///
    /// # Errors
    ///
    /// Returns the store's error; callers treat any error as a miss.
    pub fn lookup(&self, path: &Path) -> CacheResult<Option<CacheRecord>> {
        let key = cache_key(path);
        self.lock().get(&key)
    }

    /// Insert or replace the record for `path`.
    ///
    /// # Errors
    ///
    /// Returns the store's error. The caller decides whether it is fatal.
    pub fn store(
        &self,
        path: &Path,
        size: u64,
        mtime: SystemTime,
        digest: &str,
    ) -> CacheResult<()> {
        let key = cache_key(path);
        let record = CacheRecord::new(PathBuf::from(&key), size, mtime, digest);
        self.lock().put(&key, &record)
    }

    /// Remove the record for `path`, returning whether one existed.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    pub fn remove(&self, path: &Path) -> CacheResult<bool> {
        let key = cache_key(path);
        self.lock().delete(&key)
    }

    /// List every path that has a record.
    ///
    /// The list is a snapshot taken under the store lock; iterating it does
    /// not hold the lock. Call again to restart from fresh state.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    pub fn list_known_paths(&self) -> CacheResult<impl Iterator<Item = PathBuf>> {
        let mut paths = Vec::new();
        self.lock().scan_all(&mut |record| {
            paths.push(record.path);
            true
        })?;
        Ok(paths.into_iter())
    }

    /// Load every record.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    pub fn records(&self) -> CacheResult<Vec<CacheRecord>> {
        let mut records = Vec::new();
        self.lock().scan_all(&mut |record| {
            records.push(record);
            true
        })?;
        Ok(records)
    }

    /// Number of cached records.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    pub fn len(&self) -> CacheResult<usize> {
        self.lock().count()
    }

    /// Whether the cache holds no records.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    pub fn is_empty(&self) -> CacheResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Remove every record.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    pub fn clear(&self) -> CacheResult<()> {
        log::info!("Clearing fingerprint cache");
        self.lock().clear()
    }

    /// Remove records whose file no longer exists as a regular file, along
    /// with any records that can no longer be decoded.
    ///
    /// Paths are checked without holding the store lock, so workers can keep
    /// using the cache while a sweep runs.
    ///
    /// # Errors
    ///
    /// Fails only if the list of known paths cannot be read; individual
    /// removal failures are counted in [`SweepStats::failed`].
    pub fn sweep_deleted(&self) -> CacheResult<SweepStats> {
        let mut stats = SweepStats::default();

        match self.lock().purge_corrupt() {
            Ok(0) => {}
            Ok(n) => {
                log::warn!("Removed {} corrupt records from cache", n);
                stats.corrupt = n;
            }
            Err(e) => {
                log::warn!("Failed to purge corrupt cache records: {}", e);
                stats.failed += 1;
            }
        }

        for path in self.list_known_paths()? {
            stats.checked += 1;
            let exists = std::fs::metadata(&path).map(|m| m.is_file()).unwrap_or(false);
            if exists {
                continue;
            }

            match self.remove(&path) {
                Ok(_) => {
                    log::debug!("Removed deleted file from cache: {}", path.display());
                    stats.removed += 1;
                }
                Err(e) => {
                    log::warn!("Failed to remove {} from cache: {}", path.display(), e);
                    stats.failed += 1;
                }
            }
        }

        log::info!(
            "Cache sweep: {} records checked, {} removed, {} corrupt",
            stats.checked,
            stats.removed,
            stats.corrupt
        );
        Ok(stats)
    }
}
