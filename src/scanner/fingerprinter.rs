//! Cache-aware file fingerprinting.
//!
//! # Overview
//!
//! [`Fingerprinter::fingerprint`] turns a path into a [`FileFingerprint`]:
//!
//! 1. Stat the file. Missing paths and directories are [`FingerprintError::NotAFile`].
//! 2. Files smaller than the minimum size are [`FingerprintError::BelowThreshold`].
//!    For both exclusions any cached record of the path is dropped.
//! 3. If the cache holds a record with the same size and exactly the same
//!    modification time, its digest is reused without reading the file.
//! 4. Otherwise the file is hashed and the cache is updated.
//!
//! The fingerprinter never touches the duplicate index; grouping is the
//! caller's job.

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use super::hasher::{hash_to_hex, Hasher};
use super::{FileFingerprint, FingerprintError};
use crate::cache::{CacheErrorKind, FingerprintCache};

/// Default minimum file size in bytes.
pub const DEFAULT_MIN_SIZE: u64 = 512;

/// Fingerprint plus how it was obtained.
#[derive(Debug, Clone)]
pub struct FingerprintOutcome {
    /// The resulting fingerprint
    pub fingerprint: FileFingerprint,
    /// Whether the digest came from the cache
    pub cache_hit: bool,
    /// Set when the digest was computed but could not be cached
    pub store_warning: Option<String>,
}

/// Computes file fingerprints, consulting a [`FingerprintCache`] when present.
#[derive(Debug)]
pub struct Fingerprinter {
    cache: Option<Arc<FingerprintCache>>,
    hasher: Hasher,
    min_size: u64,
    hashes_computed: AtomicUsize,
    bytes_hashed: AtomicU64,
}

impl Fingerprinter {
    /// Create a fingerprinter.
    ///
    /// # Arguments
    ///
    /// * `cache` - Optional cache; without one every file is hashed
    /// * `min_size` - Files smaller than this are excluded
    #[must_use]
    pub fn new(cache: Option<Arc<FingerprintCache>>, min_size: u64) -> Self {
        Self {
            cache,
            hasher: Hasher::new(),
            min_size,
            hashes_computed: AtomicUsize::new(0),
            bytes_hashed: AtomicU64::new(0),
        }
    }

    /// Replace the content hasher.
    #[must_use]
    pub fn with_hasher(mut self, hasher: Hasher) -> Self {
        self.hasher = hasher;
        self
    }

    /// Configured minimum size.
    #[must_use]
    pub fn min_size(&self) -> u64 {
        self.min_size
    }

    /// The cache, if any.
    #[must_use]
    pub fn cache(&self) -> Option<&Arc<FingerprintCache>> {
        self.cache.as_ref()
    }

    /// Number of files whose content was actually read and hashed.
    #[must_use]
    pub fn hashes_computed(&self) -> usize {
        self.hashes_computed.load(Ordering::Relaxed)
    }

    /// Total bytes read by the hasher.
    #[must_use]
    pub fn bytes_hashed(&self) -> u64 {
        self.bytes_hashed.load(Ordering::Relaxed)
    }

    /// Fingerprint a single file.
    ///
    /// # Errors
    ///
    /// See [`FingerprintError`]. Cache failures are not errors here: a
    /// failed lookup is a miss and a failed store only loses the record.
    pub fn fingerprint(&self, path: &Path) -> Result<FileFingerprint, FingerprintError> {
        self.fingerprint_detailed(path).map(|o| o.fingerprint)
    }

    /// Fingerprint a single file and report whether the cache was used.
    ///
    /// # Errors
    ///
    /// Same as [`Fingerprinter::fingerprint`].
    pub fn fingerprint_detailed(
        &self,
        path: &Path,
    ) -> Result<FingerprintOutcome, FingerprintError> {
        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.forget(path);
                return Err(FingerprintError::NotAFile(path.to_path_buf()));
            }
            Err(source) => {
                return Err(FingerprintError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        if !metadata.is_file() {
            self.forget(path);
            return Err(FingerprintError::NotAFile(path.to_path_buf()));
        }

        let size = metadata.len();
        if size < self.min_size {
            log::trace!("Below threshold ({} bytes): {}", size, path.display());
            self.forget(path);
            return Err(FingerprintError::BelowThreshold {
                path: path.to_path_buf(),
                size,
                threshold: self.min_size,
            });
        }

        let modified = metadata.modified().map_err(|source| FingerprintError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(digest) = self.cached_digest(path, size, modified) {
            return Ok(FingerprintOutcome {
                fingerprint: FileFingerprint {
                    path: path.to_path_buf(),
                    size,
                    modified,
                    digest,
                },
                cache_hit: true,
                store_warning: None,
            });
        }

        let hash = self
            .hasher
            .full_hash(path)
            .map_err(|source| FingerprintError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        self.hashes_computed.fetch_add(1, Ordering::Relaxed);
        self.bytes_hashed.fetch_add(size, Ordering::Relaxed);
        let digest = hash_to_hex(&hash);
        log::trace!("Hashed {} ({} bytes)", path.display(), size);

        let mut store_warning = None;
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.store(path, size, modified, &digest) {
                log::warn!("Failed to update cache for {}: {}", path.display(), e);
                store_warning = Some(format!("{}: not cached ({})", path.display(), e));
            }
        }

        Ok(FingerprintOutcome {
            fingerprint: FileFingerprint {
                path: path.to_path_buf(),
                size,
                modified,
                digest,
            },
            cache_hit: false,
            store_warning,
        })
    }

    fn forget(&self, path: &Path) {
        let Some(cache) = &self.cache else {
            return;
        };
        match cache.remove(path) {
            Ok(true) => log::debug!("Dropped cache record for {}", path.display()),
            Ok(false) => {}
            Err(e) => log::warn!("Failed to drop cache record for {}: {}", path.display(), e),
        }
    }

    fn cached_digest(&self, path: &Path, size: u64, modified: SystemTime) -> Option<String> {
        let cache = self.cache.as_ref()?;
        match cache.lookup(path) {
            Ok(Some(record)) if record.is_fresh(size, modified) => {
                log::trace!("Cache hit: {}", path.display());
                Some(record.digest)
            }
            Ok(Some(_)) => {
                log::trace!("Cache stale: {}", path.display());
                None
            }
            Ok(None) => {
                log::trace!("Cache miss: {}", path.display());
                None
            }
            Err(e) if e.kind() == CacheErrorKind::CorruptRecord => {
                log::debug!("Ignoring corrupt cache record for {}: {}", path.display(), e);
                None
            }
            Err(e) => {
                log::warn!("Failed to query cache for {}: {}", path.display(), e);
                None
            }
        }
    }
}
