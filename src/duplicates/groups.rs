//! Duplicate report value types.
//!
//! # Overview
//!
//! A [`DuplicateReport`] is what a scan hands back to its caller: the
//! duplicate groups found, ordered by descending size and then digest, plus
//! [`ScanStats`] describing how the scan went. Files that could not be
//! fingerprinted are listed in [`ScanStats::errors`] rather than silently
//! disappearing.
//!
//! # Example
//!
//! ```
//! use dupecache::duplicates::DuplicateGroup;
//! use std::path::PathBuf;
//!
//! let group = DuplicateGroup::new(
//!     1024,
//!     "00ff".to_string(),
//!     vec![PathBuf::from("/a.bin"), PathBuf::from("/b.bin"), PathBuf::from("/c.bin")],
//! );
//!
//! assert_eq!(group.duplicate_count(), 2);
//! assert_eq!(group.wasted_space(), 2048);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A set of files sharing one `(size, digest)` fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    /// File size in bytes (shared by all files)
    pub size: u64,
    /// Hex-encoded content digest
    pub digest: String,
    /// Paths in this group, sorted
    pub paths: Vec<PathBuf>,
}

impl DuplicateGroup {
    /// Create a new duplicate group.
    #[must_use]
    pub fn new(size: u64, digest: String, paths: Vec<PathBuf>) -> Self {
        Self {
            size,
            digest,
            paths,
        }
    }

    /// Number of files in this group.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Check if this group is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Whether the group holds at least two files.
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        self.paths.len() > 1
    }

    /// Total size of all files in this group.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.size * self.paths.len() as u64
    }

    /// Total wasted space (all copies minus one).
    #[must_use]
    pub fn wasted_space(&self) -> u64 {
        self.size * self.duplicate_count() as u64
    }

    /// Number of duplicate copies (total - 1 original).
    #[must_use]
    pub fn duplicate_count(&self) -> usize {
        self.paths.len().saturating_sub(1)
    }
}

/// A file that could not be fingerprinted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanFailure {
    /// Path of the file
    pub path: PathBuf,
    /// Why it failed
    pub reason: String,
}

impl ScanFailure {
    /// Create a failure entry.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Statistics for one scan pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    /// Regular-file paths accepted from the walk (after dedup and exclusion)
    pub files_found: usize,
    /// Files that produced a fingerprint
    pub files_scanned: usize,
    /// Files excluded (not a regular file, below threshold, excluded output)
    pub files_skipped: usize,
    /// Files whose content was read and hashed
    pub files_hashed: usize,
    /// Files whose digest came from the cache
    pub cache_hits: usize,
    /// Bytes read by the hasher
    pub bytes_hashed: u64,
    /// Per-file failures, sorted by path
    pub errors: Vec<ScanFailure>,
    /// Non-fatal problems such as cache write failures
    pub warnings: Vec<String>,
    /// Whether the scan was interrupted
    pub interrupted: bool,
    /// Wall-clock duration of the pass
    pub duration: Duration,
}

impl ScanStats {
    /// Percentage of fingerprinted files served from the cache.
    #[must_use]
    pub fn cache_hit_rate(&self) -> f64 {
        if self.files_scanned == 0 {
            0.0
        } else {
            (self.cache_hits as f64 / self.files_scanned as f64) * 100.0
        }
    }

    /// Whether any file failed.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Result of a scan: ordered duplicate groups plus statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateReport {
    /// Groups with two or more files, by descending size then digest
    pub groups: Vec<DuplicateGroup>,
    /// Scan statistics
    pub stats: ScanStats,
}

impl DuplicateReport {
    /// Create a report.
    #[must_use]
    pub fn new(groups: Vec<DuplicateGroup>, stats: ScanStats) -> Self {
        Self { groups, stats }
    }

    /// Whether any duplicates were found.
    #[must_use]
    pub fn has_duplicates(&self) -> bool {
        !self.groups.is_empty()
    }

    /// Total number of duplicate files (excluding one original per group).
    #[must_use]
    pub fn duplicate_files(&self) -> usize {
        self.groups.iter().map(DuplicateGroup::duplicate_count).sum()
    }

    /// Total space that removing every duplicate would reclaim.
    #[must_use]
    pub fn wasted_space(&self) -> u64 {
        self.groups.iter().map(DuplicateGroup::wasted_space).sum()
    }

    /// Copy of this report keeping only the first `limit` groups.
    #[must_use]
    pub fn truncated(&self, limit: usize) -> Self {
        Self {
            groups: self.groups.iter().take(limit).cloned().collect(),
            stats: self.stats.clone(),
        }
    }

    /// Group containing `path`, if any.
    #[must_use]
    pub fn group_of(&self, path: &std::path::Path) -> Option<&DuplicateGroup> {
        self.groups
            .iter()
            .find(|g| g.paths.iter().any(|p| p == path))
    }
}
