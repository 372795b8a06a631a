//! Scanner module for directory traversal and file fingerprinting.
//!
//! This module provides functionality for:
//! - Parallel directory walking using jwalk
//! - Content hashing with BLAKE3
//! - Cache-aware file fingerprinting
//! - Unicode path normalization
//!
//! # Architecture
//!
//! The scanner is divided into submodules:
//! - [`walker`]: Directory traversal yielding [`WalkEntry`] values
//! - [`hasher`]: BLAKE3 file hashing (streaming)
//! - [`fingerprinter`]: Size/mtime/digest computation backed by the cache
//! - [`path_utils`]: Cache key normalization
//!
//! # Example
//!
//! ```no_run
//! use dupecache::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let walker = Walker::new(Path::new("."), WalkerConfig::default());
//! for entry in walker.walk() {
//!     match entry {
//!         Ok(entry) if !entry.is_dir => println!("{}", entry.path.display()),
//!         Ok(_) => {}
//!         Err(e) => eprintln!("Warning: {}", e),
//!     }
//! }
//! ```

pub mod fingerprinter;
pub mod hasher;
pub mod path_utils;
pub mod walker;

use std::path::PathBuf;
use std::time::SystemTime;

use crate::cache::CacheError;
use crate::pool::PoolError;

// Re-export main types
pub use fingerprinter::{FingerprintOutcome, Fingerprinter, DEFAULT_MIN_SIZE};
pub use hasher::{hash_to_hex, hex_to_hash, Hash, Hasher};
pub use walker::Walker;

/// One item produced by a directory walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    /// Path as discovered
    pub path: PathBuf,
    /// Whether the entry is a directory
    pub is_dir: bool,
}

impl WalkEntry {
    /// Entry for a regular (or at least non-directory) file.
    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_dir: false,
        }
    }

    /// Entry for a directory.
    #[must_use]
    pub fn dir(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_dir: true,
        }
    }
}

/// Content identity of a single file at one point in time.
///
/// Never mutated; a changed file produces a new fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFingerprint {
    /// Path that was fingerprinted
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Modification time observed when the fingerprint was taken
    pub modified: SystemTime,
    /// Hex-encoded BLAKE3 digest of the content
    pub digest: String,
}

/// Configuration for directory walking.
#[derive(Debug, Clone, Default)]
pub struct WalkerConfig {
    /// Follow symbolic links during traversal.
    /// Warning: May cause infinite loops with symlink cycles.
    pub follow_symlinks: bool,

    /// Skip hidden files and directories (names starting with `.`).
    pub skip_hidden: bool,
}

impl WalkerConfig {
    /// Create a new configuration.
    #[must_use]
    pub fn new(follow_symlinks: bool, skip_hidden: bool) -> Self {
        Self {
            follow_symlinks,
            skip_hidden,
        }
    }
}

/// Reasons a single file could not be fingerprinted.
///
/// `NotAFile` and `BelowThreshold` are exclusions, not failures.
#[derive(thiserror::Error, Debug)]
pub enum FingerprintError {
    /// The path does not exist or is not a regular file.
    #[error("Not a file: {0}")]
    NotAFile(PathBuf),

    /// The file is smaller than the configured minimum size.
    #[error("Below size threshold ({size} < {threshold} bytes): {path}")]
    BelowThreshold {
        /// Offending path
        path: PathBuf,
        /// Live size
        size: u64,
        /// Configured minimum
        threshold: u64,
    },

    /// Reading the file failed.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl FingerprintError {
    /// Whether this error merely excludes the file from detection.
    #[must_use]
    pub fn is_exclusion(&self) -> bool {
        matches!(self, Self::NotAFile(_) | Self::BelowThreshold { .. })
    }
}

/// Errors that abort or qualify a whole scan.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// A path produced by the walker could not be read.
    #[error("Cannot read {path}: {reason}")]
    PathUnreadable {
        /// Path where the error occurred
        path: PathBuf,
        /// Human-readable reason
        reason: String,
    },

    /// The fingerprint cache could not be opened or initialized.
    #[error("Fingerprint cache unavailable: {0}")]
    CacheUnavailable(#[source] CacheError),

    /// The worker pool could not be started.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// The scan was interrupted by user (Ctrl+C or shutdown signal).
    #[error("Scan interrupted by user")]
    Interrupted,
}

impl ScanError {
    /// Build a `PathUnreadable` from an I/O error.
    pub fn unreadable(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        Self::PathUnreadable {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}
