//! Path normalization for cache keys and enqueue deduplication.
//!
//! The same file can reach the scanner under different byte spellings:
//! macOS reports names in NFD while most other systems use NFC, and Windows
//! paths may carry a `\\?\` verbatim prefix and differ only in case. Cache
//! keys are built so that all of these collapse onto one string.
//!
//! The key is computed without touching the filesystem; symlinks and `..`
//! components are not resolved.
//!
//! # Example
//!
//! ```
//! use dupecache::scanner::path_utils::cache_key;
//! use std::path::Path;
//!
//! let nfc = Path::new("photos/café.jpg");
//! let nfd = Path::new("photos/cafe\u{0301}.jpg");
//! assert_eq!(cache_key(nfc), cache_key(nfd));
//! ```

use std::path::{Path, PathBuf};

use unicode_normalization::UnicodeNormalization;

const VERBATIM_PREFIX: &str = r"\\?\";

/// Normalize a path string to NFC (Composed) form.
#[must_use]
pub fn normalize_path_str(s: &str) -> String {
    s.nfc().collect()
}

/// Build the normalized cache key for a path.
///
/// Invalid UTF-8 is converted lossily before normalization.
#[must_use]
pub fn cache_key(path: &Path) -> String {
    let lossy = path.to_string_lossy();
    let stripped = lossy.strip_prefix(VERBATIM_PREFIX).unwrap_or(&lossy);
    let normalized = normalize_path_str(stripped);

    if cfg!(windows) {
        normalized.to_lowercase()
    } else {
        normalized
    }
}

/// Check whether two paths map to the same cache key.
#[must_use]
pub fn same_key(a: &Path, b: &Path) -> bool {
    cache_key(a) == cache_key(b)
}

/// Normalized form of a path, suitable for display and storage.
///
/// Unlike [`cache_key`], case is preserved on every platform.
#[must_use]
pub fn normalize_pathbuf(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(s) => PathBuf::from(normalize_path_str(s.strip_prefix(VERBATIM_PREFIX).unwrap_or(s))),
        None => path.to_path_buf(),
    }
}

/// Check if a string is already in NFC form.
#[must_use]
pub fn is_nfc(s: &str) -> bool {
    unicode_normalization::is_nfc(s)
}
