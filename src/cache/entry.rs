//! Cache record definitions.
//!
//! A [`CacheRecord`] is the persisted form of a file fingerprint. The
//! modification time is kept as a `(seconds, nanoseconds)` pair relative to
//! the Unix epoch so that a round trip through the store reproduces the exact
//! `SystemTime` that was observed when the digest was computed.

use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// A single persisted fingerprint, keyed by normalized path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Normalized path (the cache key)
    pub path: PathBuf,
    /// File size in bytes when the digest was computed
    pub size: u64,
    /// Filesystem modification time when the digest was computed
    pub mtime: SystemTime,
    /// Hex-encoded content digest
    pub digest: String,
}

impl CacheRecord {
    /// Create a new record.
    #[must_use]
    pub fn new(path: PathBuf, size: u64, mtime: SystemTime, digest: impl Into<String>) -> Self {
        Self {
            path,
            size,
            mtime,
            digest: digest.into(),
        }
    }

    /// Whether this record still describes a file with the given live metadata.
    ///
    /// Modification times are compared for exact equality.
    #[must_use]
    pub fn is_fresh(&self, size: u64, mtime: SystemTime) -> bool {
        self.size == size && self.mtime == mtime
    }
}

/// Split a `SystemTime` into signed seconds and sub-second nanoseconds.
///
/// Times before the epoch produce negative seconds with a non-negative
/// nanosecond part, so `(secs, nanos)` always means `secs + nanos / 1e9`.
#[must_use]
pub fn system_time_to_parts(time: SystemTime) -> (i64, u32) {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => (after.as_secs() as i64, after.subsec_nanos()),
        Err(err) => {
            let before = err.duration();
            let secs = before.as_secs() as i64;
            let nanos = before.subsec_nanos();
            if nanos == 0 {
                (-secs, 0)
            } else {
                (-secs - 1, 1_000_000_000 - nanos)
            }
        }
    }
}

/// Rebuild a `SystemTime` from the parts produced by [`system_time_to_parts`].
///
/// Returns `None` when `nanos` is out of range.
#[must_use]
pub fn parts_to_system_time(secs: i64, nanos: u32) -> Option<SystemTime> {
    if nanos >= 1_000_000_000 {
        return None;
    }
    if secs >= 0 {
        UNIX_EPOCH.checked_add(Duration::new(secs as u64, nanos))
    } else {
        UNIX_EPOCH
            .checked_sub(Duration::from_secs(secs.unsigned_abs()))
            .and_then(|t| t.checked_add(Duration::from_nanos(u64::from(nanos))))
    }
}

/// Check that a digest string looks like something this crate produced.
#[must_use]
pub fn is_valid_digest(digest: &str) -> bool {
    !digest.is_empty() && digest.len() % 2 == 0 && digest.bytes().all(|b| b.is_ascii_hexdigit())
}
