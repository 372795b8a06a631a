//! Concurrent `size -> digest -> paths` grouping structure.
//!
//! # Overview
//!
//! [`DuplicateIndex`] is the only place duplicate state lives during a scan.
//! Both levels of the map and the reverse `path -> (size, digest)` lookup
//! sit behind one `RwLock`, so moving a path between buckets, and the
//! insert that turns a singleton bucket into a duplicate set, are each a
//! single critical section. A reader taking a [`snapshot`](DuplicateIndex::snapshot)
//! sees either both paths of a newly formed pair or neither.
//!
//! # Invariants
//!
//! - a path is in at most one `(size, digest)` bucket
//! - buckets are never empty; removing the last path drops the bucket,
//!   and a size with no buckets left is dropped too

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::groups::DuplicateGroup;
use crate::scanner::FileFingerprint;

/// `size -> digest -> ordered set of paths`.
pub type BucketMap = BTreeMap<u64, BTreeMap<String, BTreeSet<PathBuf>>>;

#[derive(Debug, Default)]
struct Inner {
    buckets: BucketMap,
    locations: HashMap<PathBuf, (u64, String)>,
}

impl Inner {
    fn detach(&mut self, path: &Path) -> bool {
        let Some((size, digest)) = self.locations.remove(path) else {
            return false;
        };
        if let Some(by_digest) = self.buckets.get_mut(&size) {
            if let Some(paths) = by_digest.get_mut(&digest) {
                paths.remove(path);
                if paths.is_empty() {
                    by_digest.remove(&digest);
                }
            }
            if by_digest.is_empty() {
                self.buckets.remove(&size);
            }
        }
        true
    }
}

/// Point-in-time copy of a [`DuplicateIndex`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSnapshot {
    buckets: BucketMap,
}

impl IndexSnapshot {
    /// Raw bucket map.
    #[must_use]
    pub fn buckets(&self) -> &BucketMap {
        &self.buckets
    }

    /// Consume into the raw bucket map.
    #[must_use]
    pub fn into_buckets(self) -> BucketMap {
        self.buckets
    }

    /// Every bucket, singletons included, by descending size then digest.
    pub fn groups(&self) -> impl Iterator<Item = DuplicateGroup> + '_ {
        self.buckets.iter().rev().flat_map(|(size, by_digest)| {
            by_digest.iter().map(move |(digest, paths)| {
                DuplicateGroup::new(*size, digest.clone(), paths.iter().cloned().collect())
            })
        })
    }

    /// Buckets with two or more paths, by descending size then digest.
    #[must_use]
    pub fn duplicate_groups(&self) -> Vec<DuplicateGroup> {
        self.groups().filter(DuplicateGroup::is_duplicate).collect()
    }

    /// Number of indexed paths.
    #[must_use]
    pub fn path_count(&self) -> usize {
        self.buckets
            .values()
            .flat_map(BTreeMap::values)
            .map(BTreeSet::len)
            .sum()
    }

    /// Number of single-path buckets.
    #[must_use]
    pub fn candidate_count(&self) -> usize {
        self.buckets
            .values()
            .flat_map(BTreeMap::values)
            .filter(|paths| paths.len() == 1)
            .count()
    }
}

/// Thread-safe duplicate index.
#[derive(Debug, Default)]
pub struct DuplicateIndex {
    inner: RwLock<Inner>,
}

impl DuplicateIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Place `path` in the `(size, digest)` bucket.
    ///
    /// Any previous membership of `path` is removed in the same critical
    /// section. Returns the number of paths in the bucket afterwards.
    pub fn insert(&self, size: u64, digest: &str, path: PathBuf) -> usize {
        let mut inner = self.write();

        if inner
            .locations
            .get(&path)
            .is_some_and(|(s, d)| *s == size && d == digest)
        {
            return inner.buckets[&size][digest].len();
        }

        inner.detach(&path);
        inner
            .locations
            .insert(path.clone(), (size, digest.to_string()));
        let paths = inner
            .buckets
            .entry(size)
            .or_default()
            .entry(digest.to_string())
            .or_default();
        paths.insert(path);
        paths.len()
    }

    /// Insert a fingerprint.
    pub fn insert_fingerprint(&self, fingerprint: &FileFingerprint) -> usize {
        self.insert(
            fingerprint.size,
            &fingerprint.digest,
            fingerprint.path.clone(),
        )
    }

    /// Remove `path`, returning whether it was indexed.
    pub fn remove(&self, path: &Path) -> bool {
        self.write().detach(path)
    }

    /// `(size, digest)` bucket currently holding `path`.
    #[must_use]
    pub fn location(&self, path: &Path) -> Option<(u64, String)> {
        self.read().locations.get(path).cloned()
    }

    /// Whether `path` is indexed.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.read().locations.contains_key(path)
    }

    /// Paths in one bucket, sorted.
    #[must_use]
    pub fn bucket(&self, size: u64, digest: &str) -> Vec<PathBuf> {
        self.read()
            .buckets
            .get(&size)
            .and_then(|by_digest| by_digest.get(digest))
            .map(|paths| paths.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Consistent copy of the whole index.
    #[must_use]
    pub fn snapshot(&self) -> IndexSnapshot {
        IndexSnapshot {
            buckets: self.read().buckets.clone(),
        }
    }

    /// Current duplicate groups (two or more paths).
    #[must_use]
    pub fn duplicate_groups(&self) -> Vec<DuplicateGroup> {
        self.snapshot().duplicate_groups()
    }

    /// Keep only paths for which `keep` returns true.
    ///
    /// `keep` runs without the lock held. Returns the number removed.
    pub fn retain<F>(&self, mut keep: F) -> usize
    where
        F: FnMut(&Path) -> bool,
    {
        let paths: Vec<PathBuf> = self.read().locations.keys().cloned().collect();
        let doomed: Vec<PathBuf> = paths.into_iter().filter(|p| !keep(p)).collect();
        if doomed.is_empty() {
            return 0;
        }

        let mut inner = self.write();
        let removed = doomed.iter().filter(|p| inner.detach(p)).count();
        removed
    }

    /// Drop paths that no longer exist as regular files.
    pub fn retain_existing(&self) -> usize {
        let removed = self.retain(|p| std::fs::metadata(p).map(|m| m.is_file()).unwrap_or(false));
        if removed > 0 {
            log::debug!("Pruned {} vanished paths from the index", removed);
        }
        removed
    }

    /// Remove everything.
    pub fn clear(&self) {
        let mut inner = self.write();
        inner.buckets.clear();
        inner.locations.clear();
    }

    /// Number of indexed paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().locations.len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
