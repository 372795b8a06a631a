//! Per-task body run by the worker pool during a scan.
//!
//! [`ScanJob`] fingerprints one path, files the result in the
//! [`DuplicateIndex`] and records the outcome in a [`StatsCollector`].
//! Exclusions (not a file, below threshold) are counted as skipped; any
//! other failure is recorded with its reason and the worker moves on.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::groups::{ScanFailure, ScanStats};
use super::index::DuplicateIndex;
use crate::pool::{Task, TaskHandler};
use crate::progress::ProgressCallback;
use crate::scanner::Fingerprinter;

/// Thread-safe accumulator for one pass's [`ScanStats`].
#[derive(Debug, Default)]
pub struct StatsCollector {
    files_found: AtomicUsize,
    files_scanned: AtomicUsize,
    files_skipped: AtomicUsize,
    files_hashed: AtomicUsize,
    cache_hits: AtomicUsize,
    bytes_hashed: AtomicU64,
    processed: AtomicUsize,
    errors: Mutex<Vec<ScanFailure>>,
    warnings: Mutex<Vec<String>>,
}

impl StatsCollector {
    /// Create an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a path accepted from the walk.
    pub fn record_found(&self) -> usize {
        self.files_found.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Count a fingerprinted file.
    pub fn record_scanned(&self, cache_hit: bool, size: u64) {
        self.files_scanned.fetch_add(1, Ordering::Relaxed);
        if cache_hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.files_hashed.fetch_add(1, Ordering::Relaxed);
            self.bytes_hashed.fetch_add(size, Ordering::Relaxed);
        }
    }

    /// Count an excluded path.
    pub fn record_skipped(&self) {
        self.files_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a per-file failure.
    pub fn record_failure(&self, failure: ScanFailure) {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(failure);
    }

    /// Record a non-fatal warning.
    pub fn record_warning(&self, warning: String) {
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(warning);
    }

    /// Count a task as finished, returning the running total.
    pub fn record_processed(&self) -> usize {
        self.processed.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Tasks finished so far.
    #[must_use]
    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::Relaxed)
    }

    /// Paths accepted so far.
    #[must_use]
    pub fn found(&self) -> usize {
        self.files_found.load(Ordering::Relaxed)
    }

    /// Current totals as [`ScanStats`]. Errors are sorted by path.
    ///
    /// `interrupted` and `duration` are left at their defaults.
    #[must_use]
    pub fn snapshot(&self) -> ScanStats {
        let mut errors = self
            .errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        errors.sort_by(|a, b| a.path.cmp(&b.path).then_with(|| a.reason.cmp(&b.reason)));

        ScanStats {
            files_found: self.files_found.load(Ordering::Relaxed),
            files_scanned: self.files_scanned.load(Ordering::Relaxed),
            files_skipped: self.files_skipped.load(Ordering::Relaxed),
            files_hashed: self.files_hashed.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            bytes_hashed: self.bytes_hashed.load(Ordering::Relaxed),
            errors,
            warnings: self
                .warnings
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            ..ScanStats::default()
        }
    }
}

/// Task handler that fingerprints paths into a [`DuplicateIndex`].
pub struct ScanJob {
    fingerprinter: Arc<Fingerprinter>,
    index: Arc<DuplicateIndex>,
    stats: Arc<StatsCollector>,
    progress: Option<Arc<dyn ProgressCallback>>,
}

impl ScanJob {
    /// Create a job for one pass.
    #[must_use]
    pub fn new(
        fingerprinter: Arc<Fingerprinter>,
        index: Arc<DuplicateIndex>,
        stats: Arc<StatsCollector>,
    ) -> Self {
        Self {
            fingerprinter,
            index,
            stats,
            progress: None,
        }
    }

    /// Report per-file progress to `callback`.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Option<Arc<dyn ProgressCallback>>) -> Self {
        self.progress = callback;
        self
    }

    fn finish(&self, task: &Task) {
        let done = self.stats.record_processed();
        if let Some(ref callback) = self.progress {
            callback.on_progress(done, task.path.to_string_lossy().as_ref());
        }
    }
}

impl TaskHandler for ScanJob {
    fn handle(&self, task: &Task) {
        match self.fingerprinter.fingerprint_detailed(&task.path) {
            Ok(outcome) => {
                let fp = &outcome.fingerprint;
                let bucket_len = self.index.insert_fingerprint(fp);
                if bucket_len == 2 {
                    log::debug!("Duplicate found ({} bytes): {}", fp.size, fp.path.display());
                }
                self.stats.record_scanned(outcome.cache_hit, fp.size);
                if let Some(warning) = outcome.store_warning {
                    self.stats.record_warning(warning);
                }
            }
            Err(e) if e.is_exclusion() => {
                log::debug!("Excluded: {}", e);
                self.index.remove(&task.path);
                self.stats.record_skipped();
            }
            Err(e) => {
                log::warn!("{}", e);
                self.index.remove(&task.path);
                let reason = match &e {
                    crate::scanner::FingerprintError::Io { source, .. } => source.to_string(),
                    other => other.to_string(),
                };
                self.stats.record_failure(ScanFailure::new(&task.path, reason));
            }
        }
        self.finish(task);
    }

    fn on_panic(&self, task: &Task, message: &str) {
        log::error!("Worker panicked on {}: {}", task.path.display(), message);
        self.stats.record_failure(ScanFailure::new(
            &task.path,
            format!("worker panicked: {message}"),
        ));
        self.finish(task);
    }
}
