//! Scan orchestration.
//!
//! # Overview
//!
//! [`ScanCoordinator`] drives a pass over a lazy sequence of walk entries:
//!
//! 1. **Walk** - filter to files, drop excluded paths and repeats (by cache
//!    key), push each path onto a bounded [`TaskQueue`]
//! 2. **Hash** - a [`WorkerPool`] running [`ScanJob`] fingerprints each path
//!    and files it in the [`DuplicateIndex`]
//! 3. **Report** - once the queue is quiescent, snapshot the index into a
//!    [`DuplicateReport`]
//!
//! The walk runs on the caller's thread, so backpressure from the queue
//! throttles the walker directly.
//!
//! [`ScanCoordinator::run_background`] repeats passes until stopped,
//! sweeping the cache and pruning vanished files before each one.
//!
//! # Example
//!
//! ```no_run
//! use dupecache::duplicates::{CoordinatorConfig, ScanCoordinator};
//! use dupecache::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let coordinator = ScanCoordinator::open(
//!     CoordinatorConfig::default(),
//!     Path::new("/tmp/fingerprints.db"),
//! ).unwrap();
//!
//! let walker = Walker::new(Path::new("."), WalkerConfig::default());
//! let report = coordinator.run_once(walker.walk()).unwrap();
//! println!("{} duplicate groups", report.groups.len());
//! ```

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::groups::{DuplicateReport, ScanFailure};
use super::index::DuplicateIndex;
use super::job::{ScanJob, StatsCollector};
use crate::cache::FingerprintCache;
use crate::pool::{PoolError, QueueOrder, Task, TaskHandler, TaskQueue, WorkerPool, WorkerState};
use crate::progress::{ProgressCallback, PHASE_HASHING, PHASE_WALKING};
use crate::scanner::path_utils::cache_key;
use crate::scanner::{Fingerprinter, ScanError, WalkEntry, DEFAULT_MIN_SIZE};

/// Granularity of interruptible sleeps and quiescence polling.
const TICK: Duration = Duration::from_millis(100);

/// Which kind of report a background callback receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    /// Emitted periodically while a pass is running; may be truncated
    Interim,
    /// Emitted once per completed pass; never truncated
    PassComplete,
}

/// Configuration for the scan coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Number of worker threads
    pub workers: usize,
    /// Maximum pending tasks before the walk blocks
    pub max_queue_depth: usize,
    /// Files smaller than this are excluded
    pub min_size: u64,
    /// Order tasks are handed to workers
    pub queue_order: QueueOrder,
    /// Paths never fingerprinted (e.g. the report file itself)
    pub exclude: Vec<PathBuf>,
    /// Sweep deleted files from the cache before a one-shot pass
    pub sweep_on_start: bool,
    /// Pause between background passes
    pub background_interval: Duration,
    /// How often interim reports are emitted during a background pass
    pub report_interval: Duration,
    /// Stop background mode after this many passes
    pub background_passes: Option<usize>,
    /// Maximum groups in interim reports
    pub report_group_limit: Option<usize>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            max_queue_depth: 64,
            min_size: DEFAULT_MIN_SIZE,
            queue_order: QueueOrder::Lifo,
            exclude: Vec::new(),
            sweep_on_start: true,
            background_interval: Duration::from_secs(30),
            report_interval: Duration::from_secs(5),
            background_passes: None,
            report_group_limit: None,
        }
    }
}

impl CoordinatorConfig {
    /// Set the worker count (minimum 1).
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set the queue depth (minimum 1).
    #[must_use]
    pub fn with_max_queue_depth(mut self, depth: usize) -> Self {
        self.max_queue_depth = depth.max(1);
        self
    }

    /// Set the minimum file size.
    #[must_use]
    pub fn with_min_size(mut self, min_size: u64) -> Self {
        self.min_size = min_size;
        self
    }

    /// Set the queue order.
    #[must_use]
    pub fn with_queue_order(mut self, order: QueueOrder) -> Self {
        self.queue_order = order;
        self
    }

    /// Add a path that is never fingerprinted.
    #[must_use]
    pub fn with_exclude(mut self, path: impl Into<PathBuf>) -> Self {
        self.exclude.push(path.into());
        self
    }

    /// Enable or disable the cache sweep before one-shot passes.
    #[must_use]
    pub fn with_sweep_on_start(mut self, sweep: bool) -> Self {
        self.sweep_on_start = sweep;
        self
    }

    /// Set the pause between background passes.
    #[must_use]
    pub fn with_background_interval(mut self, interval: Duration) -> Self {
        self.background_interval = interval;
        self
    }

    /// Set the interim report interval.
    #[must_use]
    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    /// Bound the number of background passes.
    #[must_use]
    pub fn with_background_passes(mut self, passes: Option<usize>) -> Self {
        self.background_passes = passes;
        self
    }

    /// Cap interim reports at `limit` groups.
    #[must_use]
    pub fn with_report_group_limit(mut self, limit: Option<usize>) -> Self {
        self.report_group_limit = limit;
        self
    }
}

/// Matches walk entries against the configured exclusions.
struct Exclusions {
    keys: HashSet<String>,
    names: HashSet<OsString>,
}

impl Exclusions {
    fn new(paths: &[PathBuf]) -> Self {
        let mut keys = HashSet::new();
        let mut names = HashSet::new();
        for path in paths {
            keys.insert(cache_key(path));
            if let Ok(canonical) = std::fs::canonicalize(path) {
                keys.insert(cache_key(&canonical));
            }
            if let Some(name) = path.file_name() {
                names.insert(name.to_os_string());
            }
        }
        Self { keys, names }
    }

    fn matches(&self, path: &Path, key: &str) -> bool {
        if self.keys.contains(key) {
            return true;
        }
        // Same file reached through a different spelling
        let name_matches = path.file_name().is_some_and(|n| self.names.contains(n));
        name_matches
            && std::fs::canonicalize(path).is_ok_and(|c| self.keys.contains(&cache_key(&c)))
    }
}

/// Clears the coordinator's own stop request when a run returns.
struct StopReset<'a>(&'a AtomicBool);

impl Drop for StopReset<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Orchestrates scan passes over a shared cache and index.
pub struct ScanCoordinator {
    config: CoordinatorConfig,
    cache: Option<Arc<FingerprintCache>>,
    fingerprinter: Arc<Fingerprinter>,
    index: Arc<DuplicateIndex>,
    stop_flag: Arc<AtomicBool>,
    external_stop: Option<Arc<AtomicBool>>,
    progress: Option<Arc<dyn ProgressCallback>>,
    active_pool: Mutex<Option<Arc<WorkerPool>>>,
    workers: AtomicUsize,
}

impl std::fmt::Debug for ScanCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanCoordinator")
            .field("config", &self.config)
            .field("cache", &self.cache.is_some())
            .field("indexed", &self.index.len())
            .finish()
    }
}

impl ScanCoordinator {
    /// Create a coordinator.
    ///
    /// # Arguments
    ///
    /// * `config` - Scan settings
    /// * `cache` - Fingerprint cache; `None` hashes every file every time
    #[must_use]
    pub fn new(config: CoordinatorConfig, cache: Option<Arc<FingerprintCache>>) -> Self {
        let fingerprinter = Arc::new(Fingerprinter::new(cache.clone(), config.min_size));
        let workers = AtomicUsize::new(config.workers.max(1));
        Self {
            config,
            cache,
            fingerprinter,
            index: Arc::new(DuplicateIndex::new()),
            stop_flag: Arc::new(AtomicBool::new(false)),
            external_stop: None,
            progress: None,
            active_pool: Mutex::new(None),
            workers,
        }
    }

    /// Create a coordinator over an SQLite cache at `cache_path`.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::CacheUnavailable`] if the cache cannot be opened.
    pub fn open(config: CoordinatorConfig, cache_path: &Path) -> Result<Self, ScanError> {
        let cache = FingerprintCache::open(cache_path).map_err(ScanError::CacheUnavailable)?;
        Ok(Self::new(config, Some(Arc::new(cache))))
    }

    /// Also stop whenever `flag` is raised (e.g. the Ctrl+C handler's).
    ///
    /// The coordinator only reads this flag and never clears it.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.external_stop = Some(flag);
        self
    }

    /// Report phase progress to `callback`.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// The duplicate index.
    #[must_use]
    pub fn index(&self) -> &Arc<DuplicateIndex> {
        &self.index
    }

    /// The fingerprint cache, if any.
    #[must_use]
    pub fn cache(&self) -> Option<&Arc<FingerprintCache>> {
        self.cache.as_ref()
    }

    /// The fingerprinter (its counters span every pass).
    #[must_use]
    pub fn fingerprinter(&self) -> &Arc<Fingerprinter> {
        &self.fingerprinter
    }

    // Forwards an external stop into the flag the queue and pool watch.
    fn is_stopped(&self) -> bool {
        if self
            .external_stop
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
        {
            self.stop_flag.store(true, Ordering::SeqCst);
        }
        self.stop_flag.load(Ordering::SeqCst)
    }

    /// Ask the running pass (or background loop) to stop.
    ///
    /// Tasks already claimed finish; pending tasks are dropped. The request
    /// ends the current run (or the next one, if none is running); later
    /// runs start normally.
    pub fn stop(&self) {
        log::info!("Stop requested");
        self.stop_flag.store(true, Ordering::SeqCst);
    }

    fn lock_pool(&self) -> MutexGuard<'_, Option<Arc<WorkerPool>>> {
        self.active_pool.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Change the number of workers.
    ///
    /// Applies immediately to a running pass and to every later pass.
    ///
    /// # Errors
    ///
    /// Fails if `count` is zero or new threads cannot be spawned.
    pub fn resize_workers(&self, count: usize) -> Result<(), PoolError> {
        if count == 0 {
            return Err(PoolError::NoWorkers);
        }
        self.workers.store(count, Ordering::SeqCst);
        let pool = self.lock_pool().clone();
        if let Some(pool) = pool {
            pool.resize(count)?;
        }
        log::info!("Worker count set to {}", count);
        Ok(())
    }

    /// Configured worker count for the next pass.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.load(Ordering::SeqCst)
    }

    /// States of the workers of the running pass (empty when idle).
    #[must_use]
    pub fn worker_states(&self) -> Vec<(usize, WorkerState)> {
        self.lock_pool()
            .as_ref()
            .map(|pool| pool.worker_states())
            .unwrap_or_default()
    }

    /// Run one complete pass and return its report.
    ///
    /// The index is cleared first, so the report reflects only `entries`.
    ///
    /// # Errors
    ///
    /// - [`ScanError::Interrupted`] if shutdown was requested
    /// - [`ScanError::Pool`] if the workers could not be started
    pub fn run_once<I>(&self, entries: I) -> Result<DuplicateReport, ScanError>
    where
        I: IntoIterator<Item = Result<WalkEntry, ScanError>>,
    {
        let _reset = StopReset(&self.stop_flag);
        self.index.clear();
        if self.config.sweep_on_start {
            self.sweep_cache();
        }

        let report = self.run_pass(entries, None)?;
        if report.stats.interrupted {
            return Err(ScanError::Interrupted);
        }
        Ok(report)
    }

    /// [`ScanCoordinator::run_once`] over plain file paths.
    ///
    /// # Errors
    ///
    /// Same as [`ScanCoordinator::run_once`].
    pub fn run_once_files<I>(&self, paths: I) -> Result<DuplicateReport, ScanError>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        self.run_once(paths.into_iter().map(|p| Ok(WalkEntry::file(p))))
    }

    /// Run passes until stopped.
    ///
    /// Before each pass the cache is swept and vanished paths are pruned from
    /// the index. `walk` is called once per pass for a fresh sequence.
    /// `on_report` receives interim reports during a pass and a complete
    /// report after it. Returns the number of completed passes.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Pool`] if workers cannot be started.
    pub fn run_background<W, I, R>(&self, mut walk: W, mut on_report: R) -> Result<usize, ScanError>
    where
        W: FnMut() -> I,
        I: IntoIterator<Item = Result<WalkEntry, ScanError>>,
        R: FnMut(&DuplicateReport, ReportKind),
    {
        let _reset = StopReset(&self.stop_flag);
        let mut passes = 0;
        log::info!("Background mode started");

        while !self.is_stopped() {
            self.sweep_cache();
            self.index.retain_existing();

            let report = self.run_pass(walk(), Some(&mut on_report))?;
            if report.stats.interrupted {
                break;
            }
            on_report(&report, ReportKind::PassComplete);
            passes += 1;

            if self.config.background_passes.is_some_and(|max| passes >= max) {
                break;
            }
            self.sleep_interruptible(self.config.background_interval);
        }

        log::info!("Background mode finished after {} passes", passes);
        Ok(passes)
    }

    fn sleep_interruptible(&self, total: Duration) {
        let deadline = Instant::now() + total;
        while !self.is_stopped() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep((deadline - now).min(TICK));
        }
    }

    fn sweep_cache(&self) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.sweep_deleted() {
                log::warn!("Cache sweep failed: {}", e);
            }
        }
    }

    fn build_report(&self, stats: &StatsCollector, limit: Option<usize>) -> DuplicateReport {
        let report = DuplicateReport::new(self.index.duplicate_groups(), stats.snapshot());
        match limit {
            Some(n) => report.truncated(n),
            None => report,
        }
    }

    fn run_pass<I>(
        &self,
        entries: I,
        mut interim: Option<&mut dyn FnMut(&DuplicateReport, ReportKind)>,
    ) -> Result<DuplicateReport, ScanError>
    where
        I: IntoIterator<Item = Result<WalkEntry, ScanError>>,
    {
        let start = Instant::now();
        let stats = Arc::new(StatsCollector::new());
        let exclusions = Exclusions::new(&self.config.exclude);

        let queue = Arc::new(
            TaskQueue::new(self.config.max_queue_depth, self.config.queue_order)
                .with_shutdown_flag(Arc::clone(&self.stop_flag)),
        );
        let job: Arc<dyn TaskHandler> = Arc::new(
            ScanJob::new(
                Arc::clone(&self.fingerprinter),
                Arc::clone(&self.index),
                Arc::clone(&stats),
            )
            .with_progress_callback(self.progress.clone()),
        );
        let pool = Arc::new(WorkerPool::new(
            Arc::clone(&queue),
            job,
            Arc::clone(&self.stop_flag),
        ));
        let workers = self.worker_count();
        pool.start(workers)?;
        *self.lock_pool() = Some(Arc::clone(&pool));

        log::info!(
            "Scan pass started: {} workers, queue depth {} ({})",
            workers,
            queue.max_depth(),
            queue.order()
        );

        let mut last_interim = Instant::now();
        let mut emit_interim = |force: bool| {
            if let Some(cb) = interim.as_deref_mut() {
                if force || last_interim.elapsed() >= self.config.report_interval {
                    last_interim = Instant::now();
                    let report = self.build_report(&stats, self.config.report_group_limit);
                    cb(&report, ReportKind::Interim);
                }
            }
        };

        // Phase 1: walk and enqueue
        if let Some(ref cb) = self.progress {
            cb.on_phase_start(PHASE_WALKING, 0);
        }
        let mut seen: HashSet<String> = HashSet::new();
        for entry in entries {
            if self.is_stopped() {
                break;
            }
            let entry = match entry {
                Ok(e) => e,
                Err(ScanError::PathUnreadable { path, reason }) => {
                    stats.record_failure(ScanFailure::new(path, reason));
                    continue;
                }
                Err(e) => {
                    log::warn!("Walk error: {}", e);
                    stats.record_warning(e.to_string());
                    continue;
                }
            };
            if entry.is_dir {
                continue;
            }

            let key = cache_key(&entry.path);
            if !seen.insert(key.clone()) {
                log::trace!("Already queued: {}", entry.path.display());
                continue;
            }
            if exclusions.matches(&entry.path, &key) {
                log::debug!("Excluded path: {}", entry.path.display());
                stats.record_skipped();
                continue;
            }

            let found = stats.record_found();
            if let Some(ref cb) = self.progress {
                cb.on_progress(found, entry.path.to_string_lossy().as_ref());
            }
            if let Err(e) = queue.push(Task::new(entry.path)) {
                log::debug!("Enqueue stopped: {}", e);
                break;
            }
            emit_interim(false);
        }
        if let Some(ref cb) = self.progress {
            cb.on_phase_end(PHASE_WALKING);
            cb.on_phase_start(PHASE_HASHING, stats.found());
        }

        // Phase 2: wait for the workers
        while !queue.wait_quiescent_timeout(TICK) {
            if self.is_stopped() {
                break;
            }
            emit_interim(false);
        }

        queue.close();
        pool.stop();
        *self.lock_pool() = None;

        let interrupted = self.is_stopped();
        if interrupted {
            let dropped = queue.discard_pending();
            log::info!("Scan interrupted, {} queued files not processed", dropped);
        }
        if let Some(ref cb) = self.progress {
            cb.on_phase_end(PHASE_HASHING);
        }

        // Phase 3: report
        let mut report = self.build_report(&stats, None);
        report.stats.interrupted = interrupted;
        report.stats.duration = start.elapsed();

        log::info!(
            "Scan pass complete: {} files, {} hashed, {} cache hits, {} groups, {} errors in {:.2?}",
            report.stats.files_found,
            report.stats.files_hashed,
            report.stats.cache_hits,
            report.groups.len(),
            report.stats.errors.len(),
            report.stats.duration
        );
        Ok(report)
    }
}
