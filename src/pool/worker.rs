//! Resizable pool of worker threads.
//!
//! Each worker runs the loop
//!
//! ```text
//! Idle -> Claiming -> Processing -> Idle ... -> Stopped
//! ```
//!
//! claiming tasks from a shared [`TaskQueue`] and passing them to a
//! [`TaskHandler`]. A worker stops when it is retired by [`WorkerPool::resize`],
//! when shutdown is requested, or when the pool is draining and the queue is
//! empty. The task a worker is processing always runs to completion.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::{PoolError, TaskHandler, TaskQueue};

/// How long an idle worker waits for a task before re-checking its flags.
const CLAIM_POLL: Duration = Duration::from_millis(25);

/// Lifecycle state of one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    /// Waiting for work
    Idle = 0,
    /// Trying to take a task from the queue
    Claiming = 1,
    /// Running a task
    Processing = 2,
    /// Exited
    Stopped = 3,
}

impl WorkerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Idle,
            1 => Self::Claiming,
            2 => Self::Processing,
            _ => Self::Stopped,
        }
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Claiming => "claiming",
            Self::Processing => "processing",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

struct WorkerSlot {
    id: usize,
    state: Arc<AtomicU8>,
    retire: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

/// Flags shared by every worker of one pool.
#[derive(Clone)]
struct Shared {
    queue: Arc<TaskQueue>,
    handler: Arc<dyn TaskHandler>,
    shutdown: Arc<AtomicBool>,
    draining: Arc<AtomicBool>,
}

/// A set of named worker threads draining a [`TaskQueue`].
///
/// Dropping the pool stops it.
pub struct WorkerPool {
    shared: Shared,
    workers: Mutex<Vec<WorkerSlot>>,
    next_id: AtomicUsize,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.worker_count())
            .field("queue_len", &self.shared.queue.len())
            .finish()
    }
}

impl WorkerPool {
    /// Create a pool with no workers.
    ///
    /// # Arguments
    ///
    /// * `queue` - Source of tasks
    /// * `handler` - Work done for each task
    /// * `shutdown` - Raised to make every worker exit after its current task
    #[must_use]
    pub fn new(
        queue: Arc<TaskQueue>,
        handler: Arc<dyn TaskHandler>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            shared: Shared {
                queue,
                handler,
                shutdown,
                draining: Arc::new(AtomicBool::new(false)),
            },
            workers: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(0),
        }
    }

    fn lock_workers(&self) -> MutexGuard<'_, Vec<WorkerSlot>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The queue this pool drains.
    #[must_use]
    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.shared.queue
    }

    /// Spawn `count` workers.
    ///
    /// # Errors
    ///
    /// Fails if the pool already has workers, `count` is zero, or a thread
    /// cannot be spawned (workers spawned before the failure keep running).
    pub fn start(&self, count: usize) -> Result<(), PoolError> {
        if count == 0 {
            return Err(PoolError::NoWorkers);
        }
        let mut workers = self.lock_workers();
        if !workers.is_empty() {
            return Err(PoolError::AlreadyRunning);
        }
        self.shared.draining.store(false, Ordering::SeqCst);
        for _ in 0..count {
            workers.push(self.spawn_worker()?);
        }
        log::debug!("Started {} workers", count);
        Ok(())
    }

    fn spawn_worker(&self) -> Result<WorkerSlot, PoolError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let state = Arc::new(AtomicU8::new(WorkerState::Idle as u8));
        let retire = Arc::new(AtomicBool::new(false));

        let shared = self.shared.clone();
        let thread_state = Arc::clone(&state);
        let thread_retire = Arc::clone(&retire);
        let handle = thread::Builder::new()
            .name(format!("dupe-worker-{id}"))
            .spawn(move || worker_loop(id, &shared, &thread_state, &thread_retire))
            .map_err(PoolError::Spawn)?;

        Ok(WorkerSlot {
            id,
            state,
            retire,
            handle: Some(handle),
        })
    }

    /// Add or retire workers until `count` are running.
    ///
    /// Retired workers finish their current task before exiting; this call
    /// waits for them.
    ///
    /// # Errors
    ///
    /// Fails if `count` is zero or a new thread cannot be spawned.
    pub fn resize(&self, count: usize) -> Result<(), PoolError> {
        if count == 0 {
            return Err(PoolError::NoWorkers);
        }

        let retired: Vec<WorkerSlot> = {
            let mut workers = self.lock_workers();
            let current = workers.len();
            if count > current {
                for _ in current..count {
                    workers.push(self.spawn_worker()?);
                }
                Vec::new()
            } else {
                let retired = workers.split_off(count);
                for slot in &retired {
                    slot.retire.store(true, Ordering::SeqCst);
                }
                retired
            }
        };

        let removed = retired.len();
        join_all(retired);
        log::debug!("Resized pool to {} workers ({} retired)", count, removed);
        Ok(())
    }

    /// Stop the pool: workers drain the queue, finish in-flight tasks and exit.
    ///
    /// If shutdown was requested, pending tasks are left unprocessed.
    /// Calling `stop` on a stopped pool does nothing.
    pub fn stop(&self) {
        self.shared.draining.store(true, Ordering::SeqCst);
        let workers: Vec<WorkerSlot> = std::mem::take(&mut *self.lock_workers());
        if workers.is_empty() {
            return;
        }
        let n = workers.len();
        join_all(workers);
        log::debug!("Stopped {} workers", n);
    }

    /// Number of live workers.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.lock_workers().len()
    }

    /// `(id, state)` for every live worker, ordered by id.
    #[must_use]
    pub fn worker_states(&self) -> Vec<(usize, WorkerState)> {
        self.lock_workers()
            .iter()
            .map(|slot| (slot.id, WorkerState::from_u8(slot.state.load(Ordering::SeqCst))))
            .collect()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

fn join_all(workers: Vec<WorkerSlot>) {
    for mut slot in workers {
        if let Some(handle) = slot.handle.take() {
            if handle.join().is_err() {
                log::error!("Worker {} exited abnormally", slot.id);
            }
        }
    }
}

fn worker_loop(id: usize, shared: &Shared, state: &AtomicU8, retire: &AtomicBool) {
    log::trace!("Worker {} started", id);
    let set = |s: WorkerState| state.store(s as u8, Ordering::SeqCst);

    loop {
        if retire.load(Ordering::SeqCst) || shared.shutdown.load(Ordering::SeqCst) {
            break;
        }

        set(WorkerState::Claiming);
        match shared.queue.claim_timeout(CLAIM_POLL) {
            Some(claim) => {
                set(WorkerState::Processing);
                let task = claim.task();
                let result = panic::catch_unwind(AssertUnwindSafe(|| shared.handler.handle(task)));
                if let Err(payload) = result {
                    shared.handler.on_panic(task, &panic_message(payload.as_ref()));
                }
                drop(claim);
                set(WorkerState::Idle);
            }
            None => {
                set(WorkerState::Idle);
                if shared.draining.load(Ordering::SeqCst) && shared.queue.is_empty() {
                    break;
                }
            }
        }
    }

    set(WorkerState::Stopped);
    log::trace!("Worker {} stopped", id);
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
