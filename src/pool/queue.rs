//! Bounded task queue with backpressure.
//!
//! # Overview
//!
//! The producer (directory walk) is much faster than the consumers (hashing
//! workers). [`TaskQueue::push`] blocks while the queue holds
//! `max_depth` tasks, so pending work is bounded no matter how large the
//! tree is. Consumers either poll with [`TaskQueue::pop`] or take a
//! [`Claim`], which keeps the task counted as in flight until the guard
//! drops. That count is what [`TaskQueue::wait_quiescent`] waits on.
//!
//! # Invariants
//!
//! - `len() <= max_depth()` at all times
//! - a task is handed out at most once
//! - `push` never blocks forever: it fails once the queue is closed or the
//!   shutdown flag is raised
//!
//! # Ordering
//!
//! [`QueueOrder::Lifo`] (the default) hands out the most recently pushed
//! task first; [`QueueOrder::Fifo`] the oldest.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Re-check interval for blocked producers and quiescence waiters.
const WAIT_SLICE: Duration = Duration::from_millis(50);

/// A unit of work: fingerprint one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Path to process
    pub path: PathBuf,
}

impl Task {
    /// Create a task for `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Order in which queued tasks are handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueOrder {
    /// Most recently pushed first (stack order)
    #[default]
    Lifo,
    /// Oldest first
    Fifo,
}

impl std::fmt::Display for QueueOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lifo => write!(f, "lifo"),
            Self::Fifo => write!(f, "fifo"),
        }
    }
}

/// Why a push was refused. The task is handed back.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum PushError {
    /// The queue was closed.
    #[error("task queue is closed")]
    Closed(Task),
    /// Shutdown was requested.
    #[error("shutdown requested")]
    Shutdown(Task),
}

impl PushError {
    /// Recover the rejected task.
    #[must_use]
    pub fn into_task(self) -> Task {
        match self {
            Self::Closed(t) | Self::Shutdown(t) => t,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    tasks: VecDeque<Task>,
    in_flight: usize,
    closed: bool,
    high_water: usize,
}

/// Bounded multi-producer multi-consumer task queue.
#[derive(Debug)]
pub struct TaskQueue {
    state: Mutex<State>,
    not_full: Condvar,
    not_empty: Condvar,
    idle: Condvar,
    max_depth: usize,
    order: QueueOrder,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

/// A task taken from the queue and counted as in flight until dropped.
#[derive(Debug)]
pub struct Claim<'a> {
    queue: &'a TaskQueue,
    task: Task,
}

impl Claim<'_> {
    /// The claimed task.
    #[must_use]
    pub fn task(&self) -> &Task {
        &self.task
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        let mut st = self.queue.lock_or_recover();
        st.in_flight = st.in_flight.saturating_sub(1);
        if st.in_flight == 0 && st.tasks.is_empty() {
            self.queue.idle.notify_all();
        }
    }
}

impl TaskQueue {
    /// Create a queue holding at most `max_depth` pending tasks.
    ///
    /// A depth of zero is treated as one.
    #[must_use]
    pub fn new(max_depth: usize, order: QueueOrder) -> Self {
        Self {
            state: Mutex::new(State::default()),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            idle: Condvar::new(),
            max_depth: max_depth.max(1),
            order,
            shutdown_flag: None,
        }
    }

    /// Make blocked pushes fail once `flag` is raised.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    fn lock_or_recover(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    fn take(&self, st: &mut State) -> Option<Task> {
        let task = match self.order {
            QueueOrder::Lifo => st.tasks.pop_back(),
            QueueOrder::Fifo => st.tasks.pop_front(),
        }?;
        self.not_full.notify_one();
        Some(task)
    }

    /// Enqueue a task, blocking while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns the task inside [`PushError`] if the queue is closed or
    /// shutdown was requested, whether before or during the wait.
    pub fn push(&self, task: Task) -> Result<(), PushError> {
        let mut st = self.lock_or_recover();
        loop {
            if st.closed {
                return Err(PushError::Closed(task));
            }
            if self.is_shutdown_requested() {
                return Err(PushError::Shutdown(task));
            }
            if st.tasks.len() < self.max_depth {
                break;
            }
            st = self
                .not_full
                .wait_timeout(st, WAIT_SLICE)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }

        st.tasks.push_back(task);
        st.high_water = st.high_water.max(st.tasks.len());
        self.not_empty.notify_one();
        Ok(())
    }

    /// Take a task without blocking and without in-flight tracking.
    pub fn pop(&self) -> Option<Task> {
        let mut st = self.lock_or_recover();
        let task = self.take(&mut st);
        if task.is_some() && st.tasks.is_empty() && st.in_flight == 0 {
            self.idle.notify_all();
        }
        task
    }

    /// Claim a task without blocking.
    pub fn try_claim(&self) -> Option<Claim<'_>> {
        let mut st = self.lock_or_recover();
        let task = self.take(&mut st)?;
        st.in_flight += 1;
        Some(Claim { queue: self, task })
    }

    /// Claim a task, waiting up to `timeout` for one to arrive.
    ///
    /// Returns `None` on timeout or when the queue is closed and empty.
    pub fn claim_timeout(&self, timeout: Duration) -> Option<Claim<'_>> {
        let deadline = Instant::now() + timeout;
        let mut st = self.lock_or_recover();
        loop {
            if let Some(task) = self.take(&mut st) {
                st.in_flight += 1;
                return Some(Claim { queue: self, task });
            }
            if st.closed {
                return None;
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            st = self
                .not_empty
                .wait_timeout(st, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Block until no task is pending and none is in flight.
    ///
    /// Returns `false` if shutdown was requested first.
    pub fn wait_quiescent(&self) -> bool {
        let mut st = self.lock_or_recover();
        while !(st.tasks.is_empty() && st.in_flight == 0) {
            if self.is_shutdown_requested() {
                return false;
            }
            st = self
                .idle
                .wait_timeout(st, WAIT_SLICE)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    /// Like [`TaskQueue::wait_quiescent`] but gives up after `timeout`.
    ///
    /// Returns whether the queue is quiescent.
    pub fn wait_quiescent_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut st = self.lock_or_recover();
        loop {
            if st.tasks.is_empty() && st.in_flight == 0 {
                return true;
            }
            let now = Instant::now();
            if now >= deadline || self.is_shutdown_requested() {
                return false;
            }
            st = self
                .idle
                .wait_timeout(st, (deadline - now).min(WAIT_SLICE))
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Whether the queue is empty with nothing in flight.
    #[must_use]
    pub fn is_quiescent(&self) -> bool {
        let st = self.lock_or_recover();
        st.tasks.is_empty() && st.in_flight == 0
    }

    /// Number of pending tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_or_recover().tasks.len()
    }

    /// Whether no task is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of claimed tasks not yet released.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.lock_or_recover().in_flight
    }

    /// Largest pending length observed so far.
    #[must_use]
    pub fn high_water_mark(&self) -> usize {
        self.lock_or_recover().high_water
    }

    /// Configured capacity.
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Configured hand-out order.
    #[must_use]
    pub fn order(&self) -> QueueOrder {
        self.order
    }

    /// Refuse further pushes and wake every waiter.
    ///
    /// Pending tasks can still be claimed.
    pub fn close(&self) {
        let mut st = self.lock_or_recover();
        st.closed = true;
        self.not_full.notify_all();
        self.not_empty.notify_all();
        self.idle.notify_all();
    }

    /// Whether [`TaskQueue::close`] was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock_or_recover().closed
    }

    /// Drop every pending task, returning how many were discarded.
    pub fn discard_pending(&self) -> usize {
        let mut st = self.lock_or_recover();
        let n = st.tasks.len();
        st.tasks.clear();
        self.not_full.notify_all();
        if st.in_flight == 0 {
            self.idle.notify_all();
        }
        n
    }
}
