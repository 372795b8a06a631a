//! Bounded task queue and worker pool.
//!
//! # Architecture
//!
//! - [`queue`]: [`TaskQueue`], a bounded queue with blocking `push` for
//!   backpressure and RAII [`Claim`]s for in-flight tracking
//! - [`worker`]: [`WorkerPool`], named OS threads that claim tasks and hand
//!   them to a [`TaskHandler`]
//!
//! The pool knows nothing about fingerprints or duplicates. The scan
//! coordinator supplies the handler that does the real work.

pub mod queue;
pub mod worker;

pub use queue::{Claim, PushError, QueueOrder, Task, TaskQueue};
pub use worker::{WorkerPool, WorkerState};

/// Work performed for each claimed task.
pub trait TaskHandler: Send + Sync {
    /// Process one task. Runs on a worker thread.
    fn handle(&self, task: &Task);

    /// Called instead of completing normally when [`TaskHandler::handle`] panics.
    fn on_panic(&self, task: &Task, message: &str) {
        log::error!("Worker panicked on {}: {}", task.path.display(), message);
    }
}

/// Errors from pool lifecycle operations.
#[derive(thiserror::Error, Debug)]
pub enum PoolError {
    /// The OS refused to create a worker thread.
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// `start` was called on a pool that already has workers.
    #[error("Worker pool is already running")]
    AlreadyRunning,

    /// A worker count of zero was requested.
    #[error("Worker count must be at least 1")]
    NoWorkers,
}
