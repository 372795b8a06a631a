//! Ctrl+C handling for graceful shutdown.
//!
//! A single `Arc<AtomicBool>` is shared by the walker, the task queue, the
//! worker pool and the scan coordinator. Raising it makes the walk stop
//! producing, unblocks a producer waiting on a full queue, and lets workers
//! finish the file they are hashing before exiting. A second Ctrl+C while
//! shutdown is already in progress exits immediately with code 130.
//!
//! # Usage
//!
//! ```rust,no_run
//! use dupecache::duplicates::{CoordinatorConfig, ScanCoordinator};
//! use dupecache::signal::install_handler;
//!
//! let handler = install_handler().expect("signal handler");
//! let coordinator = ScanCoordinator::new(CoordinatorConfig::default(), None)
//!     .with_shutdown_flag(handler.get_flag());
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Exit code for SIGINT (Ctrl+C) interruption (128 + SIGINT).
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

/// Shared shutdown flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandler {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandler {
    /// Create a handler with no shutdown requested.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether Ctrl+C was pressed or `request_shutdown()` was called.
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Raise the flag.
    pub fn request_shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// The shared flag, for the coordinator and walker.
    #[must_use]
    pub fn get_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    /// Lower the flag so the handler can be reused.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Error type for signal handler installation.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// Failed to install the Ctrl+C handler.
    #[error("Failed to install signal handler: {0}")]
    InstallFailed(#[from] ctrlc::Error),
}

static GLOBAL_HANDLER: OnceLock<ShutdownHandler> = OnceLock::new();

fn on_interrupt(flag: &AtomicBool) {
    if flag.swap(true, Ordering::SeqCst) {
        let _ = writeln!(std::io::stderr(), "\nForced exit.");
        std::process::exit(EXIT_CODE_INTERRUPTED);
    }
    let _ = writeln!(
        std::io::stderr(),
        "\nInterrupted. Finishing files in progress (Ctrl+C again to force)..."
    );
    let _ = std::io::stderr().flush();
    log::info!("Shutdown signal received");
}

/// Install the process-wide Ctrl+C handler.
///
/// The handler is installed once per process; later calls return the same
/// handler with its flag lowered. If the hook is already owned by someone
/// else, an unhooked handler is returned, which still honors
/// `request_shutdown()`.
///
/// # Errors
///
/// Currently always succeeds; the `Result` leaves room for platforms where
/// installation is mandatory.
pub fn install_handler() -> Result<ShutdownHandler, SignalError> {
    if let Some(handler) = GLOBAL_HANDLER.get() {
        handler.reset();
        return Ok(handler.clone());
    }

    let handler = ShutdownHandler::new();
    let flag = handler.get_flag();

    match ctrlc::set_handler(move || on_interrupt(&flag)) {
        Ok(()) => Ok(GLOBAL_HANDLER.get_or_init(|| handler).clone()),
        Err(e) => {
            log::debug!("Ctrl+C handler unavailable ({}), using unhooked handler", e);
            let fallback = GLOBAL_HANDLER.get_or_init(ShutdownHandler::new);
            fallback.reset();
            Ok(fallback.clone())
        }
    }
}

/// Create a handler without installing any signal hook.
#[must_use]
pub fn create_handler() -> ShutdownHandler {
    ShutdownHandler::new()
}
