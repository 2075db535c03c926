//! Signal handling for graceful shutdown.
//!
//! A Ctrl+C sets a shared `AtomicBool`. The restore run checks it before each
//! volume and between job polls, and stops with exit code 130.
//!
//! # Usage
//!
//! ```rust,no_run
//! use spx_restore::signal::install_handler;
//!
//! let handler = install_handler().expect("Failed to install signal handler");
//!
//! // Pass the flag to the restore tester
//! let shutdown_flag = handler.get_flag();
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Shared shutdown flag.
///
/// `ShutdownHandler` is `Send` and `Sync`; clones share the same flag.
#[derive(Debug, Clone)]
pub struct ShutdownHandler {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandler {
    fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get a clone of the shutdown flag for the restore tester.
    #[must_use]
    pub fn get_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    fn reset(&self) {
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

/// Install a Ctrl+C handler that sets the shutdown flag on interrupt.
///
/// Calling this more than once in a process returns the handler installed
/// first, with its flag reset. If another hook already owns Ctrl+C, an
/// unhooked handler is returned so `run_app` can still be called from tests.
///
/// # Errors
///
/// Currently always succeeds; the `Result` leaves room for platforms where
/// installation failure should be reported.
pub fn install_handler() -> Result<ShutdownHandler, SignalError> {
    if let Some(handler) = GLOBAL_HANDLER.get() {
        handler.reset();
        return Ok(handler.clone());
    }

    let handler = ShutdownHandler::new();
    let flag = handler.get_flag();

    match ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);

        let _ = writeln!(
            std::io::stderr(),
            "\nInterrupted. Stopping after the current poll..."
        );
        let _ = std::io::stderr().flush();

        log::info!("Shutdown signal received");
    }) {
        Ok(()) => {
            let _ = GLOBAL_HANDLER.set(handler.clone());
            Ok(handler)
        }
        Err(_) => {
            if let Some(handler) = GLOBAL_HANDLER.get() {
                handler.reset();
                Ok(handler.clone())
            } else {
                log::debug!("Ctrl+C handler already registered, using unhooked handler");
                let fallback = ShutdownHandler::new();
                let _ = GLOBAL_HANDLER.set(fallback.clone());
                Ok(fallback)
            }
        }
    }
}
