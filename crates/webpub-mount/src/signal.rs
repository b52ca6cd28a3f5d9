//! Shutdown signal handling using signal-hook.
//!
//! SIGINT, SIGTERM and SIGHUP all request the same shutdown. Only the first
//! signal counts: later ones are logged and ignored so that a publish's
//! teardown, once started, always runs to completion.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::Signals;

/// Signals that end a publish session.
pub const SHUTDOWN_SIGNALS: [i32; 3] = [SIGINT, SIGTERM, SIGHUP];

/// Tracks if handler has been installed
static INSTALLED: AtomicBool = AtomicBool::new(false);

/// First shutdown signal received, and waiters for it
static SHUTDOWN: OnceLock<(Mutex<Option<i32>>, Condvar)> = OnceLock::new();

fn shutdown_state() -> &'static (Mutex<Option<i32>>, Condvar) {
    SHUTDOWN.get_or_init(|| (Mutex::new(None), Condvar::new()))
}

/// Install the shutdown signal handlers.
///
/// Replaces the default (terminating) disposition of the shutdown signals,
/// so from here on they only wake [`wait_for_shutdown`]. Safe to call
/// multiple times; subsequent calls are no-ops.
pub fn install_signal_handler() -> Result<(), std::io::Error> {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }

    let mut signals = match Signals::new(SHUTDOWN_SIGNALS) {
        Ok(signals) => signals,
        Err(e) => {
            INSTALLED.store(false, Ordering::SeqCst);
            return Err(e);
        }
    };

    std::thread::Builder::new()
        .name("webpub-signals".to_string())
        .spawn(move || {
            for signal in signals.forever() {
                record_signal(signal);
            }
        })?;

    Ok(())
}

fn record_signal(signal: i32) {
    let (lock, cvar) = shutdown_state();
    let mut received = lock.lock();
    match *received {
        None => {
            *received = Some(signal);
            cvar.notify_all();
            tracing::info!(signal, "shutdown requested");
        }
        Some(first) => {
            tracing::info!(signal, first, "already shutting down; ignoring signal");
        }
    }
}

/// The first shutdown signal received, if any.
pub fn shutdown_signal() -> Option<i32> {
    *shutdown_state().0.lock()
}

/// Check if shutdown was requested.
pub fn shutdown_requested() -> bool {
    shutdown_signal().is_some()
}

/// Block until a shutdown signal arrives and return it.
///
/// Returns immediately if one was already received. There is no timeout.
pub fn wait_for_shutdown() -> i32 {
    let (lock, cvar) = shutdown_state();
    let mut received = lock.lock();
    loop {
        if let Some(signal) = *received {
            return signal;
        }
        cvar.wait(&mut received);
    }
}

/// Wait for a shutdown signal for at most `timeout`.
pub fn wait_for_shutdown_timeout(timeout: Duration) -> Option<i32> {
    let (lock, cvar) = shutdown_state();
    let mut received = lock.lock();
    if received.is_none() {
        let _ = cvar.wait_for(&mut received, timeout);
    }
    *received
}

#[cfg(test)]
fn clear_shutdown() {
    *shutdown_state().0.lock() = None;
}
