//! Graceful shutdown on SIGINT/SIGTERM

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;

use crate::backlog::Backlog;
use crate::sample::Sample;

/// Global shutdown flag, set by the signal watcher
pub fn shutdown_flag() -> &'static AtomicBool {
    static FLAG: AtomicBool = AtomicBool::new(false);
    &FLAG
}

/// Check if shutdown was requested
pub fn is_shutdown_requested() -> bool {
    shutdown_flag().load(Ordering::Relaxed)
}

/// Request shutdown and close the backlog, waking the worker out of any wait.
///
/// Returns `true` for the call that initiated the shutdown.
pub fn request_shutdown(backlog: &Backlog<Sample>) -> bool {
    if shutdown_flag().swap(true, Ordering::Relaxed) {
        return false;
    }
    let dropped = backlog.close();
    log::warn!("Shutdown requested, {dropped} queued samples dropped");
    true
}

/// Spawn a thread watching SIGINT/SIGTERM.
///
/// First signal: close the backlog so the worker stops at its next
/// suspension point. Second signal: exit immediately with status 130.
pub fn install_signal_handlers(backlog: Arc<Backlog<Sample>>) -> std::io::Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    std::thread::Builder::new()
        .name("weepost-signals".to_string())
        .spawn(move || {
            for signal in signals.forever() {
                if is_shutdown_requested() {
                    log::warn!("Second signal ({signal}), exiting now");
                    std::process::exit(130);
                }
                log::info!("Received signal {signal}, stopping (repeat to force)");
                request_shutdown(&backlog);
            }
        })?;
    Ok(())
}
