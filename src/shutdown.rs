//! Termination signals as a cancellation flag.
//!
//! The dispatch loop checks the flag between batches, so a signal never
//! interrupts a directory walk or a quarantine action halfway through.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use signal_hook::consts::{SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;

/// Signals that request a graceful shutdown.
pub const TERMINATION_SIGNALS: [i32; 3] = [SIGINT, SIGTERM, SIGQUIT];

/// Fresh, unset cancellation flag.
pub fn shutdown_flag() -> Arc<AtomicBool> {
    Arc::new(AtomicBool::new(false))
}

/// Route SIGINT, SIGTERM and SIGQUIT into `flag`.
///
/// Handlers are registered before this returns. A background thread
/// waits for the first signal, logs it and sets the flag.
pub fn install_signal_handlers(flag: Arc<AtomicBool>) -> io::Result<()> {
    let mut signals = Signals::new(TERMINATION_SIGNALS)?;

    thread::Builder::new()
        .name("cdog-signals".to_string())
        .spawn(move || {
            if let Some(sig) = signals.forever().next() {
                crate::log_event!("shutdown", "received signal", "{sig}");
                flag.store(true, Ordering::SeqCst);
            }
        })?;

    Ok(())
}
