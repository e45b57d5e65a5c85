#![cfg(unix)]
//! Minimal POSIX signal handling: SIGINT/SIGTERM flip an atomic flag that
//! the loop owner polls from a housekeeping timer.  The flag keeps actual
//! stop handling on the loop thread itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

static INIT: Once = Once::new();
static TERMINATE: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_sig(_sig: libc::c_int) {
    TERMINATE.store(true, Ordering::SeqCst);
}

/// Install SIGINT/SIGTERM handlers (idempotent).
pub fn init_term_signals() {
    INIT.call_once(|| unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = handle_sig as extern "C" fn(libc::c_int) as libc::sighandler_t;
        action.sa_flags = libc::SA_RESTART;
        let _ = libc::sigaction(libc::SIGINT, &action, std::ptr::null_mut());
        let _ = libc::sigaction(libc::SIGTERM, &action, std::ptr::null_mut());
    });
}

/// Returns true if a termination signal was received.
pub fn should_terminate() -> bool {
    TERMINATE.load(Ordering::SeqCst)
}
