// SPDX-License-Identifier: MIT
#![allow(unsafe_code)]
//
// Terminal resize notification.
//
// A SIGWINCH handler sets one `AtomicBool`; whoever watches for resizes
// calls `take()` and re-runs the geometry probe when it returns `true`.
// Storing to an atomic is one of the few things a signal handler may do.
// The flag coalesces: ten resizes between two checks are one `true`.

use std::sync::Once;
use std::sync::atomic::{AtomicBool, Ordering};

/// Set by the SIGWINCH handler, cleared by [`take`].
static RESIZED: AtomicBool = AtomicBool::new(false);

static INSTALLED: Once = Once::new();

/// Install the SIGWINCH handler. Idempotent; a no-op off Unix.
pub fn install() {
    INSTALLED.call_once(install_handler);
}

/// Whether the terminal was resized since the last call. Clears the flag.
#[must_use]
pub fn take() -> bool {
    RESIZED.swap(false, Ordering::Relaxed)
}

#[cfg(unix)]
fn install_handler() {
    unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = sigwinch_handler as *const () as usize;
        // SA_RESTART keeps a blocked stdin read() from failing with EINTR.
        sa.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&raw mut sa.sa_mask);
        if libc::sigaction(libc::SIGWINCH, &raw const sa, std::ptr::null_mut()) != 0 {
            tracing::warn!(
                error = %std::io::Error::last_os_error(),
                "failed to install SIGWINCH handler"
            );
        }
    }
}

#[cfg(unix)]
extern "C" fn sigwinch_handler(_sig: libc::c_int) {
    RESIZED.store(true, Ordering::Relaxed);
}

#[cfg(not(unix))]
fn install_handler() {}

// ─── Tests ───────────────────────────────────────────────────────────────────
