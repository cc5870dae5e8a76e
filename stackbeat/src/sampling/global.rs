//! Process-wide install/run state
//!
//! Two flags with a deliberately one-way lifecycle: `installed` is set by
//! the first `install()` and never cleared (there is no safe point at
//! which the signal handler could be torn down while registered threads
//! may still take a tick), and `running` is an advisory process-level
//! switch that consumers flip around measurement windows. Per-thread
//! timers are armed and disarmed thread-locally by `start_sampling` /
//! `stop_sampling`, never from here.

#![allow(unsafe_code)] // sigaction registration requires raw libc

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{error, info};

use crate::domain::SamplerError;

use super::interrupt::sample_signal_handler;

static INSTALLED: AtomicBool = AtomicBool::new(false);
static RUNNING: AtomicBool = AtomicBool::new(false);

/// Install the sampling signal handler (and, on platforms without
/// per-thread timers, arm the process-wide interval timer).
///
/// Returns `true` the first time; `false` on every later call. Install
/// is one-way for the life of the process: after [`uninstall`] (a no-op)
/// it cannot be repeated, so callers wanting to pause use the global and
/// per-thread stop operations instead.
pub fn install() -> bool {
    if INSTALLED.swap(true, Ordering::AcqRel) {
        return false;
    }

    if let Err(e) = install_signal_handler() {
        // Keep going unsampled; ticks will be delivered to the default
        // disposition only if something else arms a SIGPROF timer, and
        // we arm nothing without a handler in place.
        error!("{e}");
        return true;
    }

    #[cfg(not(target_os = "linux"))]
    super::timer::arm_process_timer();

    info!("sampling signal handler installed");
    true
}

/// Deliberately a no-op.
///
/// Freeing handler state while any registered thread's timer can still
/// fire is a use-after-free; the safe equivalent is `stop_sampling` +
/// `unregister_thread` on every thread, which quiesces every tick source
/// while leaving the (tiny, static) handler installed.
pub fn uninstall() {}

/// Flip the advisory process-wide running flag on.
pub fn start() -> bool {
    RUNNING.store(true, Ordering::Release);
    true
}

/// Flip the advisory process-wide running flag off.
pub fn stop() -> bool {
    RUNNING.store(false, Ordering::Release);
    true
}

/// Whether `install()` has ever run.
#[must_use]
pub fn is_installed() -> bool {
    INSTALLED.load(Ordering::Acquire)
}

/// The advisory process-wide running flag.
#[must_use]
pub fn is_running() -> bool {
    RUNNING.load(Ordering::Acquire)
}

fn install_signal_handler() -> Result<(), SamplerError> {
    // SAFETY: registering a handler that touches only thread-local
    // atomics and signal-safe bridge operations; SA_RESTART so
    // interrupted syscalls in the host application resume transparently.
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = sample_signal_handler as usize;
        action.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&mut action.sa_mask);
        if libc::sigaction(libc::SIGPROF, &action, std::ptr::null_mut()) != 0 {
            return Err(SamplerError::SignalInstall(io::Error::last_os_error()));
        }
    }
    Ok(())
}
