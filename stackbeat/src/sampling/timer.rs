//! Per-thread interval timers and fork safety
//!
//! On Linux each registered thread gets its own POSIX timer created with
//! `SIGEV_THREAD_ID`, so ticks are delivered as `SIGPROF` to exactly the
//! thread being sampled. Platforms without thread-targeted timers fall
//! back to one process-wide `setitimer` interval armed at install time;
//! the kernel then picks a victim thread per tick and the context check
//! in the handler sorts out misdeliveries.
//!
//! Timer setup failures are logged and swallowed: a thread that cannot
//! get a timer simply runs unsampled. The profiler must never
//! destabilize the host.
//!
//! Fork safety: `pthread_atfork` hooks disarm the forking thread's timer
//! before the fork and re-arm it in the parent. The child inherits no
//! timers (kernel semantics) and must re-register explicitly.

#![allow(unsafe_code)] // raw libc timer and signal-mask plumbing

use std::io;
use std::sync::atomic::Ordering;
use std::sync::Once;

use log::error;
#[cfg(target_os = "linux")]
use log::warn;

#[cfg(target_os = "linux")]
use stackbeat_common::SAMPLE_INTERVAL_NANOS;

use crate::domain::{SamplerError, Tid};

use super::thread_state::SAMPLER;
#[cfg(target_os = "linux")]
use super::thread_state::ThreadSampler;

/// Kernel thread id of the calling thread (0 where unavailable)
#[must_use]
pub fn current_tid() -> Tid {
    #[cfg(target_os = "linux")]
    #[allow(clippy::cast_possible_truncation)]
    {
        Tid(unsafe { libc::syscall(libc::SYS_gettid) } as libc::pid_t)
    }
    #[cfg(not(target_os = "linux"))]
    {
        Tid(0)
    }
}

#[cfg(target_os = "linux")]
unsafe fn sigprof_mask() -> libc::sigset_t {
    let mut mask: libc::sigset_t = std::mem::zeroed();
    libc::sigemptyset(&mut mask);
    libc::sigaddset(&mut mask, libc::SIGPROF);
    mask
}

/// Create (but do not arm) a timer targeting the calling thread.
#[cfg(target_os = "linux")]
pub(crate) fn create_thread_timer(sampler: &ThreadSampler) {
    let mut event: libc::sigevent = unsafe { std::mem::zeroed() };
    event.sigev_notify = libc::SIGEV_THREAD_ID;
    event.sigev_signo = libc::SIGPROF;
    event.sigev_notify_thread_id = current_tid().0;

    let mut timer: libc::timer_t = std::ptr::null_mut();
    if unsafe { libc::timer_create(libc::CLOCK_MONOTONIC, &mut event, &mut timer) } == -1 {
        error!("{}", SamplerError::TimerCreate(io::Error::last_os_error()));
        return;
    }
    sampler.install_timer(timer);
}

/// Start the periodic tick for this thread.
#[cfg(target_os = "linux")]
pub(crate) fn arm_thread_timer(sampler: &ThreadSampler) {
    if !sampler.registered.load(Ordering::Acquire) {
        return;
    }
    let timer = sampler.timer_handle();
    if timer.is_null() {
        // Creation failed at registration; the thread runs unsampled.
        return;
    }

    #[allow(clippy::cast_possible_truncation)]
    let interval =
        libc::timespec { tv_sec: 0, tv_nsec: SAMPLE_INTERVAL_NANOS as libc::c_long };
    let spec = libc::itimerspec { it_interval: interval, it_value: interval };

    unsafe {
        // Hold SIGPROF while the timer is reprogrammed so a tick cannot
        // land against half-written timer state.
        let mask = sigprof_mask();
        if libc::pthread_sigmask(libc::SIG_BLOCK, &mask, std::ptr::null_mut()) != 0 {
            warn!("failed to block SIGPROF around timer arm");
        }
        if libc::timer_settime(timer, 0, &spec, std::ptr::null_mut()) == -1 {
            error!("{}", SamplerError::TimerArm(io::Error::last_os_error()));
        }
        if libc::pthread_sigmask(libc::SIG_UNBLOCK, &mask, std::ptr::null_mut()) != 0 {
            warn!("failed to unblock SIGPROF after timer arm");
        }
    }
}

/// Stop the periodic tick for this thread (the timer object survives).
#[cfg(target_os = "linux")]
pub(crate) fn disarm_thread_timer(sampler: &ThreadSampler) {
    if !sampler.registered.load(Ordering::Acquire) {
        return;
    }
    let timer = sampler.timer_handle();
    if timer.is_null() {
        return;
    }
    let spec: libc::itimerspec = unsafe { std::mem::zeroed() };
    if unsafe { libc::timer_settime(timer, 0, &spec, std::ptr::null_mut()) } == -1 {
        error!("{}", SamplerError::TimerDisarm(io::Error::last_os_error()));
    }
}

/// Destroy this thread's timer entirely (unregistration path).
#[cfg(target_os = "linux")]
pub(crate) fn delete_thread_timer(sampler: &ThreadSampler) {
    let timer = sampler.take_timer();
    if !timer.is_null() {
        unsafe {
            libc::timer_delete(timer);
        }
    }
}

/// Arm the process-wide interval timer (platforms without per-thread
/// timers). Called once from `install()`.
#[cfg(not(target_os = "linux"))]
pub(crate) fn arm_process_timer() {
    use stackbeat_common::SAMPLE_INTERVAL_NANOS;

    #[allow(clippy::cast_possible_truncation)]
    let interval = libc::timeval {
        tv_sec: 0,
        tv_usec: (SAMPLE_INTERVAL_NANOS / 1_000) as libc::suseconds_t,
    };
    let timer = libc::itimerval { it_interval: interval, it_value: interval };
    if unsafe { libc::setitimer(libc::ITIMER_PROF, &timer, std::ptr::null_mut()) } == -1 {
        error!("{}", SamplerError::ProcessTimer(io::Error::last_os_error()));
    }
}

static FORK_HOOKS: Once = Once::new();

/// Register the atfork pair once per process (first thread registration).
pub(crate) fn install_fork_hooks() {
    FORK_HOOKS.call_once(|| {
        let rc = unsafe { libc::pthread_atfork(Some(fork_prepare), Some(fork_resume), None) };
        if rc != 0 {
            error!("{}", SamplerError::ForkHooks(io::Error::from_raw_os_error(rc)));
        }
    });
}

/// Runs on the forking thread just before the fork: quiesce its timer so
/// no tick lands mid-fork.
unsafe extern "C" fn fork_prepare() {
    let _ = SAMPLER.try_with(|sampler| {
        if sampler.sampling_enabled.load(Ordering::Acquire) {
            #[cfg(target_os = "linux")]
            disarm_thread_timer(sampler);
        }
    });
}

/// Runs in the parent after the fork: pick sampling back up. The child
/// gets nothing; it must register and start explicitly.
unsafe extern "C" fn fork_resume() {
    let _ = SAMPLER.try_with(|sampler| {
        if sampler.sampling_enabled.load(Ordering::Acquire) {
            #[cfg(target_os = "linux")]
            arm_thread_timer(sampler);
        }
    });
}
