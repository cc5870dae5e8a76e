//! Interrupt handler and deferred capture routine
//!
//! The two halves of the deferred-capture protocol:
//!
//! 1. [`sample_signal_handler`] runs in interrupt context when the
//!    sampling timer fires. It may only touch this thread's atomics and
//!    the three signal-safe bridge operations; all it does is decide
//!    whether to ask the runtime to run a capture later.
//! 2. [`run_deferred_capture`] runs when the runtime drains its
//!    safepoint queue, on the same thread but in normal context, where
//!    calling the stack-introspection primitive is legal. Every
//!    precondition is re-checked because anything may have changed
//!    between the tick and the callback.
//!
//! Neither half ever blocks, allocates, or takes a lock. At most one
//! deferred capture is outstanding per thread (`capture_pending`), and at
//! most one handler invocation runs at a time (`in_handler`).

#![allow(unsafe_code)] // owner-side writes into the raw trace store

use std::sync::atomic::Ordering;

use stackbeat_common::MAX_BUFFERED_TRACES;

use super::thread_state::{ThreadSampler, SAMPLER};

/// Frames discarded from the bottom of every counted window.
///
/// The introspection primitive reads back the two outermost frame
/// objects garbled on the runtimes this was measured against; the value
/// is empirical, not derived. A capture whose window is nothing but
/// those frames is discarded outright.
pub(crate) const BOTTOM_FRAME_SKIP: u16 = 2;

/// Signal handler body. Installed for `SIGPROF` by `install()`.
///
/// Restricted context: decide, count, maybe enqueue. Nothing else.
pub(crate) extern "C" fn sample_signal_handler(_sig: libc::c_int) {
    // TLS can already be gone if the signal lands during thread teardown.
    let _ = SAMPLER.try_with(handle_tick);
}

/// One tick of the interrupt-side protocol (spelled out so tests can
/// drive it without delivering real signals).
pub(crate) fn handle_tick(sampler: &ThreadSampler) {
    if !sampler.sampling_enabled.load(Ordering::Acquire) {
        return;
    }

    // Reentrancy guard. A nested tick backs out and is counted; the
    // compare-exchange makes the claim and the check one step.
    if sampler
        .in_handler
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        sampler.skipped_in_handler.fetch_add(1, Ordering::Relaxed);
        return;
    }

    if let Some(bridge) = sampler.bridge() {
        if bridge.gc_in_progress() {
            sampler.skipped_in_gc.fetch_add(1, Ordering::Relaxed);
        } else if bridge.current_context() != sampler.owning_context() {
            sampler.skipped_not_current.fetch_add(1, Ordering::Relaxed);
        } else if !sampler.capture_pending.load(Ordering::Acquire) {
            if bridge.enqueue_deferred(run_deferred_capture).is_queued() {
                sampler.capture_pending.store(true, Ordering::Release);
            } else {
                sampler.skipped_in_pending.fetch_add(1, Ordering::Relaxed);
            }
        }
        // else: a capture is already queued; never double-queue.
    }

    sampler.in_handler.store(false, Ordering::Release);
}

/// Deferred capture entry point, run by the host runtime's safepoint
/// queue on the thread that requested it.
///
/// Public because the runtime's queue needs a plain function to call;
/// embedders and tests may also invoke it directly to force a capture
/// at a known point.
pub fn run_deferred_capture() {
    let _ = SAMPLER.try_with(|sampler| {
        record_sample(sampler);
        // Cleared on every exit path, including the skip returns above:
        // a wedged pending flag would silence sampling permanently.
        sampler.capture_pending.store(false, Ordering::Release);
    });
}

/// Capture one trace into the next free slot, if the world still allows.
fn record_sample(sampler: &ThreadSampler) {
    if !sampler.sampling_enabled.load(Ordering::Acquire) {
        return;
    }
    let Some(bridge) = sampler.bridge() else {
        return;
    };
    if bridge.gc_in_progress() {
        sampler.skipped_in_gc.fetch_add(1, Ordering::Relaxed);
        return;
    }
    if bridge.current_context() != sampler.owning_context() {
        sampler.skipped_not_current.fetch_add(1, Ordering::Relaxed);
        return;
    }

    let count = sampler.trace_count.load(Ordering::Acquire);
    if usize::from(count) >= MAX_BUFFERED_TRACES {
        // Buffer full: the sample is dropped without a counter.
        return;
    }
    let store = sampler.store_ptr();
    if store.is_null() {
        return;
    }

    let start_frame = sampler.start_frame_index.load(Ordering::Acquire);

    // SAFETY: the store is owned by this thread and only freed by
    // unregister_thread (normal context, this thread, sampling stopped);
    // the interrupt handler never touches it, so this is the only live
    // access.
    let slot = unsafe { (*store).slot_mut(usize::from(count)) };
    let captured = bridge.capture_stack(&mut slot.frames, &mut slot.lines);

    // Frames below the trim index belong to an outer layer; the bottom
    // window additionally loses BOTTOM_FRAME_SKIP unreliable frames. A
    // capture with nothing left after both is discarded uncounted.
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    let usable = captured as i32 - i32::from(start_frame) - i32::from(BOTTOM_FRAME_SKIP);
    if usable > 0 {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        {
            slot.len = usable as u16;
        }
        sampler.trace_count.store(count + 1, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use crate::domain::ContextId;
    use crate::runtime::{RuntimeBridge, SyntheticRuntime};
    use crate::sampling::thread_state::{BridgeCell, SAMPLER};
    use crate::sampling::trace::TraceStore;

    use super::*;

    /// Wire a synthetic bridge and store straight into this thread's
    /// sampler, bypassing timer creation entirely (no signals in unit
    /// tests). Each test runs on its own thread, so TLS starts fresh.
    fn wire_thread(depth: usize) -> Arc<SyntheticRuntime> {
        let rt = Arc::new(SyntheticRuntime::with_stack_depth(depth));
        SAMPLER.with(|s| {
            s.reset_measurement_state();
            s.bind_context(rt.current_context());
            s.install_store(Box::into_raw(Box::new(TraceStore::new())));
            s.install_bridge(Box::into_raw(Box::new(BridgeCell(rt.clone()))));
            s.registered.store(true, Ordering::Release);
            s.sampling_enabled.store(true, Ordering::Release);
        });
        rt
    }

    fn unwire_thread() {
        SAMPLER.with(|s| {
            s.sampling_enabled.store(false, Ordering::Release);
            let store = s.take_store();
            if !store.is_null() {
                drop(unsafe { Box::from_raw(store) });
            }
            let cell = s.take_bridge();
            if !cell.is_null() {
                drop(unsafe { Box::from_raw(cell) });
            }
            s.registered.store(false, Ordering::Release);
        });
    }

    fn tick() {
        SAMPLER.with(handle_tick);
    }

    fn trace_count() -> u16 {
        SAMPLER.with(|s| s.trace_count.load(Ordering::Acquire))
    }

    #[test]
    fn test_tick_enqueues_one_capture() {
        let rt = wire_thread(10);
        tick();
        assert!(rt.job_pending());
        SAMPLER.with(|s| assert!(s.capture_pending.load(Ordering::Acquire)));

        // A second tick must not queue again while one is pending
        tick();
        SAMPLER.with(|s| assert_eq!(s.skip_counters().total(), 0));
        assert!(rt.run_deferred());
        assert!(!rt.run_deferred());
        assert_eq!(trace_count(), 1);
        unwire_thread();
    }

    #[test]
    fn test_reentrant_tick_is_counted_not_run() {
        let rt = wire_thread(10);
        SAMPLER.with(|s| s.in_handler.store(true, Ordering::Release));
        for _ in 0..3 {
            tick();
        }
        SAMPLER.with(|s| {
            assert_eq!(s.skip_counters().in_handler, 3);
            // The nested ticks queued nothing and touched no other state
            assert!(!s.capture_pending.load(Ordering::Acquire));
        });
        assert!(!rt.job_pending());
        SAMPLER.with(|s| s.in_handler.store(false, Ordering::Release));
        unwire_thread();
    }

    #[test]
    fn test_tick_during_gc_is_counted() {
        let rt = wire_thread(10);
        rt.set_gc_active(true);
        tick();
        SAMPLER.with(|s| assert_eq!(s.skip_counters().in_gc, 1));
        assert!(!rt.job_pending());
        unwire_thread();
    }

    #[test]
    fn test_tick_on_foreign_context_is_counted() {
        let rt = wire_thread(10);
        rt.switch_context(ContextId(99));
        tick();
        SAMPLER.with(|s| assert_eq!(s.skip_counters().not_current, 1));
        assert!(!rt.job_pending());
        unwire_thread();
    }

    #[test]
    fn test_tick_with_full_queue_is_counted() {
        let rt = wire_thread(10);
        rt.reject_deferred(true);
        tick();
        SAMPLER.with(|s| {
            assert_eq!(s.skip_counters().in_pending, 1);
            assert!(!s.capture_pending.load(Ordering::Acquire));
        });
        unwire_thread();
    }

    #[test]
    fn test_disabled_tick_touches_nothing() {
        let rt = wire_thread(10);
        SAMPLER.with(|s| s.sampling_enabled.store(false, Ordering::Release));
        tick();
        SAMPLER.with(|s| assert_eq!(s.skip_counters().total(), 0));
        assert!(!rt.job_pending());
        unwire_thread();
    }

    #[test]
    fn test_gc_skip_in_deferred_still_clears_pending() {
        let rt = wire_thread(10);
        tick();
        assert!(rt.job_pending());
        // GC starts between the tick and the safepoint
        rt.set_gc_active(true);
        assert!(rt.run_deferred());
        SAMPLER.with(|s| {
            assert_eq!(s.skip_counters().in_gc, 1);
            assert!(!s.capture_pending.load(Ordering::Acquire));
        });
        assert_eq!(trace_count(), 0);

        // Once GC finishes, the next tick can queue again
        rt.set_gc_active(false);
        tick();
        assert!(rt.job_pending());
        unwire_thread();
    }

    #[test]
    fn test_capture_applies_bottom_frame_skip() {
        let rt = wire_thread(10);
        run_deferred_capture();
        assert_eq!(trace_count(), 1);
        SAMPLER.with(|s| {
            let store = s.store_ptr();
            let len = unsafe { (*store).slot(0).len };
            assert_eq!(len, 10 - BOTTOM_FRAME_SKIP);
        });
        drop(rt);
        unwire_thread();
    }

    #[test]
    fn test_shallow_capture_is_discarded() {
        // A 2-frame stack has nothing left after the bottom-frame skip
        let rt = wire_thread(2);
        run_deferred_capture();
        assert_eq!(trace_count(), 0);
        drop(rt);
        unwire_thread();
    }
}
