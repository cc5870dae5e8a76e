//! Thread-facing control surface
//!
//! Every operation here acts on the calling thread's own sampler state;
//! nothing reaches across threads. The usual lifecycle is
//!
//! ```text
//! install()  (once, process-wide)
//!   register_thread(bridge)
//!     start_sampling() ... ticks accumulate traces ... stop_sampling(..)
//!     update_indexes(..) / drain_frames()  per layer
//!   unregister_thread()
//! ```
//!
//! All operations return plain acks and degrade gracefully on misuse
//! (logged, never panicking): the sampler must never take the host
//! application down.

#![allow(unsafe_code)] // owner-side access to the raw trace store

use std::sync::atomic::Ordering;
use std::sync::Arc;

use log::warn;
use stackbeat_common::{SkipCounters, MAX_FRAMES_PER_TRACE};

use crate::domain::FrameHandle;
use crate::runtime::{GcRootRef, RuntimeBridge};

use super::thread_state::{BridgeCell, SAMPLER};
use super::timer;
use super::trace::{TraceLine, TraceStore};

/// Register the calling thread for sampling.
///
/// Allocates the trace buffer, tells the collector about it, binds the
/// sampler to the current logical context, installs the process fork
/// hooks (first registration only) and creates, without arming, the
/// per-thread timer. Idempotent: re-registering an already-registered
/// thread is a success no-op.
pub fn register_thread(bridge: Arc<dyn RuntimeBridge>) -> bool {
    SAMPLER.with(|sampler| {
        if sampler.registered.load(Ordering::Acquire) {
            return true;
        }

        sampler.reset_measurement_state();
        sampler.bind_context(bridge.current_context());

        let store = Box::into_raw(Box::new(TraceStore::new()));
        bridge.register_gc_root(GcRootRef(store as usize));
        sampler.install_store(store);

        sampler.install_bridge(Box::into_raw(Box::new(BridgeCell(bridge))));

        timer::install_fork_hooks();
        #[cfg(target_os = "linux")]
        timer::create_thread_timer(sampler);

        sampler.registered.store(true, Ordering::Release);
        true
    })
}

/// Unregister the calling thread, releasing its buffer and timer.
///
/// Irreversible for the allocated state: a later `register_thread` starts
/// from scratch. Callers must stop sampling first so no interrupt or
/// deferred capture is in flight (the ticks that do land after the
/// enabled flag drops degrade to no-ops). No-op if not registered.
pub fn unregister_thread() -> bool {
    SAMPLER.with(|sampler| {
        if !sampler.registered.load(Ordering::Acquire) {
            return true;
        }

        sampler.sampling_enabled.store(false, Ordering::Release);

        #[cfg(target_os = "linux")]
        timer::delete_thread_timer(sampler);

        let store = sampler.take_store();
        if !store.is_null() {
            if let Some(bridge) = sampler.bridge() {
                bridge.unregister_gc_root(GcRootRef(store as usize));
            }
            // SAFETY: allocated by register_thread on this thread; the
            // handler no longer runs (enabled is false, timer deleted)
            // and the pointer was swapped out, so this is the last ref.
            drop(unsafe { Box::from_raw(store) });
        }

        let cell = sampler.take_bridge();
        if !cell.is_null() {
            // SAFETY: same ownership argument as the store above.
            drop(unsafe { Box::from_raw(cell) });
        }

        sampler.registered.store(false, Ordering::Release);
        true
    })
}

/// Begin capturing on the calling thread: enable the flag and arm the
/// thread's timer. Fails (logged) if the thread never registered.
pub fn start_sampling() -> bool {
    SAMPLER.with(|sampler| {
        if !sampler.registered.load(Ordering::Acquire) {
            warn!("start_sampling on a thread that never registered");
            return false;
        }
        sampler.sampling_enabled.store(true, Ordering::Release);
        #[cfg(target_os = "linux")]
        timer::arm_thread_timer(sampler);
        true
    })
}

/// Stop capturing on the calling thread and disarm its timer.
///
/// With `reset`, additionally zero all indices and diagnostic counters:
/// a full state reset for reusing the thread in a new measurement epoch.
/// In-flight ticks and deferred captures are not cancelled; they observe
/// the cleared enabled flag and fall through.
pub fn stop_sampling(reset: bool) -> bool {
    SAMPLER.with(|sampler| {
        if sampler.sampling_enabled.load(Ordering::Acquire) {
            #[cfg(target_os = "linux")]
            timer::disarm_thread_timer(sampler);
        }
        sampler.sampling_enabled.store(false, Ordering::Release);

        if reset {
            sampler.reset_measurement_state();
        }
        true
    })
}

/// Mark the layer boundary: frames below `frame_index` and traces below
/// `trace_index` belong to an enclosing layer and are excluded from
/// captures and drains respectively.
///
/// Stored verbatim; keeping `trace_index` within the currently buffered
/// range is the caller's contract.
pub fn update_indexes(frame_index: u16, trace_index: u16) -> bool {
    SAMPLER.with(|sampler| {
        sampler.start_trace_index.store(trace_index, Ordering::Release);
        sampler.start_frame_index.store(frame_index, Ordering::Release);
        true
    })
}

/// Number of traces currently buffered on the calling thread.
#[must_use]
pub fn current_trace_index() -> u16 {
    SAMPLER.with(|sampler| sampler.trace_count.load(Ordering::Acquire))
}

/// Depth of the calling context's stack right now, minus the current
/// frame itself (0 when there is no caller to attribute to).
///
/// Captured synchronously, which is legal here because this runs on the
/// thread being measured, in normal context, not under the interrupt path.
#[must_use]
pub fn current_frame_index() -> u16 {
    SAMPLER.with(|sampler| {
        let Some(bridge) = sampler.bridge() else {
            return 0;
        };
        let mut frames = [FrameHandle::NULL; MAX_FRAMES_PER_TRACE];
        let mut lines = [0i32; MAX_FRAMES_PER_TRACE];
        let depth = bridge.capture_stack(&mut frames, &mut lines);
        // depth is bounded by the capture buffer, far below u16::MAX
        u16::try_from(depth.saturating_sub(1)).unwrap_or(u16::MAX)
    })
}

/// Drain the current layer's traces from the calling thread's buffer.
///
/// Returns every buffered trace from the trim point up, skipping traces
/// that captured zero lines and screening every frame handle through the
/// runtime's validity check. Consumes the drained region: the trace
/// count rewinds to the trim point, so an immediate second drain is
/// empty. On an unregistered thread this logs, clears the count, and
/// returns nothing.
#[must_use]
pub fn drain_frames() -> Vec<Vec<TraceLine>> {
    SAMPLER.with(|sampler| {
        if !sampler.registered.load(Ordering::Acquire) {
            warn!("drain_frames on a thread that never registered");
            sampler.trace_count.store(0, Ordering::Release);
            return Vec::new();
        }

        let count = usize::from(sampler.trace_count.load(Ordering::Acquire));
        let start = usize::from(sampler.start_trace_index.load(Ordering::Acquire));
        let store = sampler.store_ptr();
        let bridge = sampler.bridge();

        let mut traces = Vec::new();
        if count > start && !store.is_null() {
            traces.reserve(count - start);
            for index in start..count {
                // SAFETY: owner-side read; capture only appends past
                // `count` and the handler never touches the store.
                let slot = unsafe { (*store).slot(index) };
                if slot.len == 0 {
                    continue;
                }
                let mut lines = Vec::with_capacity(usize::from(slot.len));
                for (frame, line) in slot.pairs() {
                    // Handles can go stale across a collection even with
                    // the root registered; drop them rather than hand
                    // out dangling references.
                    if bridge.is_none_or(|b| b.frame_is_valid(frame)) {
                        lines.push(TraceLine { frame, line });
                    } else {
                        warn!("dropping invalid frame handle {frame} from drained trace");
                    }
                }
                traces.push(lines);
            }
        }

        #[allow(clippy::cast_possible_truncation)]
        sampler.trace_count.store(start as u16, Ordering::Release);
        traces
    })
}

/// Snapshot of the calling thread's dropped-sample diagnostics.
#[must_use]
pub fn skip_counters() -> SkipCounters {
    SAMPLER.with(super::thread_state::ThreadSampler::skip_counters)
}

/// Hand every buffered frame handle on the calling thread to the
/// collector's visitor.
///
/// The runtime invokes this (through the registered GC root) while
/// marking, on the owning thread, so no handle is reclaimed out from
/// under the buffer before it is drained.
pub fn mark_live_frames(visit: &mut dyn FnMut(FrameHandle)) {
    SAMPLER.with(|sampler| {
        let store = sampler.store_ptr();
        if store.is_null() {
            return;
        }
        let count = usize::from(sampler.trace_count.load(Ordering::Acquire));
        for index in 0..count {
            // SAFETY: owner-side read, same argument as drain_frames.
            let slot = unsafe { (*store).slot(index) };
            for (frame, _) in slot.pairs() {
                visit(frame);
            }
        }
    });
}
