//! Per-thread sampler state
//!
//! Every registered thread owns one [`ThreadSampler`], reached through a
//! const-initialized thread-local so the interrupt handler can get at it
//! without allocation or locking. The access pattern is single writer
//! plus one asynchronous writer: only the owning OS thread mutates the
//! state, but its own signal handler may interleave at any instruction
//! boundary, so every field is an atomic.
//!
//! Heap-backed pieces (the trace store, the runtime bridge) hang off
//! `AtomicPtr`s. They are installed by `register_thread` and torn down by
//! `unregister_thread`, both in normal context; the handler only ever
//! loads the pointers and bails on null.

#![allow(unsafe_code)] // raw-pointer access to the store and bridge cells

use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU16, AtomicU32, AtomicU64, Ordering};

use stackbeat_common::SkipCounters;

use crate::domain::ContextId;
use crate::runtime::RuntimeBridge;

use super::trace::TraceStore;

/// Holder for the per-thread bridge, boxed so a thin pointer can sit in
/// an `AtomicPtr` (trait-object pointers are fat).
pub(crate) struct BridgeCell(pub std::sync::Arc<dyn RuntimeBridge>);

pub(crate) struct ThreadSampler {
    pub registered: AtomicBool,
    pub sampling_enabled: AtomicBool,
    /// Reentrancy guard: held for the duration of one handler invocation.
    pub in_handler: AtomicBool,
    /// A deferred capture is queued and has not run yet.
    pub capture_pending: AtomicBool,

    /// Frames below this index belong to an outer layer; captures count
    /// only what sits above it.
    pub start_frame_index: AtomicU16,
    /// Traces below this index belong to an outer layer; drains start here.
    pub start_trace_index: AtomicU16,
    /// Number of valid traces in the store.
    pub trace_count: AtomicU16,

    pub skipped_in_gc: AtomicU32,
    pub skipped_in_handler: AtomicU32,
    pub skipped_in_pending: AtomicU32,
    pub skipped_not_current: AtomicU32,

    /// Logical context this sampler was registered from.
    owning_context: AtomicU64,

    bridge: AtomicPtr<BridgeCell>,
    store: AtomicPtr<TraceStore>,

    /// Per-thread POSIX timer id (`timer_t`), null until created.
    #[cfg(target_os = "linux")]
    timer: AtomicPtr<libc::c_void>,
}

thread_local! {
    pub(crate) static SAMPLER: ThreadSampler = const { ThreadSampler::new() };
}

impl ThreadSampler {
    pub const fn new() -> Self {
        Self {
            registered: AtomicBool::new(false),
            sampling_enabled: AtomicBool::new(false),
            in_handler: AtomicBool::new(false),
            capture_pending: AtomicBool::new(false),
            start_frame_index: AtomicU16::new(0),
            start_trace_index: AtomicU16::new(0),
            trace_count: AtomicU16::new(0),
            skipped_in_gc: AtomicU32::new(0),
            skipped_in_handler: AtomicU32::new(0),
            skipped_in_pending: AtomicU32::new(0),
            skipped_not_current: AtomicU32::new(0),
            owning_context: AtomicU64::new(0),
            bridge: AtomicPtr::new(ptr::null_mut()),
            store: AtomicPtr::new(ptr::null_mut()),
            #[cfg(target_os = "linux")]
            timer: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// The bridge this thread registered with, if any.
    ///
    /// Async-signal-safe: one atomic load plus a pointer dereference.
    pub fn bridge(&self) -> Option<&dyn RuntimeBridge> {
        let cell = self.bridge.load(Ordering::Acquire);
        if cell.is_null() {
            return None;
        }
        // SAFETY: the cell is owned by this thread's sampler; it is only
        // freed by unregister_thread, which requires sampling stopped and
        // runs in normal context on this same thread, so no use can
        // outlive it.
        Some(unsafe { &*(*cell).0 })
    }

    pub fn install_bridge(&self, cell: *mut BridgeCell) {
        self.bridge.store(cell, Ordering::Release);
    }

    pub fn take_bridge(&self) -> *mut BridgeCell {
        self.bridge.swap(ptr::null_mut(), Ordering::AcqRel)
    }

    pub fn store_ptr(&self) -> *mut TraceStore {
        self.store.load(Ordering::Acquire)
    }

    pub fn install_store(&self, store: *mut TraceStore) {
        self.store.store(store, Ordering::Release);
    }

    pub fn take_store(&self) -> *mut TraceStore {
        self.store.swap(ptr::null_mut(), Ordering::AcqRel)
    }

    pub fn owning_context(&self) -> ContextId {
        ContextId(self.owning_context.load(Ordering::Acquire))
    }

    pub fn bind_context(&self, context: ContextId) {
        self.owning_context.store(context.0, Ordering::Release);
    }

    #[cfg(target_os = "linux")]
    pub fn timer_handle(&self) -> libc::timer_t {
        self.timer.load(Ordering::Acquire)
    }

    #[cfg(target_os = "linux")]
    pub fn install_timer(&self, timer: libc::timer_t) {
        self.timer.store(timer, Ordering::Release);
    }

    #[cfg(target_os = "linux")]
    pub fn take_timer(&self) -> libc::timer_t {
        self.timer.swap(ptr::null_mut(), Ordering::AcqRel)
    }

    /// Snapshot the dropped-sample diagnostics.
    pub fn skip_counters(&self) -> SkipCounters {
        SkipCounters {
            in_gc: self.skipped_in_gc.load(Ordering::Relaxed),
            in_handler: self.skipped_in_handler.load(Ordering::Relaxed),
            in_pending: self.skipped_in_pending.load(Ordering::Relaxed),
            not_current: self.skipped_not_current.load(Ordering::Relaxed),
        }
    }

    /// Zero every index, flag, and counter that belongs to a measurement
    /// epoch. Used at registration and by `stop_sampling(reset = true)`.
    pub fn reset_measurement_state(&self) {
        self.capture_pending.store(false, Ordering::Release);
        self.in_handler.store(false, Ordering::Release);
        self.start_trace_index.store(0, Ordering::Release);
        self.start_frame_index.store(0, Ordering::Release);
        self.trace_count.store(0, Ordering::Release);
        self.skipped_in_gc.store(0, Ordering::Relaxed);
        self.skipped_in_handler.store(0, Ordering::Relaxed);
        self.skipped_in_pending.store(0, Ordering::Relaxed);
        self.skipped_not_current.store(0, Ordering::Relaxed);
    }
}
