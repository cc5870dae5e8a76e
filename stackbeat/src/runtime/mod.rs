//! Host-runtime collaborator contract
//!
//! The engine never walks stacks itself: the managed runtime owns stack
//! introspection, garbage collection, and the safepoint callback queue.
//! This module defines the narrow seam ([`RuntimeBridge`]) the engine
//! calls across, and a lock-free synthetic implementation used by the
//! diagnostic binary and the test suite.
//!
//! ## Signal-safety contract
//!
//! Three of the bridge operations are invoked from the sampling interrupt
//! handler and MUST be async-signal-safe in any real implementation:
//! [`RuntimeBridge::gc_in_progress`], [`RuntimeBridge::current_context`],
//! and [`RuntimeBridge::enqueue_deferred`]. No allocation, no locks, no
//! blocking. Everything else is only ever called from normal thread
//! context.

pub mod synthetic;

pub use synthetic::SyntheticRuntime;

use crate::domain::{ContextId, FrameHandle};

/// A deferred unit of work handed to the runtime's safepoint queue
///
/// Plain function pointer by design: the interrupt handler cannot
/// allocate a closure, and the runtime queue only needs something it can
/// call later on the same thread.
pub type DeferredJob = fn();

/// Outcome of [`RuntimeBridge::enqueue_deferred`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredStatus {
    /// The job was accepted and will run at the next safepoint
    Queued,
    /// An identical job was already waiting; nothing new was queued
    AlreadyQueued,
    /// The queue is full; the job was dropped
    QueueFull,
}

impl DeferredStatus {
    /// Whether a capture will run as a result of this request
    #[must_use]
    pub fn is_queued(self) -> bool {
        matches!(self, DeferredStatus::Queued | DeferredStatus::AlreadyQueued)
    }
}

/// Opaque token identifying one registered trace buffer to the collector
///
/// The engine registers its per-thread buffer under this token so the
/// collector knows to call back (via `mark_live_frames`) while the buffer
/// holds frame handles, and unregisters it before the buffer is freed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcRootRef(pub usize);

/// The seam between the sampling engine and the managed runtime.
///
/// One bridge per registered thread; the engine stores it at registration
/// and reaches it lock-free from both normal context and the interrupt
/// handler of that same thread. Implementations must be `Send + Sync`
/// because the collector may hold a reference during marking.
pub trait RuntimeBridge: Send + Sync {
    /// Fill `frames`/`lines` with the calling thread's live call stack,
    /// innermost frame first, and return the number of frames written.
    ///
    /// Safe to call only from normal context on the thread being
    /// captured, and never while `gc_in_progress` is true.
    fn capture_stack(&self, frames: &mut [FrameHandle], lines: &mut [i32]) -> usize;

    /// True while the collector is running. Async-signal-safe.
    fn gc_in_progress(&self) -> bool;

    /// Identity of the logical context currently executing on this OS
    /// thread. Async-signal-safe.
    fn current_context(&self) -> ContextId;

    /// Ask the runtime to run `job` later, on this same thread, outside
    /// interrupt context. Async-signal-safe.
    fn enqueue_deferred(&self, job: DeferredJob) -> DeferredStatus;

    /// Tell the collector a buffer of frame handles is now live.
    fn register_gc_root(&self, root: GcRootRef);

    /// Tell the collector the buffer is going away.
    fn unregister_gc_root(&self, root: GcRootRef);

    /// Whether `frame` still refers to a live frame object.
    ///
    /// Handles buffered across a collection cycle can go stale even with
    /// the root registered (the introspection primitive occasionally
    /// reports non-frame objects); consumers screen every handle through
    /// this before reading fields from it.
    fn frame_is_valid(&self, frame: FrameHandle) -> bool;

    /// Class or namespace owning the frame's code, if known.
    fn frame_class(&self, frame: FrameHandle) -> Option<String>;

    /// Method name or label of the frame, if known.
    fn frame_label(&self, frame: FrameHandle) -> Option<String>;

    /// Source file the frame's code was defined in, if known.
    fn frame_file(&self, frame: FrameHandle) -> Option<String>;

    /// First line number of the frame's code, if known.
    fn frame_first_lineno(&self, frame: FrameHandle) -> Option<i32>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deferred_status_is_queued() {
        assert!(DeferredStatus::Queued.is_queued());
        assert!(DeferredStatus::AlreadyQueued.is_queued());
        assert!(!DeferredStatus::QueueFull.is_queued());
    }
}
