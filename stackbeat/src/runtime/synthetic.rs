//! Synthetic runtime bridge for tests and the diagnostic binary
//!
//! Serves a fixed, pre-built call stack from `capture_stack` and models
//! the safepoint queue as a single lock-free slot, which is exactly the
//! shape the engine relies on (at most one deferred capture outstanding
//! per thread). The signal-facing operations touch only atomics so the
//! bridge is safe to drive from a real `SIGPROF` handler, not just from
//! test code.

#![allow(unsafe_code)] // fn-pointer round-trip through the atomic job slot

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::domain::{ContextId, FrameHandle};

use super::{DeferredJob, DeferredStatus, GcRootRef, RuntimeBridge};

/// One synthetic stack frame served by [`SyntheticRuntime::capture_stack`]
#[derive(Debug, Clone)]
pub struct SyntheticFrame {
    pub handle: FrameHandle,
    pub class: String,
    pub method: String,
    pub file: String,
    pub line: i32,
}

/// In-crate [`RuntimeBridge`] implementation with scriptable behavior
///
/// Knobs:
/// - [`set_gc_active`](SyntheticRuntime::set_gc_active) - make the engine see a collection in progress
/// - [`switch_context`](SyntheticRuntime::switch_context) - simulate a fiber switch on the OS thread
/// - [`reject_deferred`](SyntheticRuntime::reject_deferred) - simulate a full safepoint queue
/// - [`kill_frame`](SyntheticRuntime::kill_frame) - mark one handle as reclaimed by the collector
///
/// Queued jobs do not run by themselves; the owning thread pumps them with
/// [`run_deferred`](SyntheticRuntime::run_deferred), mirroring how a real
/// runtime drains its safepoint queue between bytecodes.
pub struct SyntheticRuntime {
    /// Innermost-first stack served to every capture. Immutable after
    /// construction so reads are safe from interrupt context.
    stack: Vec<SyntheticFrame>,
    context: AtomicU64,
    gc_active: AtomicBool,
    reject: AtomicBool,
    /// Pending deferred job as a raw fn address; 0 means empty.
    job_slot: AtomicUsize,
    /// Net live GC root registrations (register - unregister).
    gc_roots: AtomicUsize,
    /// Handles the "collector" has reclaimed. Only touched from normal
    /// context (drain-time validity screening).
    dead_frames: Mutex<HashSet<u64>>,
}

/// Context id reported until [`switch_context`](SyntheticRuntime::switch_context) is called
pub const HOME_CONTEXT: ContextId = ContextId(1);

impl SyntheticRuntime {
    /// Build a runtime whose every capture returns a `depth`-frame stack
    #[must_use]
    pub fn with_stack_depth(depth: usize) -> Self {
        let stack = (0..depth)
            .map(|i| SyntheticFrame {
                // Handle values are arbitrary but nonzero and unique
                handle: FrameHandle(0x1000 + i as u64),
                class: format!("Layer{i}"),
                method: format!("step_{i}"),
                file: format!("layer_{i}.rb"),
                line: 10 + i as i32,
            })
            .collect();
        Self {
            stack,
            context: AtomicU64::new(HOME_CONTEXT.0),
            gc_active: AtomicBool::new(false),
            reject: AtomicBool::new(false),
            job_slot: AtomicUsize::new(0),
            gc_roots: AtomicUsize::new(0),
            dead_frames: Mutex::new(HashSet::new()),
        }
    }

    /// Pretend the collector started (`true`) or finished (`false`)
    pub fn set_gc_active(&self, active: bool) {
        self.gc_active.store(active, Ordering::Release);
    }

    /// Schedule a different logical context onto the OS thread
    pub fn switch_context(&self, context: ContextId) {
        self.context.store(context.0, Ordering::Release);
    }

    /// Make the safepoint queue refuse new jobs (`true`) or accept them
    pub fn reject_deferred(&self, reject: bool) {
        self.reject.store(reject, Ordering::Release);
    }

    /// Mark `frame` as reclaimed so validity screening drops it
    pub fn kill_frame(&self, frame: FrameHandle) {
        self.dead_frames.lock().expect("dead frame set poisoned").insert(frame.0);
    }

    /// Run the pending deferred job, if any. Returns whether one ran.
    ///
    /// Must be called on the thread the job was queued from, like the
    /// real safepoint mechanism it stands in for.
    pub fn run_deferred(&self) -> bool {
        let raw = self.job_slot.swap(0, Ordering::AcqRel);
        if raw == 0 {
            return false;
        }
        // SAFETY: the slot only ever holds addresses of `DeferredJob`
        // values stored by `enqueue_deferred`; fn pointers round-trip
        // through usize losslessly.
        let job: DeferredJob = unsafe { std::mem::transmute::<usize, DeferredJob>(raw) };
        job();
        true
    }

    /// Whether a deferred job is waiting to be pumped
    #[must_use]
    pub fn job_pending(&self) -> bool {
        self.job_slot.load(Ordering::Acquire) != 0
    }

    /// Net live GC root registrations
    #[must_use]
    pub fn gc_root_count(&self) -> usize {
        self.gc_roots.load(Ordering::Acquire)
    }

    fn find(&self, frame: FrameHandle) -> Option<&SyntheticFrame> {
        self.stack.iter().find(|f| f.handle == frame)
    }
}

impl RuntimeBridge for SyntheticRuntime {
    fn capture_stack(&self, frames: &mut [FrameHandle], lines: &mut [i32]) -> usize {
        let n = self.stack.len().min(frames.len()).min(lines.len());
        for (i, frame) in self.stack.iter().take(n).enumerate() {
            frames[i] = frame.handle;
            lines[i] = frame.line;
        }
        n
    }

    fn gc_in_progress(&self) -> bool {
        self.gc_active.load(Ordering::Acquire)
    }

    fn current_context(&self) -> ContextId {
        ContextId(self.context.load(Ordering::Acquire))
    }

    fn enqueue_deferred(&self, job: DeferredJob) -> DeferredStatus {
        if self.reject.load(Ordering::Acquire) {
            return DeferredStatus::QueueFull;
        }
        match self.job_slot.compare_exchange(
            0,
            job as usize,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => DeferredStatus::Queued,
            Err(_) => DeferredStatus::AlreadyQueued,
        }
    }

    fn register_gc_root(&self, _root: GcRootRef) {
        self.gc_roots.fetch_add(1, Ordering::AcqRel);
    }

    fn unregister_gc_root(&self, _root: GcRootRef) {
        self.gc_roots.fetch_sub(1, Ordering::AcqRel);
    }

    fn frame_is_valid(&self, frame: FrameHandle) -> bool {
        self.find(frame).is_some()
            && !self.dead_frames.lock().expect("dead frame set poisoned").contains(&frame.0)
    }

    fn frame_class(&self, frame: FrameHandle) -> Option<String> {
        self.find(frame).map(|f| f.class.clone())
    }

    fn frame_label(&self, frame: FrameHandle) -> Option<String> {
        self.find(frame).map(|f| f.method.clone())
    }

    fn frame_file(&self, frame: FrameHandle) -> Option<String> {
        self.find(frame).map(|f| f.file.clone())
    }

    fn frame_first_lineno(&self, frame: FrameHandle) -> Option<i32> {
        self.find(frame).map(|f| f.line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_job() {}

    #[test]
    fn test_capture_fills_innermost_first() {
        let rt = SyntheticRuntime::with_stack_depth(3);
        let mut frames = [FrameHandle::NULL; 8];
        let mut lines = [0i32; 8];
        assert_eq!(rt.capture_stack(&mut frames, &mut lines), 3);
        assert_eq!(frames[0], FrameHandle(0x1000));
        assert_eq!(lines[2], 12);
        assert_eq!(frames[3], FrameHandle::NULL);
    }

    #[test]
    fn test_capture_truncates_to_buffer() {
        let rt = SyntheticRuntime::with_stack_depth(10);
        let mut frames = [FrameHandle::NULL; 4];
        let mut lines = [0i32; 4];
        assert_eq!(rt.capture_stack(&mut frames, &mut lines), 4);
    }

    #[test]
    fn test_deferred_queue_single_slot() {
        let rt = SyntheticRuntime::with_stack_depth(1);
        assert_eq!(rt.enqueue_deferred(noop_job), DeferredStatus::Queued);
        assert_eq!(rt.enqueue_deferred(noop_job), DeferredStatus::AlreadyQueued);
        assert!(rt.run_deferred());
        assert!(!rt.run_deferred());
    }

    #[test]
    fn test_deferred_queue_rejection() {
        let rt = SyntheticRuntime::with_stack_depth(1);
        rt.reject_deferred(true);
        assert_eq!(rt.enqueue_deferred(noop_job), DeferredStatus::QueueFull);
        assert!(!rt.job_pending());
    }

    #[test]
    fn test_killed_frame_is_invalid() {
        let rt = SyntheticRuntime::with_stack_depth(2);
        let victim = FrameHandle(0x1001);
        assert!(rt.frame_is_valid(victim));
        rt.kill_frame(victim);
        assert!(!rt.frame_is_valid(victim));
        assert!(rt.frame_is_valid(FrameHandle(0x1000)));
    }

    #[test]
    fn test_frame_accessors() {
        let rt = SyntheticRuntime::with_stack_depth(1);
        let frame = FrameHandle(0x1000);
        assert_eq!(rt.frame_class(frame).as_deref(), Some("Layer0"));
        assert_eq!(rt.frame_label(frame).as_deref(), Some("step_0"));
        assert_eq!(rt.frame_file(frame).as_deref(), Some("layer_0.rb"));
        assert_eq!(rt.frame_first_lineno(frame), Some(10));
        assert_eq!(rt.frame_class(FrameHandle(0xdead)), None);
    }
}
