//! # Shared Sampler Constants and Counters (engine ↔ consumers)
//!
//! Defines the capacity limits, timing constants, and plain-data counter
//! types shared between the sampling engine and the code that consumes
//! drained profiles. Kept dependency-free (and `no_std`) so any consumer,
//! including embedders with unusual linkage, can depend on it without
//! dragging in the engine.
//!
//! ## Key Types
//!
//! - [`SkipCounters`] - Snapshot of the per-thread "sample dropped" diagnostics
//!
//! ## Sizing
//!
//! The per-thread trace buffer is a fixed allocation of
//! [`MAX_BUFFERED_TRACES`] × [`MAX_FRAMES_PER_TRACE`] frame slots, made
//! once at thread registration. There is no dynamic growth: when the
//! buffer is full further samples are dropped, and when a trace is deeper
//! than the frame cap the innermost frames win.

#![no_std]

// ============================================================================
// Capacity Constants
// ============================================================================

/// Maximum number of `(frame, line)` pairs captured per sample
///
/// One sample is one call stack. Stacks deeper than this are truncated to
/// the innermost [`MAX_FRAMES_PER_TRACE`] frames by the capture primitive.
pub const MAX_FRAMES_PER_TRACE: usize = 512;

/// Maximum number of samples buffered per thread between drains
///
/// Once the buffer holds this many traces, further ticks are dropped on
/// the floor until the consumer drains. Sampling is best-effort by design:
/// a stalled consumer costs samples, never memory.
pub const MAX_BUFFERED_TRACES: usize = 2000;

// ============================================================================
// Timing Constants
// ============================================================================

/// Interval between sampling ticks, in nanoseconds (1 ms)
///
/// Used both for the per-thread `timer_create` interval timers on Linux
/// and for the process-wide interval timer on platforms without
/// thread-targeted timers.
pub const SAMPLE_INTERVAL_NANOS: i64 = 1_000_000;

// ============================================================================
// Diagnostic Counters
// ============================================================================

/// Snapshot of one thread's dropped-sample diagnostics
///
/// Every sampling tick that does not produce a trace is counted under the
/// reason it was dropped. The counters are cumulative from registration
/// (or from the last `stop_sampling(reset = true)`); a healthy thread
/// shows small numbers relative to the tick count.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SkipCounters {
    /// Tick arrived while the runtime was collecting garbage
    ///
    /// The stack-introspection primitive is unsafe to call during GC, so
    /// the sample is abandoned. Expect this to track GC frequency.
    pub in_gc: u32,

    /// Tick arrived while a previous tick's handler was still running
    ///
    /// Reentrant interrupt delivery (e.g. nested signals). The inner
    /// invocation backs out immediately.
    pub in_handler: u32,

    /// Deferred-capture request was refused by the runtime's queue
    ///
    /// The safepoint callback queue was full. The capture that was
    /// already queued (if any) still runs; only the new request is lost.
    pub in_pending: u32,

    /// Tick arrived while a different logical context held the OS thread
    ///
    /// Under cooperative multitasking the runtime may have switched
    /// fibers/contexts on this OS thread; sampling a foreign context
    /// would attribute its frames to the wrong owner.
    pub not_current: u32,
}

impl SkipCounters {
    /// Total number of dropped ticks across all reasons
    #[must_use]
    pub fn total(&self) -> u32 {
        self.in_gc + self.in_handler + self.in_pending + self.not_current
    }
}
