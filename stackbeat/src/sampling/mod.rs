//! Sampling engine core
//!
//! The moving parts, leaves first:
//! - `trace`: fixed-capacity trace arena (written by capture, drained by
//!   the control surface)
//! - `thread_state`: the per-thread atomic state shared with that
//!   thread's own interrupt handler
//! - `timer`: per-thread POSIX timers, the process-wide fallback timer,
//!   and the fork hooks
//! - `interrupt`: the signal handler and the deferred capture routine
//! - `global`: process-wide install/run flags and handler registration
//! - `control`: the thread-facing API (register, start/stop, trim, drain)
//!
//! Data flow: timer tick → signal handler validates and enqueues a
//! deferred capture → runtime safepoint runs the capture → trace lands in
//! the arena → consumer drains one layer at a time.

pub mod control;
pub mod global;
pub mod interrupt;
pub(crate) mod thread_state;
pub mod timer;
pub mod trace;

// Re-export the operation surface
pub use control::{
    current_frame_index, current_trace_index, drain_frames, mark_live_frames, register_thread,
    skip_counters, start_sampling, stop_sampling, unregister_thread, update_indexes,
};
pub use global::{install, is_installed, is_running, start, stop, uninstall};
pub use interrupt::run_deferred_capture;
pub use timer::current_tid;
pub use trace::{Trace, TraceLine};
