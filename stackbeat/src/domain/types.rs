//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers prevent common bugs like passing a raw line
//! number where a frame handle is expected, and make function signatures
//! more expressive.

use std::fmt;

/// Opaque handle to one call-stack frame
///
/// Owned and tracked by the managed runtime's garbage collector. The
/// engine never interprets the value; it only buffers handles between
/// capture and drain, keeps the collector informed of the live set, and
/// hands them back to the runtime's accessors for field extraction.
///
/// A handle buffered across a collection cycle may have been reclaimed.
/// Treat every handle as potentially stale until the runtime validates
/// it (`RuntimeBridge::frame_is_valid`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHandle(pub u64);

impl FrameHandle {
    /// The "no frame" sentinel used for unfilled buffer slots
    pub const NULL: FrameHandle = FrameHandle(0);
}

impl fmt::Display for FrameHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame:0x{:x}", self.0)
    }
}

/// Identity of a logical execution context
///
/// The runtime's notion of "which user-level task currently holds this
/// OS thread" (a fiber, green thread, or similar). A per-thread sampler
/// is bound to the context that registered it; ticks that land while a
/// different context is scheduled on the same OS thread are dropped
/// rather than attributed to the wrong owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(pub u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx:{}", self.0)
    }
}

/// Thread ID
///
/// Kernel-assigned thread ID of an OS thread. Used to target per-thread
/// interval timers and to label per-thread reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tid(pub i32);

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TID:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_handle_display() {
        assert_eq!(FrameHandle(0xbeef).to_string(), "frame:0xbeef");
    }

    #[test]
    fn test_null_frame_handle() {
        assert_eq!(FrameHandle::NULL, FrameHandle(0));
    }

    #[test]
    fn test_context_id_display() {
        assert_eq!(ContextId(7).to_string(), "ctx:7");
    }

    #[test]
    fn test_tid_display() {
        assert_eq!(Tid(1234).to_string(), "TID:1234");
    }
}
