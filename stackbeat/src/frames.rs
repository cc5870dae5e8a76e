//! Frame field extraction
//!
//! Pure pass-through to the runtime's introspection accessors: given a
//! buffered frame handle, pull out the human-readable pieces a consumer
//! wants (class, method, file, line). No state lives here; the runtime
//! owns the frame objects and the strings.

use crate::domain::FrameHandle;
use crate::runtime::RuntimeBridge;

/// Human-readable fields of one frame, as reported by the runtime
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameDetails {
    pub class: Option<String>,
    pub method: Option<String>,
    pub file: Option<String>,
    pub line: Option<i32>,
}

impl FrameDetails {
    /// Extract all four fields for `frame`, or `None` if the handle is
    /// no longer valid (reclaimed since it was buffered).
    #[must_use]
    pub fn describe(bridge: &dyn RuntimeBridge, frame: FrameHandle) -> Option<FrameDetails> {
        if !bridge.frame_is_valid(frame) {
            return None;
        }
        Some(FrameDetails {
            class: bridge.frame_class(frame),
            method: bridge.frame_label(frame),
            file: bridge.frame_file(frame),
            line: bridge.frame_first_lineno(frame),
        })
    }
}
