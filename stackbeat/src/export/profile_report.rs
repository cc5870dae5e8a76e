//! JSON profile report writer
//!
//! One report per measurement run: for each sampled thread, the raw
//! drained traces (frames resolved to their human-readable fields at
//! drain time, while the handles are still valid) plus the skip
//! diagnostics. The format is plain JSON, stable enough to diff across
//! runs.

use std::io::Write;

use serde::Serialize;
use stackbeat_common::{SkipCounters, SAMPLE_INTERVAL_NANOS};

use crate::domain::{ExportError, Tid};
use crate::frames::FrameDetails;
use crate::runtime::RuntimeBridge;
use crate::sampling::TraceLine;

/// One resolved frame of an exported trace
#[derive(Debug, Clone, Serialize)]
pub struct ReportFrame {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub line: i32,
}

/// One sample: resolved frames, innermost first
#[derive(Debug, Clone, Serialize)]
pub struct ReportTrace {
    pub frames: Vec<ReportFrame>,
}

/// Everything drained from one thread
#[derive(Debug, Clone, Serialize)]
pub struct ThreadReport {
    pub tid: i32,
    pub captured: usize,
    pub skipped_in_gc: u32,
    pub skipped_in_handler: u32,
    pub skipped_in_pending: u32,
    pub skipped_not_current: u32,
    pub traces: Vec<ReportTrace>,
}

impl ThreadReport {
    /// Resolve a drained layer into an exportable report.
    ///
    /// Must run on the thread that drained, while its bridge is still
    /// registered, so the frame handles can be resolved before the
    /// runtime reclaims them.
    #[must_use]
    pub fn from_drained(
        tid: Tid,
        drained: &[Vec<TraceLine>],
        counters: SkipCounters,
        bridge: &dyn RuntimeBridge,
    ) -> Self {
        let traces = drained
            .iter()
            .map(|trace| ReportTrace {
                frames: trace
                    .iter()
                    .map(|tl| {
                        let details =
                            FrameDetails::describe(bridge, tl.frame).unwrap_or_default();
                        ReportFrame {
                            class: details.class,
                            method: details.method,
                            file: details.file,
                            line: tl.line,
                        }
                    })
                    .collect(),
            })
            .collect();
        Self {
            tid: tid.0,
            captured: drained.len(),
            skipped_in_gc: counters.in_gc,
            skipped_in_handler: counters.in_handler,
            skipped_in_pending: counters.in_pending,
            skipped_not_current: counters.not_current,
            traces,
        }
    }
}

/// Whole-process profile report
#[derive(Debug, Serialize)]
pub struct ProfileReport {
    pub sample_interval_ns: i64,
    pub threads: Vec<ThreadReport>,
}

impl ProfileReport {
    #[must_use]
    pub fn new() -> Self {
        Self { sample_interval_ns: SAMPLE_INTERVAL_NANOS, threads: Vec::new() }
    }

    pub fn add_thread(&mut self, report: ThreadReport) {
        self.threads.push(report);
    }

    /// Serialize the report as pretty-printed JSON.
    ///
    /// # Errors
    /// Returns an error if serialization or the underlying write fails.
    pub fn export<W: Write>(&self, writer: &mut W) -> Result<(), ExportError> {
        serde_json::to_writer_pretty(&mut *writer, self)?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}

impl Default for ProfileReport {
    fn default() -> Self {
        Self::new()
    }
}
