//! Profile export functionality
//!
//! Serializes drained profiles for offline inspection. Raw traces and
//! counters only; aggregation, symbol storage, and visualization belong
//! to whatever consumes the file.

pub mod profile_report;

pub use profile_report::{ProfileReport, ReportFrame, ReportTrace, ThreadReport};
