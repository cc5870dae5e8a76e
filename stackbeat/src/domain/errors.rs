//! Structured error types for stackbeat
//!
//! Using thiserror for automatic Display implementation and error chaining.
//!
//! Setup failures are handled locally: the engine logs them and leaves the
//! affected thread running unsampled rather than surfacing an error to the
//! host application. These types exist so the log lines carry the OS error
//! and so the export path can report failures to its caller.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SamplerError {
    #[error("failed to install the sampling signal handler: {0}")]
    SignalInstall(#[source] std::io::Error),

    #[error("failed to create a per-thread interval timer: {0}")]
    TimerCreate(#[source] std::io::Error),

    #[error("failed to arm the sampling timer: {0}")]
    TimerArm(#[source] std::io::Error),

    #[error("failed to disarm the sampling timer: {0}")]
    TimerDisarm(#[source] std::io::Error),

    #[error("failed to register fork handlers: {0}")]
    ForkHooks(#[source] std::io::Error),

    #[error("failed to arm the process-wide interval timer: {0}")]
    ProcessTimer(#[source] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("failed to serialize profile report: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampler_error_display() {
        let err = SamplerError::TimerCreate(std::io::Error::from_raw_os_error(libc::EINVAL));
        let msg = err.to_string();
        assert!(msg.contains("per-thread interval timer"));
    }

    #[test]
    fn test_export_error_from_io() {
        let err = ExportError::from(std::io::Error::from_raw_os_error(libc::EPIPE));
        assert!(!err.to_string().is_empty());
    }
}
