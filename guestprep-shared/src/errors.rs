//! Error vocabulary for image preparation.
//!
//! Every stage of an orchestrated operation reports failures through
//! [`GuestprepError`]. The orchestrator catches stage errors only to run
//! teardown, then hands the same value back to the caller.

use std::time::Duration;

pub type GuestprepResult<T> = Result<T, GuestprepError>;

#[derive(Debug, thiserror::Error)]
pub enum GuestprepError {
    /// A guest-side capability (daemon, scheduler) is absent from the image.
    /// Not retried; the image cannot be instrumented as-is.
    #[error("prerequisite missing: {0}")]
    PrerequisiteMissing(String),

    /// Instance creation or control was rejected by the hypervisor backend.
    #[error("hypervisor error: {0}")]
    Hypervisor(String),

    #[error("guest did not report a network address within {}s", .timeout.as_secs())]
    BootTimeout { timeout: Duration },

    #[error("guest did not shut down within {}s", .timeout.as_secs())]
    ShutdownTimeout { timeout: Duration },

    /// The remote channel failed or a checked command exited non-zero.
    #[error("remote execution error: {0}")]
    RemoteExecution(String),

    /// An offline edit of the image filesystem failed.
    #[error("instrumentation error: {0}")]
    Instrumentation(String),

    #[error("install media error: {0}")]
    Media(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl GuestprepError {
    /// Whether the error marks the image itself as unsuitable, as opposed
    /// to a transient fault in the pipeline.
    pub fn is_prerequisite_missing(&self) -> bool {
        matches!(self, GuestprepError::PrerequisiteMissing(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_messages_carry_seconds() {
        let err = GuestprepError::BootTimeout {
            timeout: Duration::from_secs(600),
        };
        assert_eq!(
            err.to_string(),
            "guest did not report a network address within 600s"
        );
        assert!(!err.is_prerequisite_missing());
    }

    #[test]
    fn test_io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: GuestprepError = io.into();
        assert!(matches!(err, GuestprepError::Io(_)));
        assert_eq!(err.to_string(), "gone");
    }
}
