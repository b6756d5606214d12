//! Job error types.

use std::time::Duration;
use thiserror::Error;

/// Result type for job operations.
pub type JobResult<T> = Result<T, JobError>;

/// Job-related errors.
///
/// Handler failures carry the handler's own message verbatim so that the
/// message stored on a failed job is exactly what the handler reported.
#[derive(Debug, Error)]
pub enum JobError {
    /// Handler failed; the job will be retried while attempts remain.
    #[error("{0}")]
    ExecutionFailed(String),

    /// Handler failed in a way that retrying cannot fix.
    #[error("{0}")]
    Unrecoverable(String),

    /// No handler registered for the job type at dispatch time.
    #[error("No handler registered for job type '{0}'")]
    NoHandler(String),

    /// Handler exceeded its time limit.
    #[error("Job timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Payload or result could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl JobError {
    /// Creates a retryable handler failure.
    pub fn failed(message: impl Into<String>) -> Self {
        JobError::ExecutionFailed(message.into())
    }

    /// Creates a handler failure that skips the remaining attempts.
    pub fn unrecoverable(message: impl Into<String>) -> Self {
        JobError::Unrecoverable(message.into())
    }

    /// Returns true if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, JobError::ExecutionFailed(_) | JobError::Timeout(_))
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::ExecutionFailed(_) => "execution_failed",
            JobError::Unrecoverable(_) => "unrecoverable",
            JobError::NoHandler(_) => "no_handler",
            JobError::Timeout(_) => "timeout",
            JobError::Serialization(_) => "serialization",
            JobError::Configuration(_) => "configuration",
            JobError::Internal(_) => "internal",
        }
    }
}

impl From<anyhow::Error> for JobError {
    fn from(err: anyhow::Error) -> Self {
        JobError::ExecutionFailed(err.to_string())
    }
}

impl From<pulse_core::PulseError> for JobError {
    fn from(err: pulse_core::PulseError) -> Self {
        JobError::Internal(err.to_string())
    }
}

impl From<JobError> for pulse_core::PulseError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::Configuration(msg) => pulse_core::PulseError::Configuration(msg),
            other => pulse_core::PulseError::Internal(other.to_string()),
        }
    }
}
