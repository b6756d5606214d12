//! Application-wide error type shared by the Social Pulse crates.

use std::fmt::Debug;
use thiserror::Error;

/// Unified error type for the Social Pulse services.
///
/// Library crates with richer failure modes (the job queue, for example)
/// define their own error enums and convert into this one at the process
/// boundary.
#[derive(Error, Debug)]
pub enum PulseError {
    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Telemetry could not be initialised.
    #[error("Telemetry error: {0}")]
    Telemetry(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PulseError {
    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Telemetry(_) => "TELEMETRY_ERROR",
            Self::Internal(_) | Self::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn configuration<T: Into<String>>(message: T) -> Self {
        Self::Configuration(message.into())
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::Internal(message.into())
    }
}

impl From<serde_json::Error> for PulseError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON serialization error: {}", err))
    }
}

/// A specialized `Result` type for Social Pulse operations.
pub type PulseResult<T> = Result<T, PulseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(PulseError::configuration("x").error_code(), "CONFIGURATION_ERROR");
        assert_eq!(PulseError::Telemetry("x".into()).error_code(), "TELEMETRY_ERROR");
        assert_eq!(PulseError::internal("x").error_code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_error_display() {
        let err = PulseError::configuration("concurrency must be positive");
        assert_eq!(
            err.to_string(),
            "Configuration error: concurrency must be positive"
        );
    }

    #[test]
    fn test_from_anyhow_is_transparent() {
        let err: PulseError = anyhow::anyhow!("disk full").into();
        assert_eq!(err.to_string(), "disk full");
        assert_eq!(err.error_code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = PulseError::from(json_err);
        assert!(matches!(err, PulseError::Internal(_)));
    }
}
