//! # Pulse Core
//!
//! Shared error type and logging setup for the Social Pulse workspace.

pub mod error;
pub mod telemetry;

pub use error::*;
pub use telemetry::{init_telemetry, LogFormat, TelemetryConfig};
