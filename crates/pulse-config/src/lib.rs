//! # Pulse Config
//!
//! Configuration management for Social Pulse.
//! Supports layered configuration from files, environment variables,
//! and runtime reload.

mod app_config;
mod loader;

pub use app_config::*;
pub use loader::*;
