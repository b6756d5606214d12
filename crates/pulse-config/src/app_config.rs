//! Application configuration structures.

use pulse_core::TelemetryConfig;
use pulse_jobs::JobsConfig;
use serde::{Deserialize, Serialize};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application name and metadata.
    #[serde(default)]
    pub app: AppMetadata,

    /// Logging configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Background job queue configuration.
    #[serde(default)]
    pub jobs: JobsConfig,
}

/// Application metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppMetadata {
    /// Application name.
    #[serde(default = "default_name")]
    pub name: String,
    /// Application version.
    #[serde(default = "default_version")]
    pub version: String,
    /// Environment (development, staging, production).
    #[serde(default = "default_environment")]
    pub environment: String,
}

fn default_name() -> String {
    "social-pulse".to_string()
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

impl Default for AppMetadata {
    fn default() -> Self {
        Self {
            name: default_name(),
            version: default_version(),
            environment: default_environment(),
        }
    }
}

impl AppMetadata {
    /// Returns true in the production environment.
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.app.name, "social-pulse");
        assert_eq!(config.app.environment, "development");
        assert!(!config.app.is_production());
        assert_eq!(config.jobs.concurrency, 5);
        assert_eq!(config.telemetry.service_name, "social-pulse");
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [app]
            environment = "production"

            [jobs]
            concurrency = 8
            "#,
        )
        .unwrap();

        assert!(config.app.is_production());
        assert_eq!(config.app.name, "social-pulse");
        assert_eq!(config.jobs.concurrency, 8);
        assert_eq!(config.jobs.default_max_attempts, 3);
    }
}
