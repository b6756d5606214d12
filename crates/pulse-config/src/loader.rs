//! Configuration loader with layered sources.

use crate::AppConfig;
use config::{Config, ConfigError, Environment, File, Map};
use pulse_core::PulseError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Environment variable naming the active environment.
pub const ENVIRONMENT_VAR: &str = "PULSE_ENVIRONMENT";

/// Configuration loader with runtime reload support.
#[derive(Clone)]
pub struct ConfigLoader {
    config: Arc<RwLock<AppConfig>>,
    config_dir: PathBuf,
    environment: String,
}

impl ConfigLoader {
    /// Creates a new configuration loader.
    ///
    /// Configuration is loaded from multiple sources in order:
    /// 1. `{config_dir}/default.toml` - Default values
    /// 2. `{config_dir}/{environment}.toml` - Environment-specific overrides
    /// 3. `{config_dir}/local.toml` - Local overrides
    /// 4. Environment variables with `PULSE_` prefix, `__` between sections
    ///    (`PULSE_JOBS__CONCURRENCY=8`)
    ///
    /// The environment name comes from `PULSE_ENVIRONMENT`, defaulting to
    /// `development`.
    pub fn new(config_dir: impl Into<PathBuf>) -> Result<Self, PulseError> {
        if let Err(e) = dotenvy::dotenv() {
            debug!("No .env file found or error loading it: {}", e);
        }

        let environment =
            std::env::var(ENVIRONMENT_VAR).unwrap_or_else(|_| "development".to_string());
        Self::for_environment(config_dir, environment)
    }

    /// Loads configuration from the default location (`./config`).
    pub fn from_default_location() -> Result<Self, PulseError> {
        Self::new("./config")
    }

    /// Creates a loader for an explicit environment.
    pub fn for_environment(
        config_dir: impl Into<PathBuf>,
        environment: impl Into<String>,
    ) -> Result<Self, PulseError> {
        let config_dir = config_dir.into();
        let environment = environment.into();
        let config = load_config(&config_dir, &environment, None)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_dir,
            environment,
        })
    }

    /// Returns the current configuration.
    pub async fn get(&self) -> AppConfig {
        self.config.read().await.clone()
    }

    /// Name of the environment this loader reads.
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Reloads the configuration from disk.
    ///
    /// The current configuration is kept if the new one fails to load.
    pub async fn reload(&self) -> Result<(), PulseError> {
        let new_config = load_config(&self.config_dir, &self.environment, None)?;
        *self.config.write().await = new_config;
        info!("Configuration reloaded successfully");
        Ok(())
    }
}

/// Build the layered configuration.
///
/// `env_vars` replaces the process environment as the variable source when
/// given.
pub(crate) fn load_config(
    config_dir: &Path,
    environment: &str,
    env_vars: Option<Map<String, String>>,
) -> Result<AppConfig, PulseError> {
    info!(environment, "Loading configuration");

    let mut builder = Config::builder().set_default("app.environment", environment)
        .map_err(config_error_to_pulse_error)?;

    for name in ["default", environment, "local"] {
        let path = config_dir.join(format!("{}.toml", name));
        if path.exists() {
            debug!("Loading config from: {}", path.display());
            builder = builder.add_source(File::from(path).required(false));
        }
    }

    builder = builder.add_source(
        Environment::with_prefix("PULSE")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .source(env_vars),
    );

    let app_config: AppConfig = builder
        .build()
        .and_then(Config::try_deserialize)
        .map_err(config_error_to_pulse_error)?;

    validate_config(&app_config)?;

    Ok(app_config)
}

/// Validates the configuration.
fn validate_config(config: &AppConfig) -> Result<(), PulseError> {
    config.jobs.validate()?;

    if config.app.is_production() && config.telemetry.format == pulse_core::LogFormat::Pretty {
        warn!("Pretty log output in production; consider telemetry.format = \"json\"");
    }

    Ok(())
}

fn config_error_to_pulse_error(err: ConfigError) -> PulseError {
    PulseError::Configuration(err.to_string())
}
