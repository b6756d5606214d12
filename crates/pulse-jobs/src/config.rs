//! Job queue configuration.

use crate::error::{JobError, JobResult};
use crate::retry::BackoffStrategy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the job queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Maximum number of jobs processing at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Attempt cap for jobs that don't set their own.
    #[serde(default = "default_max_attempts")]
    pub default_max_attempts: u32,

    /// Delay between retries.
    #[serde(default)]
    pub backoff: BackoffConfig,

    /// How long finished jobs stay queryable, in seconds.
    #[serde(default = "default_retention")]
    pub retention_secs: u64,

    /// Interval between retention sweeps, in seconds.
    #[serde(default = "default_purge_interval")]
    pub purge_interval_secs: u64,

    /// Handler time limit for jobs that don't set their own. Unset means no limit.
    #[serde(default)]
    pub default_timeout_secs: Option<u64>,

    /// Buffer size of the lifecycle event channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            default_max_attempts: default_max_attempts(),
            backoff: BackoffConfig::default(),
            retention_secs: default_retention(),
            purge_interval_secs: default_purge_interval(),
            default_timeout_secs: None,
            event_capacity: default_event_capacity(),
        }
    }
}

fn default_concurrency() -> usize {
    5
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retention() -> u64 {
    86400 // 24 hours
}

fn default_purge_interval() -> u64 {
    3600 // 1 hour
}

fn default_event_capacity() -> usize {
    256
}

/// Retry backoff configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Backoff strategy.
    #[serde(default)]
    pub strategy: BackoffStrategy,

    /// Base delay in milliseconds.
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Maximum delay in milliseconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Backoff multiplier.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::default(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            multiplier: default_multiplier(),
        }
    }
}

fn default_initial_delay() -> u64 {
    1000
}

fn default_max_delay() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    2.0
}

impl JobsConfig {
    /// Returns the retention window as Duration.
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    /// Returns the sweep interval as Duration.
    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs)
    }

    /// Returns the default handler time limit, if any.
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_secs.map(Duration::from_secs)
    }

    /// Checks values the queue cannot run with.
    pub fn validate(&self) -> JobResult<()> {
        if self.concurrency == 0 {
            return Err(JobError::Configuration(
                "jobs.concurrency must be at least 1".to_string(),
            ));
        }
        if self.purge_interval_secs == 0 {
            return Err(JobError::Configuration(
                "jobs.purge_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(JobError::Configuration(
                "jobs.event_capacity must be at least 1".to_string(),
            ));
        }
        if !(self.backoff.multiplier.is_finite() && self.backoff.multiplier > 0.0) {
            return Err(JobError::Configuration(format!(
                "jobs.backoff.multiplier must be positive, got {}",
                self.backoff.multiplier
            )));
        }
        if self.backoff.initial_delay_ms > self.backoff.max_delay_ms {
            return Err(JobError::Configuration(
                "jobs.backoff.initial_delay_ms exceeds max_delay_ms".to_string(),
            ));
        }
        Ok(())
    }
}
