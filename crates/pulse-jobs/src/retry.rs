//! Backoff policies applied between failed attempts.

use crate::config::BackoffConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff strategy enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Same delay before every retry.
    Fixed,
    /// Delay multiplied on every attempt, up to the cap.
    #[default]
    Exponential,
}

/// Delay calculation for retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Backoff strategy.
    pub strategy: BackoffStrategy,

    /// Base delay in milliseconds.
    pub initial_delay_ms: u64,

    /// Maximum delay in milliseconds.
    pub max_delay_ms: u64,

    /// Growth factor per attempt (exponential only).
    pub multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::exponential(1000, 2.0, 30_000)
    }
}

impl BackoffPolicy {
    /// Creates an exponential backoff policy.
    pub fn exponential(initial_delay_ms: u64, multiplier: f64, max_delay_ms: u64) -> Self {
        Self {
            strategy: BackoffStrategy::Exponential,
            initial_delay_ms,
            max_delay_ms,
            multiplier,
        }
    }

    /// Creates a fixed delay policy.
    pub fn fixed(delay_ms: u64) -> Self {
        Self {
            strategy: BackoffStrategy::Fixed,
            initial_delay_ms: delay_ms,
            max_delay_ms: delay_ms,
            multiplier: 1.0,
        }
    }

    /// Delay before the next attempt, given how many attempts have run.
    ///
    /// Exponential: `min(initial * multiplier^attempts, max)`, so with the
    /// defaults the first retry waits 2s, the second 4s, and so on up to 30s.
    pub fn delay_for_attempt(&self, attempts: u32) -> Duration {
        let delay_ms = match self.strategy {
            BackoffStrategy::Fixed => self.initial_delay_ms,
            BackoffStrategy::Exponential => {
                let exp = attempts.min(i32::MAX as u32) as i32;
                let raw = self.initial_delay_ms as f64 * self.multiplier.powi(exp);
                if raw.is_finite() {
                    raw.min(self.max_delay_ms as f64) as u64
                } else {
                    self.max_delay_ms
                }
            }
        };

        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}

impl From<&BackoffConfig> for BackoffPolicy {
    fn from(config: &BackoffConfig) -> Self {
        match config.strategy {
            BackoffStrategy::Fixed => Self::fixed(config.initial_delay_ms),
            BackoffStrategy::Exponential => Self::exponential(
                config.initial_delay_ms,
                config.multiplier,
                config.max_delay_ms,
            ),
        }
    }
}
