//! Request queue configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Request queue configuration
///
/// Fixed at construction; the queue never re-reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Minimum gap between the end of one attempt and the start of the next
    #[serde(rename = "min-interval-ms")]
    pub min_interval_ms: u64,

    /// Max rate-limit retries per request
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Delay before a rate-limited request is attempted again
    #[serde(rename = "retry-delay-ms")]
    pub retry_delay_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 1000,
            max_retries: 3,
            retry_delay_ms: 2000,
        }
    }
}

impl QueueConfig {
    /// Build a config from explicit durations
    pub fn new(min_interval: Duration, max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            min_interval_ms: saturating_millis(min_interval),
            max_retries,
            retry_delay_ms: saturating_millis(retry_delay),
        }
    }

    /// Get the pacing interval as a Duration
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    /// Get the retry delay as a Duration
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

fn saturating_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
