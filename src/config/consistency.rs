//! Consistency and projection configuration types.

use std::time::Duration;

use serde::Deserialize;

/// Read-after-write coordinator settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConsistencyConfig {
    /// Hard deadline for a wait before `StaleRead` is returned.
    pub timeout_ms: u64,
    /// First backoff delay.
    pub min_delay_ms: u64,
    /// Backoff delay cap.
    pub max_delay_ms: u64,
    /// Backoff growth factor.
    pub factor: f32,
    /// Randomize delays.
    pub jitter: bool,
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            min_delay_ms: 5,
            max_delay_ms: 200,
            factor: 2.0,
            jitter: true,
        }
    }
}

impl ConsistencyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Projection worker settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProjectionsConfig {
    /// Fallback wake-up interval when no append notification arrives.
    pub poll_interval_ms: u64,
    /// Maximum number of events applied per batch.
    pub batch_size: usize,
}

impl Default for ProjectionsConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            batch_size: 200,
        }
    }
}

impl ProjectionsConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
