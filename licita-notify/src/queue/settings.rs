//! Runtime-tunable queue and dispatcher settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::RetryPolicy;
use crate::preferences::QuietHoursPolicy;
use crate::{Error, Result};

/// Settings read by the queue on enqueue and by the dispatcher on every tick.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueSettings {
    pub max_concurrent: usize,
    pub default_max_attempts: u32,
    pub max_queue_size: usize,
    pub send_timeout: Duration,
    pub retry: RetryPolicy,
    pub quiet_hours: QuietHoursPolicy,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            default_max_attempts: 3,
            max_queue_size: 10_000,
            send_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            quiet_hours: QuietHoursPolicy::default(),
        }
    }
}

/// Partial settings update. Unset fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigUpdate {
    pub max_concurrent: Option<usize>,
    /// Base retry delay in milliseconds.
    pub retry_delay_ms: Option<u64>,
    /// Retry delay cap in milliseconds.
    pub max_retry_delay_ms: Option<u64>,
    pub default_max_attempts: Option<u32>,
    pub send_timeout_secs: Option<u64>,
}

impl QueueSettings {
    /// The settings that result from applying `update`, if they are valid.
    pub fn merged(&self, update: &ConfigUpdate) -> Result<Self> {
        let mut next = self.clone();
        if let Some(max_concurrent) = update.max_concurrent {
            next.max_concurrent = max_concurrent;
        }
        if let Some(delay) = update.retry_delay_ms {
            next.retry.base_delay_ms = delay;
        }
        if let Some(max_delay) = update.max_retry_delay_ms {
            next.retry.max_delay_ms = max_delay;
        }
        if let Some(attempts) = update.default_max_attempts {
            next.default_max_attempts = attempts;
        }
        if let Some(secs) = update.send_timeout_secs {
            next.send_timeout = Duration::from_secs(secs);
        }
        next.validate()?;
        Ok(next)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(Error::config("max_concurrent must be at least 1"));
        }
        if self.default_max_attempts == 0 {
            return Err(Error::config("default_max_attempts must be at least 1"));
        }
        if self.max_queue_size == 0 {
            return Err(Error::config("max_queue_size must be at least 1"));
        }
        if self.send_timeout.is_zero() {
            return Err(Error::config("send timeout must be positive"));
        }
        if self.quiet_hours.resume_hour > 23 {
            return Err(Error::config("quiet_hours.resume_hour must be between 0 and 23"));
        }
        self.retry.validate()
    }
}
