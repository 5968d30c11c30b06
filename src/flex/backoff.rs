use std::time::Duration;

use crate::config::PollingConfig;

/// Delay schedule for the statement waiter.
///
/// Not-ready polls use a progressive fixed schedule; transport failures use
/// capped exponential backoff. The two are tracked separately.
#[derive(Debug, Clone)]
pub struct PollSchedule {
    initial_interval: Duration,
    initial_attempts: u32,
    medium_interval: Duration,
    medium_until_attempt: u32,
    long_interval: Duration,
    transport_base_delay: Duration,
    transport_max_delay: Duration,
    pub max_transport_retries: u32,
    pub progress_interval: Duration,
}

impl PollSchedule {
    /// Delay after the `attempt`-th not-ready response (zero-based)
    pub fn not_ready_delay(&self, attempt: u32) -> Duration {
        if attempt < self.initial_attempts {
            self.initial_interval
        } else if attempt < self.medium_until_attempt {
            self.medium_interval
        } else {
            self.long_interval
        }
    }

    /// Delay after `failures` consecutive transport failures (one-based)
    pub fn transport_delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        self.transport_base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.transport_max_delay)
    }
}

impl From<&PollingConfig> for PollSchedule {
    fn from(config: &PollingConfig) -> Self {
        Self {
            initial_interval: Duration::from_secs(config.initial_interval_secs),
            initial_attempts: config.initial_attempts,
            medium_interval: Duration::from_secs(config.medium_interval_secs),
            medium_until_attempt: config.medium_until_attempt,
            long_interval: Duration::from_secs(config.long_interval_secs),
            transport_base_delay: Duration::from_millis(config.transport_base_delay_ms),
            transport_max_delay: Duration::from_millis(config.transport_max_delay_ms),
            max_transport_retries: config.max_transport_retries,
            progress_interval: Duration::from_secs(config.progress_interval_secs),
        }
    }
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self::from(&PollingConfig::default())
    }
}
