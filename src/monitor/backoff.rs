use std::time::Duration;

/// Reconnect schedule for the progress stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect
    pub base_delay: Duration,
    /// Reconnects allowed after consecutive failures
    pub max_retries: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_retries: 3,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect number `attempt` (1-based): base * 2^(attempt - 1)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// Whether another reconnect is allowed after `failures` consecutive errors
    pub fn allows(&self, failures: u32) -> bool {
        failures <= self.max_retries
    }
}
