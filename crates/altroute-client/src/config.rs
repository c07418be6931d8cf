//! Resolver tuning knobs.

use std::time::Duration;

/// Default per-provider DoH query timeout
pub const DEFAULT_DOH_TIMEOUT: Duration = Duration::from_secs(10);

/// Default slack added on top of the provider timeout for a whole round
pub const DEFAULT_ROUND_GRACE: Duration = Duration::from_millis(500);

/// Timing configuration for resolution rounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DohConfig {
    /// Timeout handed to every provider query
    pub provider_timeout: Duration,

    /// Extra time a round waits for a provider task beyond its own timeout
    pub round_grace: Duration,
}

impl Default for DohConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl DohConfig {
    /// Create a configuration with default timings
    #[must_use]
    pub const fn new() -> Self {
        Self {
            provider_timeout: DEFAULT_DOH_TIMEOUT,
            round_grace: DEFAULT_ROUND_GRACE,
        }
    }

    /// Set the per-provider timeout
    #[must_use]
    pub const fn provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    /// Set the round grace period
    #[must_use]
    pub const fn round_grace(mut self, grace: Duration) -> Self {
        self.round_grace = grace;
        self
    }

    /// Upper bound a round waits for one provider when queried with `timeout`
    #[must_use]
    pub fn round_deadline(&self, timeout: Duration) -> Duration {
        timeout.saturating_add(self.round_grace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_adds_grace() {
        let config = DohConfig::new()
            .provider_timeout(Duration::from_secs(2))
            .round_grace(Duration::from_millis(250));

        assert_eq!(
            config.round_deadline(config.provider_timeout),
            Duration::from_millis(2250)
        );
    }
}
