//! Client configuration types.

use std::time::Duration;

/// Retry configuration for transient failures
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts when creating a request
    pub max_retries: u32,

    /// Initial backoff duration
    pub initial_backoff: Duration,

    /// Maximum backoff duration
    pub max_backoff: Duration,

    /// Whether to retry on rate limit errors
    pub retry_on_rate_limit: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryConfig {
    /// Create a new retry configuration
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            retry_on_rate_limit: true,
        }
    }

    /// Set maximum retries
    #[must_use]
    pub const fn max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    /// Set initial backoff duration
    #[must_use]
    pub const fn initial_backoff(mut self, duration: Duration) -> Self {
        self.initial_backoff = duration;
        self
    }

    /// Set maximum backoff duration
    #[must_use]
    pub const fn max_backoff(mut self, duration: Duration) -> Self {
        self.max_backoff = duration;
        self
    }

    /// Set whether 429 responses are retried
    #[must_use]
    pub const fn retry_on_rate_limit(mut self, retry: bool) -> Self {
        self.retry_on_rate_limit = retry;
        self
    }

    /// Calculate backoff for a given attempt
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Whether `err` should be retried under this configuration
    #[must_use]
    pub const fn should_retry(&self, err: &hostenroll_core::EnrollError) -> bool {
        match err {
            hostenroll_core::EnrollError::RateLimited { .. } => self.retry_on_rate_limit,
            other => other.is_transient(),
        }
    }
}

/// Polling configuration for approval waits
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay between status checks while the request is pending
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PollConfig {
    /// Create a new polling configuration
    #[must_use]
    pub const fn new() -> Self {
        Self {
            interval: Duration::from_secs(2),
        }
    }

    /// Set the polling interval
    #[must_use]
    pub const fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostenroll_core::EnrollError;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = RetryConfig::new()
            .initial_backoff(Duration::from_millis(100))
            .max_backoff(Duration::from_secs(1));

        assert_eq!(config.backoff_for(0), Duration::from_millis(100));
        assert_eq!(config.backoff_for(1), Duration::from_millis(200));
        assert_eq!(config.backoff_for(3), Duration::from_millis(800));
        assert_eq!(config.backoff_for(4), Duration::from_secs(1));
        assert_eq!(config.backoff_for(200), Duration::from_secs(1));
    }

    #[test]
    fn test_rate_limit_retry_toggle() {
        let err = EnrollError::RateLimited { retry_after: None };
        assert!(RetryConfig::new().should_retry(&err));
        assert!(!RetryConfig::new().retry_on_rate_limit(false).should_retry(&err));
        assert!(!RetryConfig::new().should_retry(&EnrollError::Unauthorized));
    }
}
