//! Retry budget and exponential backoff for keep-alive fetches.

use std::time::Duration;

/// Statuses treated as transient by default.
pub const DEFAULT_RETRY_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// How many requests a single fetch may issue, and how long to wait between them.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total requests allowed, the first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub retry_statuses: Vec<u16>,
}

impl RetryPolicy {
    /// Whether another request may follow `attempts_made` requests.
    pub fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }

    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retry_statuses.contains(&status)
    }

    /// Delay before retry number `retry_index` (0 is the first retry).
    pub fn delay(&self, retry_index: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry_index);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Delay asked for by a `Retry-After` header, capped like computed delays.
    pub fn server_delay(&self, seconds: u64) -> Duration {
        Duration::from_secs(seconds).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    /// 3 attempts, 1s exponential base, capped at 30s.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            retry_statuses: DEFAULT_RETRY_STATUSES.to_vec(),
        }
    }
}
