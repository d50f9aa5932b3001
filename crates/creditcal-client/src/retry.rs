//! Retry policy for the read endpoints.
//!
//! Reads are retried on rate limiting and network failures. A 429 waits for
//! the server's Retry-After; anything else doubles from `base_delay_ms`.
//! A 404 is an answer, so the calendar core's own sync-and-retry is the only
//! recovery for a missing year.

use std::time::Duration;

use crate::error::ApiError;

/// How often and how long to back off before re-sending a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Re-sends after the first attempt.
    pub max_retries: u32,
    /// Back-off before the first re-send when the server gives no hint.
    pub base_delay_ms: u64,
    /// Ceiling for every back-off, Retry-After included.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 100,
            max_delay_ms: 5000,
        }
    }
}

impl RetryConfig {
    /// Never re-send.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Read `CREDITS_API_RETRIES`, `CREDITS_API_RETRY_BASE_MS` and
    /// `CREDITS_API_RETRY_MAX_MS`, falling back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_retries: env_parse("CREDITS_API_RETRIES").unwrap_or(defaults.max_retries),
            base_delay_ms: env_parse("CREDITS_API_RETRY_BASE_MS")
                .unwrap_or(defaults.base_delay_ms),
            max_delay_ms: env_parse("CREDITS_API_RETRY_MAX_MS").unwrap_or(defaults.max_delay_ms),
        }
    }

    /// Back-off before re-sending a read that failed with `error` on
    /// zero-based `attempt`, or `None` when it should not be re-sent.
    pub fn backoff(&self, attempt: u32, error: &ApiError) -> Option<Duration> {
        if attempt >= self.max_retries || !error.is_retryable() {
            return None;
        }
        let delay_ms = error.retry_after_ms().unwrap_or_else(|| {
            self.base_delay_ms
                .saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX))
        });
        Some(Duration::from_millis(delay_ms.min(self.max_delay_ms)))
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}
