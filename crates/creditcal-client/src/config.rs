//! Client configuration.

use std::time::Duration;

use url::Url;

use crate::error::{ApiError, ApiResult};
use crate::retry::RetryConfig;

const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";

/// Credits API client configuration.
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    /// API root; endpoint paths are appended to it.
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Retry configuration for idempotent reads
    pub retry: RetryConfig,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            retry: RetryConfig::default(),
        }
    }
}

impl ApiClientConfig {
    /// Config pointing at `base_url` with default timeouts.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> ApiResult<Self> {
        let base_url =
            std::env::var("CREDITS_API_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        let timeout_secs: u64 = std::env::var("CREDITS_API_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        let connect_timeout_secs: u64 = std::env::var("CREDITS_API_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        let config = Self {
            base_url,
            timeout: Duration::from_secs(timeout_secs),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            retry: RetryConfig::from_env(),
        };
        config.parsed_base_url()?;
        Ok(config)
    }

    /// Parsed base URL, without a trailing slash.
    pub fn parsed_base_url(&self) -> ApiResult<Url> {
        let trimmed = self.base_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(ApiError::Config("CREDITS_API_URL cannot be empty".to_string()));
        }
        Url::parse(trimmed)
            .map_err(|e| ApiError::Config(format!("invalid base URL {:?}: {}", trimmed, e)))
    }
}
