//! Credits API error types.

use thiserror::Error;

/// Result type for credits API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Default back-off when a 429 carries no usable Retry-After header.
const DEFAULT_RATE_LIMIT_MS: u64 = 1000;

/// Errors that can occur while talking to the credits API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not authenticated: {0}")]
    NotAuthenticated(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Server error {0}: {1}")]
    ServerError(u16, String),

    #[error("Rate limited, retry after {0}ms")]
    RateLimited(u64),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ApiError {
    pub fn not_authenticated(msg: impl Into<String>) -> Self {
        Self::NotAuthenticated(msg.into())
    }

    pub fn request_failed(msg: impl Into<String>) -> Self {
        Self::RequestFailed(msg.into())
    }

    /// Classify a non-success HTTP status.
    pub fn from_http_status(status: u16, msg: impl Into<String>) -> Self {
        let msg = msg.into();
        match status {
            401 => Self::NotAuthenticated(msg),
            404 => Self::NotFound(msg),
            429 => Self::RateLimited(DEFAULT_RATE_LIMIT_MS),
            500..=599 => Self::ServerError(status, msg),
            _ => Self::RequestFailed(format!("HTTP {}: {}", status, msg)),
        }
    }

    /// HTTP status this error corresponds to, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::NotAuthenticated(_) => Some(401),
            Self::NotFound(_) => Some(404),
            Self::RateLimited(_) => Some(429),
            Self::ServerError(status, _) => Some(*status),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Check if error is retryable at the transport level.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Network(_) | ApiError::RateLimited(_))
    }

    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited(ms) => Some(*ms),
            _ => None,
        }
    }

    pub fn is_not_authenticated(&self) -> bool {
        matches!(self, ApiError::NotAuthenticated(_))
    }

    /// True if the server has no calendar for the requested year yet.
    ///
    /// The API answers with a 404, but some deployments wrap the same
    /// condition in a 400/500 whose body names it.
    pub fn is_year_not_found(&self) -> bool {
        match self {
            ApiError::NotFound(_) => true,
            ApiError::RequestFailed(msg) | ApiError::ServerError(_, msg) => {
                let msg = msg.to_lowercase();
                msg.contains("year not found") || msg.contains("not synced")
            }
            _ => false,
        }
    }
}
