//! Bearer token supply.
//!
//! The client does not manage sessions. Whatever owns the user's session
//! implements [`AccessTokenSource`]; a `None` token means nobody is signed in
//! and every call fails with [`ApiError::NotAuthenticated`] before any
//! request is sent.

use async_trait::async_trait;

use crate::error::{ApiError, ApiResult};

/// Supplies the bearer token for the current user session.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    /// Current access token, or `None` when no user is signed in.
    async fn access_token(&self) -> ApiResult<Option<String>>;
}

/// A fixed token, e.g. from `CREDITS_API_TOKEN`.
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl AccessTokenSource for StaticToken {
    async fn access_token(&self) -> ApiResult<Option<String>> {
        if self.0.is_empty() {
            Ok(None)
        } else {
            Ok(Some(self.0.clone()))
        }
    }
}

/// Token source for a signed-out user.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSession;

#[async_trait]
impl AccessTokenSource for NoSession {
    async fn access_token(&self) -> ApiResult<Option<String>> {
        Ok(None)
    }
}

/// Resolve a token or fail with `NotAuthenticated`.
pub(crate) async fn require_token(source: &dyn AccessTokenSource) -> ApiResult<String> {
    source
        .access_token()
        .await?
        .ok_or_else(|| ApiError::not_authenticated("no user session"))
}
