//! REST client for the card credit calendar API.
//!
//! This crate provides:
//! - The [`CreditsApi`] trait the calendar core depends on
//! - [`HttpCreditsApi`], its reqwest implementation
//! - Bearer-token supply via [`AccessTokenSource`]
//! - Error classification (not authenticated, year not synced, transport)
//! - Transport retry for idempotent reads, request metrics

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod retry;


pub use api::CreditsApi;
pub use auth::{AccessTokenSource, NoSession, StaticToken};
pub use client::HttpCreditsApi;
pub use config::ApiClientConfig;
pub use error::{ApiError, ApiResult};
pub use retry::RetryConfig;
