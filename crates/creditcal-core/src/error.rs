//! Calendar core error types.

use std::sync::Arc;
use std::time::Duration;

use creditcal_client::ApiError;
use creditcal_models::UsageValidationError;
use thiserror::Error;

/// Result type for calendar core operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors surfaced by the calendar core.
///
/// `Clone` because one network outcome is handed to every caller that
/// shared it (cache joiners, debounced sync waiters).
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Credit calendar for {year} has not been synced")]
    YearNotSynced { year: i32 },

    #[error("Credits API error: {0}")]
    Api(Arc<ApiError>),

    #[error("Timed out after {waited:?} waiting for the in-flight load of {key}")]
    PeerTimeout { key: String, waited: Duration },

    #[error("Invalid usage edit: {0}")]
    InvalidUsage(#[from] UsageValidationError),

    #[error("Invalid month {0}, expected 1..=12")]
    InvalidMonth(u32),

    #[error("Sync coordinator closed")]
    CoordinatorClosed,
}

impl From<ApiError> for SyncError {
    fn from(err: ApiError) -> Self {
        if err.is_not_authenticated() {
            SyncError::NotAuthenticated
        } else {
            SyncError::Api(Arc::new(err))
        }
    }
}

impl SyncError {
    /// Classify a failed calendar fetch for `year`.
    pub fn from_fetch(year: i32, err: ApiError) -> Self {
        if err.is_year_not_found() {
            SyncError::YearNotSynced { year }
        } else {
            err.into()
        }
    }

    pub fn is_not_authenticated(&self) -> bool {
        matches!(self, SyncError::NotAuthenticated)
    }

    pub fn is_year_not_synced(&self) -> bool {
        match self {
            SyncError::YearNotSynced { .. } => true,
            SyncError::Api(err) => err.is_year_not_found(),
            _ => false,
        }
    }
}
