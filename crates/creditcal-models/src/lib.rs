//! Shared data models for credit calendar tracking.
//!
//! This crate provides Serde-serializable types for:
//! - Credit periods and the period-number arithmetic behind them
//! - Per-period usage history and the usage/value invariants
//! - Calendar aggregates (a year of credits, and month slices of it)
//! - Tracking preferences and calendar query options

pub mod calendar;
pub mod period;
pub mod preferences;
pub mod query;
pub mod usage;

// Re-export common types
pub use calendar::{CalendarUserCredits, UserCredit, YearMonth};
pub use period::CreditPeriod;
pub use preferences::{
    CardTrackingPreferences, CreditHidePreferenceUpdate, CreditTrackingPreference,
    UserCreditsTrackingPreferences,
};
pub use query::CalendarQuery;
pub use usage::{
    CreditHistoryUpdate, SingleCreditHistory, UsageEdit, UsageState, UsageValidationError,
};
