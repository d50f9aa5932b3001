//! The credits API as seen by the calendar core.

use async_trait::async_trait;
use creditcal_models::{
    CalendarQuery, CalendarUserCredits, CreditHidePreferenceUpdate, CreditHistoryUpdate,
    UserCredit, UserCreditsTrackingPreferences, YearMonth,
};
use serde_json::Value;

use crate::error::ApiResult;

/// Every endpoint under `/users/cards/credits`.
///
/// [`crate::HttpCreditsApi`] is the production implementation; the calendar
/// core only ever holds an `Arc<dyn CreditsApi>`.
#[async_trait]
pub trait CreditsApi: Send + Sync {
    /// `GET /month/{year}/{month}` (1-based month).
    async fn fetch_month(
        &self,
        year: i32,
        month: u32,
        query: &CalendarQuery,
    ) -> ApiResult<CalendarUserCredits>;

    /// `GET /year/{year}`.
    async fn fetch_year(&self, year: i32, query: &CalendarQuery) -> ApiResult<CalendarUserCredits>;

    /// `GET /range?start=YYYY-MM&end=YYYY-MM`.
    async fn fetch_range(&self, start: YearMonth, end: YearMonth) -> ApiResult<CalendarUserCredits>;

    /// `PUT /history`; returns the updated credit.
    async fn update_history(&self, update: &CreditHistoryUpdate) -> ApiResult<UserCredit>;

    /// `POST /sync[?year]`. `None` reconciles the server's current year.
    async fn sync_credits(
        &self,
        year: Option<i32>,
        query: &CalendarQuery,
    ) -> ApiResult<CalendarUserCredits>;

    /// `GET /preferences`.
    async fn fetch_preferences(&self) -> ApiResult<UserCreditsTrackingPreferences>;

    /// `PUT /preferences`.
    async fn update_hide_preference(
        &self,
        update: &CreditHidePreferenceUpdate,
    ) -> ApiResult<UserCreditsTrackingPreferences>;

    /// `GET /monthly-stats`. Aggregates are passed through untyped.
    async fn fetch_monthly_stats(&self, month: Option<YearMonth>) -> ApiResult<Value>;

    /// `GET /monthly-summary`.
    async fn fetch_monthly_summary(&self, month: Option<YearMonth>) -> ApiResult<Value>;

    /// `GET /historical-monthly-summary`.
    async fn fetch_historical_monthly_summary(&self) -> ApiResult<Value>;
}
