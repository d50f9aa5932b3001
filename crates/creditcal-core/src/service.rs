//! The credit tracking service: one object per signed-in user session.

use std::sync::Arc;

use creditcal_client::CreditsApi;
use creditcal_models::{
    CalendarQuery, CalendarUserCredits, CreditHidePreferenceUpdate, UsageEdit, UserCredit,
    UserCreditsTrackingPreferences, YearMonth,
};
use serde_json::Value;
use tracing::{info, warn};

use crate::calendar_store::{CreditCalendarStore, MonthLoad};
use crate::clock::{Clock, SystemClock};
use crate::config::CalendarConfig;
use crate::debounce::DebouncedSyncCoordinator;
use crate::error::{SyncError, SyncResult};
use crate::optimistic_guard::{GuardKey, OptimisticGuard};

/// Caches, optimistic-update guard and sync coordination for one user.
///
/// Nothing is shared between instances; sign-out is [`Self::clear_user_data`].
pub struct CreditTrackingService {
    api: Arc<dyn CreditsApi>,
    store: CreditCalendarStore,
    sync: Arc<DebouncedSyncCoordinator>,
    guard: OptimisticGuard,
    clock: Arc<dyn Clock>,
}

impl CreditTrackingService {
    pub fn new(api: Arc<dyn CreditsApi>, config: CalendarConfig, clock: Arc<dyn Clock>) -> Self {
        let sync = Arc::new(DebouncedSyncCoordinator::new(api.clone(), config.sync_debounce));
        let guard = OptimisticGuard::new(config.guard_window);
        let store = CreditCalendarStore::new(api.clone(), sync.clone(), clock.clone(), config);
        Self {
            api,
            store,
            sync,
            guard,
            clock,
        }
    }

    pub fn with_system_clock(api: Arc<dyn CreditsApi>, config: CalendarConfig) -> Self {
        Self::new(api, config, Arc::new(SystemClock))
    }

    pub fn store(&self) -> &CreditCalendarStore {
        &self.store
    }

    pub fn guard(&self) -> &OptimisticGuard {
        &self.guard
    }

    // =========================================================================
    // Calendar reads
    // =========================================================================

    pub async fn load_month_data(
        &self,
        year: i32,
        month: u32,
        query: &CalendarQuery,
    ) -> SyncResult<MonthLoad> {
        self.store.load_month_data(year, month, query).await
    }

    pub async fn get_credit_with_full_history(
        &self,
        card_id: &str,
        credit_id: &str,
        year: i32,
        query: &CalendarQuery,
    ) -> SyncResult<Option<UserCredit>> {
        self.store
            .get_credit_with_full_history(card_id, credit_id, year, query)
            .await
    }

    pub fn populate_cache_from_year_data(
        &self,
        year_data: &CalendarUserCredits,
        query: &CalendarQuery,
    ) {
        self.store.populate_cache_from_year_data(year_data, query);
    }

    pub async fn fetch_credit_range(
        &self,
        start: YearMonth,
        end: YearMonth,
    ) -> SyncResult<CalendarUserCredits> {
        self.store.fetch_credit_range(start, end).await
    }

    // =========================================================================
    // Usage edits
    // =========================================================================

    /// Validate and submit one usage edit.
    ///
    /// The period entry is protected for the duration of the request and
    /// released on success, failure or cancellation. Every cached calendar is
    /// dropped afterwards.
    pub async fn update_credit_history_entry(&self, edit: &UsageEdit) -> SyncResult<UserCredit> {
        let update = edit.normalize().map_err(|err| {
            warn!(
                card_id = %edit.card_id,
                credit_id = %edit.credit_id,
                error = %err,
                "Rejected usage edit"
            );
            SyncError::InvalidUsage(err)
        })?;
        let key = GuardKey::new(&update.card_id, &update.credit_id, update.period_number);

        self.guard
            .run_protected(key, self.store.update_credit_history_entry(&update))
            .await
    }

    /// Whether an edit of this period entry is still awaiting confirmation.
    pub fn is_protected(&self, card_id: &str, credit_id: &str, period_number: u32) -> bool {
        self.guard.is_protected(card_id, credit_id, period_number)
    }

    // =========================================================================
    // Sync
    // =========================================================================

    /// Debounced sync of one year. Cached calendars of that year are dropped
    /// once it succeeds.
    pub async fn sync_year_credits_debounced(
        &self,
        year: i32,
        query: &CalendarQuery,
    ) -> SyncResult<CalendarUserCredits> {
        let synced = self.sync.sync(year, query).await?;
        self.store.invalidate_year(year);
        Ok(synced)
    }

    /// Debounced sync of the server's current year.
    pub async fn sync_current_year_credits_debounced(
        &self,
        query: &CalendarQuery,
    ) -> SyncResult<CalendarUserCredits> {
        let synced = self.sync.sync_current_year(query).await?;
        self.store.invalidate_year(synced.year);
        Ok(synced)
    }

    // =========================================================================
    // Preferences and statistics
    // =========================================================================

    pub async fn fetch_credit_tracking_preferences(
        &self,
    ) -> SyncResult<UserCreditsTrackingPreferences> {
        Ok(self.api.fetch_preferences().await?)
    }

    /// Hide or show one credit. Cached calendars are dropped on success since
    /// hidden flags change filtered results.
    pub async fn update_credit_hide_preference(
        &self,
        update: &CreditHidePreferenceUpdate,
    ) -> SyncResult<UserCreditsTrackingPreferences> {
        let preferences = self.api.update_hide_preference(update).await?;
        self.store.clear_cache();
        Ok(preferences)
    }

    pub async fn fetch_monthly_stats(&self, month: Option<YearMonth>) -> SyncResult<Value> {
        Ok(self.api.fetch_monthly_stats(month).await?)
    }

    pub async fn fetch_monthly_summary(&self, month: Option<YearMonth>) -> SyncResult<Value> {
        Ok(self.api.fetch_monthly_summary(month).await?)
    }

    pub async fn fetch_historical_monthly_summary(&self) -> SyncResult<Value> {
        Ok(self.api.fetch_historical_monthly_summary().await?)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    pub fn clear_cache(&self) {
        self.store.clear_cache();
    }

    pub fn clear_cache_for_options(&self, query: &CalendarQuery) {
        self.store.clear_cache_for_options(query);
    }

    /// Forget everything held for the current user (sign-out).
    pub fn clear_user_data(&self) {
        self.store.clear_cache();
        self.guard.clear_all();
        info!(current_year = self.clock.current_year(), "Cleared credit tracking data");
    }

    /// Clear user data and cancel pending syncs. Their callers get
    /// [`SyncError::CoordinatorClosed`].
    pub fn dispose(&self) {
        self.clear_user_data();
        self.sync.close();
    }
}
