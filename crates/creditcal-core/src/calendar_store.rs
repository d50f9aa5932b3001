//! Month and year calendar caches on top of the credits API.
//!
//! Month loads are resilient: apart from a missing session they never fail.
//! A year that has not been synced yet is synced once (debounced) and the
//! fetch retried once; anything else degrades to an empty slice that is
//! cached like real data, and the result says so via [`MonthLoad`].
//!
//! Full years back the per-credit detail view and are sliced locally into
//! the twelve month entries without further requests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use creditcal_client::CreditsApi;
use creditcal_models::{
    CalendarQuery, CalendarUserCredits, CreditHistoryUpdate, UserCredit, YearMonth,
};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::clock::{Clock, YearPolicy};
use crate::config::CalendarConfig;
use crate::debounce::DebouncedSyncCoordinator;
use crate::error::{SyncError, SyncResult};
use crate::keyed_cache::{CacheOptions, KeyedCache};
use crate::metrics::record_month_degraded;

// =============================================================================
// Month load results
// =============================================================================

/// Why a month load returned an empty slice instead of server data.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum DegradeReason {
    /// The year was still missing after one sync and retry.
    YearNotSynced,
    /// Any other fetch failure.
    FetchFailed(String),
}

impl DegradeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::YearNotSynced => "year_not_synced",
            Self::FetchFailed(_) => "fetch_failed",
        }
    }
}

/// Outcome of a month load.
///
/// Only `Loaded` reflects what the server holds; the other variants carry an
/// empty slice so a view can still render.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MonthLoad {
    Loaded {
        slice: CalendarUserCredits,
    },
    Degraded {
        slice: CalendarUserCredits,
        reason: DegradeReason,
    },
    /// The year policy does not allow loading this year.
    OutOfPolicy {
        slice: CalendarUserCredits,
    },
}

impl MonthLoad {
    pub fn slice(&self) -> &CalendarUserCredits {
        match self {
            Self::Loaded { slice } | Self::Degraded { slice, .. } | Self::OutOfPolicy { slice } => {
                slice
            }
        }
    }

    pub fn into_slice(self) -> CalendarUserCredits {
        match self {
            Self::Loaded { slice } | Self::Degraded { slice, .. } | Self::OutOfPolicy { slice } => {
                slice
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded { .. })
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    fn degraded(year: i32, month: u32, reason: DegradeReason) -> Self {
        record_month_degraded(reason.as_str());
        Self::Degraded {
            slice: CalendarUserCredits::empty_month(year, month),
            reason,
        }
    }
}

// =============================================================================
// Store
// =============================================================================

pub struct CreditCalendarStore {
    api: Arc<dyn CreditsApi>,
    sync: Arc<DebouncedSyncCoordinator>,
    clock: Arc<dyn Clock>,
    config: CalendarConfig,
    months: KeyedCache<MonthLoad>,
    years: KeyedCache<CalendarUserCredits>,
    purged: AtomicBool,
}

impl CreditCalendarStore {
    pub fn new(
        api: Arc<dyn CreditsApi>,
        sync: Arc<DebouncedSyncCoordinator>,
        clock: Arc<dyn Clock>,
        config: CalendarConfig,
    ) -> Self {
        Self {
            months: KeyedCache::new("month", config.month_ttl),
            years: KeyedCache::new("year", config.year_ttl),
            api,
            sync,
            clock,
            config,
            purged: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &CalendarConfig {
        &self.config
    }

    /// Load the slice for a 1-based month, from cache when fresh.
    pub async fn load_month_data(
        &self,
        year: i32,
        month: u32,
        query: &CalendarQuery,
    ) -> SyncResult<MonthLoad> {
        self.load_month(year, month, query, false).await
    }

    /// Like [`Self::load_month_data`], but always goes to the server.
    pub async fn refresh_month_data(
        &self,
        year: i32,
        month: u32,
        query: &CalendarQuery,
    ) -> SyncResult<MonthLoad> {
        self.load_month(year, month, query, true).await
    }

    async fn load_month(
        &self,
        year: i32,
        month: u32,
        query: &CalendarQuery,
        force_refresh: bool,
    ) -> SyncResult<MonthLoad> {
        if !(1..=12).contains(&month) {
            return Err(SyncError::InvalidMonth(month));
        }
        self.purge_once();

        let current_year = self.clock.current_year();
        if !self.config.year_policy.allows(year, current_year) {
            debug!(year, month, current_year, "Year outside load policy");
            return Ok(MonthLoad::OutOfPolicy {
                slice: CalendarUserCredits::empty_month(year, month),
            });
        }

        let key = query.month_key(year, month);
        let options = self
            .cache_options(self.config.month_ttl)
            .force_refresh(force_refresh);
        let loader = self.loader();
        let query = query.clone();
        let span = info_span!("load_month", year, month, key = %key);

        self.months
            .get(&key, options, move || {
                loader.fetch_month(year, month, query).instrument(span)
            })
            .await
    }

    /// Cache a full year and its twelve month slices. No requests are made.
    ///
    /// A year fetched with `include_expiring` holds credits the month endpoint
    /// never returns, so only the year entry is cached for it.
    pub fn populate_cache_from_year_data(
        &self,
        year_data: &CalendarUserCredits,
        query: &CalendarQuery,
    ) {
        let year = year_data.year;
        self.years.set(query.year_key(year), year_data.clone());
        if query.include_expiring {
            debug!(year, "Cached expiring-inclusive year without month slices");
            return;
        }
        for slice in year_data.month_slices() {
            let month = slice.month.unwrap_or_default();
            self.months
                .set(query.month_key(year, month), MonthLoad::Loaded { slice });
        }
        debug!(year, credits = year_data.credits.len(), "Populated caches from year data");
    }

    /// One credit with its history for every period of `year`.
    ///
    /// Served from the year cache when fresh; otherwise the year is fetched
    /// (with the same sync-and-retry on a missing year) and cached.
    pub async fn get_credit_with_full_history(
        &self,
        card_id: &str,
        credit_id: &str,
        year: i32,
        query: &CalendarQuery,
    ) -> SyncResult<Option<UserCredit>> {
        let key = query.year_key(year);
        if let Some(data) = self.years.peek(&key, Some(self.config.year_ttl)) {
            return Ok(data.find_credit(card_id, credit_id).cloned());
        }

        let loader = self.loader();
        let owned_query = query.clone();
        let data = self
            .years
            .get(&key, self.cache_options(self.config.year_ttl), move || {
                loader.fetch_year(year, owned_query)
            })
            .await?;

        // Only slice what the year cache kept; an invalidated load is not stored.
        let stored = self.years.peek(&key, Some(self.config.year_ttl));
        if stored.as_ref() == Some(&data) {
            self.populate_cache_from_year_data(&data, query);
        } else {
            debug!(year, key = %key, "Year load was invalidated in flight, not populating months");
        }
        Ok(data.find_credit(card_id, credit_id).cloned())
    }

    /// Write one history entry, then drop every cached calendar.
    ///
    /// Caches are cleared whether or not the write succeeded.
    pub async fn update_credit_history_entry(
        &self,
        update: &CreditHistoryUpdate,
    ) -> SyncResult<UserCredit> {
        let result = self.api.update_history(update).await.map_err(SyncError::from);
        self.clear_cache();
        if let Err(err) = &result {
            warn!(
                card_id = %update.card_id,
                credit_id = %update.credit_id,
                period_number = update.period_number,
                error = %err,
                "Credit history update failed"
            );
        }
        result
    }

    /// Credits for an arbitrary month range. Not cached.
    pub async fn fetch_credit_range(
        &self,
        start: YearMonth,
        end: YearMonth,
    ) -> SyncResult<CalendarUserCredits> {
        Ok(self.api.fetch_range(start, end).await?)
    }

    pub fn clear_cache(&self) {
        self.months.clear();
        self.years.clear();
    }

    /// Drop every month and year entry cached for `query`'s options.
    pub fn clear_cache_for_options(&self, query: &CalendarQuery) {
        let fragment = regex::escape(&query.cache_fragment());
        let pattern = format!(
            r"^(?:year:\d+-{fragment}-(?:true|false)|\d+-\d+-{fragment})$"
        );
        match Regex::new(&pattern) {
            Ok(pattern) => {
                let dropped = self.months.invalidate_matching(&pattern)
                    + self.years.invalidate_matching(&pattern);
                debug!(fragment = %query.cache_fragment(), dropped, "Cleared cache for options");
            }
            Err(err) => {
                warn!(error = %err, "Invalid cache key pattern, clearing all caches");
                self.clear_cache();
            }
        }
    }

    /// Drop every entry that is not for the current calendar year.
    pub fn clear_non_current_year_cache(&self) {
        let current_year = self.clock.current_year();
        let keep = |key: &str| key_year(key) == Some(current_year);
        let dropped = self.months.retain_keys(keep) + self.years.retain_keys(keep);
        if dropped > 0 {
            info!(current_year, dropped, "Purged cached calendars of other years");
        }
    }

    /// Drop every entry for `year`, whatever its options.
    pub fn invalidate_year(&self, year: i32) {
        let drop_year = |key: &str| key_year(key) != Some(year);
        self.months.retain_keys(drop_year);
        self.years.retain_keys(drop_year);
    }

    /// Fresh cached month result, without loading.
    pub fn cached_month(
        &self,
        year: i32,
        month: u32,
        query: &CalendarQuery,
    ) -> Option<MonthLoad> {
        self.months.peek(&query.month_key(year, month), None)
    }

    /// Every cached month and year key, sorted.
    pub fn cached_keys(&self) -> Vec<String> {
        let mut keys = self.months.keys();
        keys.extend(self.years.keys());
        keys.sort();
        keys
    }

    fn cache_options(&self, ttl: std::time::Duration) -> CacheOptions {
        CacheOptions {
            ttl: Some(ttl),
            force_refresh: false,
            join_timeout: Some(self.config.peer_wait_timeout),
        }
    }

    fn loader(&self) -> CalendarLoader {
        CalendarLoader {
            api: self.api.clone(),
            sync: self.sync.clone(),
            months: self.months.clone(),
        }
    }

    fn purge_once(&self) {
        if self.config.year_policy != YearPolicy::CurrentYearOnly {
            return;
        }
        if !self.purged.swap(true, Ordering::SeqCst) {
            self.clear_non_current_year_cache();
        }
    }
}

/// Year a month key (`2024-3-…`) or year key (`year:2024-…`) belongs to.
fn key_year(key: &str) -> Option<i32> {
    let key = key.strip_prefix("year:").unwrap_or(key);
    key.split_once('-')?.0.parse().ok()
}

// =============================================================================
// Producers
// =============================================================================

/// State a month or year load carries once it runs detached from the
/// store.
struct CalendarLoader {
    api: Arc<dyn CreditsApi>,
    sync: Arc<DebouncedSyncCoordinator>,
    months: KeyedCache<MonthLoad>,
}

impl CalendarLoader {
    async fn fetch_month(
        self,
        year: i32,
        month: u32,
        query: CalendarQuery,
    ) -> SyncResult<MonthLoad> {
        let err = match self.api.fetch_month(year, month, &query).await {
            Ok(slice) => return Ok(MonthLoad::Loaded { slice }),
            Err(err) => SyncError::from_fetch(year, err),
        };

        if err.is_not_authenticated() {
            return Err(err);
        }
        if !err.is_year_not_synced() {
            warn!(year, month, error = %err, "Month load failed, serving empty slice");
            return Ok(MonthLoad::degraded(
                year,
                month,
                DegradeReason::FetchFailed(err.to_string()),
            ));
        }

        info!(year, month, "Year not synced, syncing before retry");
        self.sync_before_retry(year, &query).await?;

        match self.api.fetch_month(year, month, &query).await {
            Ok(slice) => Ok(MonthLoad::Loaded { slice }),
            Err(err) => {
                let err = SyncError::from_fetch(year, err);
                if err.is_not_authenticated() {
                    return Err(err);
                }
                warn!(
                    year,
                    month,
                    error = %err,
                    "Month retry after sync failed, serving empty slice"
                );
                let reason = if err.is_year_not_synced() {
                    DegradeReason::YearNotSynced
                } else {
                    DegradeReason::FetchFailed(err.to_string())
                };
                Ok(MonthLoad::degraded(year, month, reason))
            }
        }
    }

    async fn fetch_year(self, year: i32, query: CalendarQuery) -> SyncResult<CalendarUserCredits> {
        let err = match self.api.fetch_year(year, &query).await {
            Ok(data) => return Ok(data),
            Err(err) => SyncError::from_fetch(year, err),
        };
        if !err.is_year_not_synced() {
            return Err(err);
        }

        info!(year, "Year not synced, syncing before retry");
        self.sync_before_retry(year, &query).await?;
        self.api
            .fetch_year(year, &query)
            .await
            .map_err(|err| SyncError::from_fetch(year, err))
    }

    /// Sync `year`; only a missing session stops the retry that follows.
    ///
    /// After a successful sync, months of `year` that degraded because it
    /// was missing are dropped so the next load sees the synced data.
    async fn sync_before_retry(&self, year: i32, query: &CalendarQuery) -> SyncResult<()> {
        match self.sync.sync(year, query).await {
            Ok(_) => {
                let dropped = self.months.invalidate_where(|key, load| {
                    key_year(key) == Some(year)
                        && matches!(
                            load,
                            MonthLoad::Degraded {
                                reason: DegradeReason::YearNotSynced,
                                ..
                            }
                        )
                });
                if dropped > 0 {
                    debug!(year, dropped, "Dropped months degraded before the year synced");
                }
                Ok(())
            }
            Err(err) if err.is_not_authenticated() => Err(err),
            Err(err) => {
                warn!(year, error = %err, "Sync before retry failed");
                Ok(())
            }
        }
    }
}
