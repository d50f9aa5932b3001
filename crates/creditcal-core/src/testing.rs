//! In-memory `CreditsApi` used by the core's unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use creditcal_client::{ApiError, ApiResult, CreditsApi};
use creditcal_models::{
    CalendarQuery, CalendarUserCredits, CreditHidePreferenceUpdate, CreditHistoryUpdate,
    CreditPeriod, CardTrackingPreferences, CreditTrackingPreference, SingleCreditHistory,
    UsageState, UserCredit, UserCreditsTrackingPreferences, YearMonth,
};
use serde_json::{json, Value};

#[derive(Default)]
struct FakeState {
    years: HashMap<i32, CalendarUserCredits>,
    synced: HashSet<i32>,
    sync_fixes_year: bool,
    failing: bool,
    signed_out: bool,
    delay: Duration,
    sync_requests: Vec<Option<i32>>,
    updates: Vec<CreditHistoryUpdate>,
    preferences: UserCreditsTrackingPreferences,
}

/// Server double: a set of years, of which only the synced ones can be read.
#[derive(Default)]
pub(crate) struct FakeCreditsApi {
    state: Mutex<FakeState>,
    month_calls: AtomicUsize,
    year_calls: AtomicUsize,
    sync_calls: AtomicUsize,
    update_calls: AtomicUsize,
}

impl FakeCreditsApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// A readable year.
    pub fn with_year(self, data: CalendarUserCredits) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.synced.insert(data.year);
            state.years.insert(data.year, data);
        }
        self
    }

    /// A year that answers 404 until synced.
    pub fn with_unsynced_year(self, data: CalendarUserCredits, sync_fixes_year: bool) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.sync_fixes_year = sync_fixes_year;
            state.years.insert(data.year, data);
        }
        self
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        self.state.lock().unwrap().delay = delay;
        self
    }

    pub fn set_sync_fixes_year(&self, sync_fixes_year: bool) {
        self.state.lock().unwrap().sync_fixes_year = sync_fixes_year;
    }

    pub fn set_failing(&self, failing: bool) {
        self.state.lock().unwrap().failing = failing;
    }

    pub fn set_signed_out(&self, signed_out: bool) {
        self.state.lock().unwrap().signed_out = signed_out;
    }

    pub fn month_calls(&self) -> usize {
        self.month_calls.load(Ordering::SeqCst)
    }

    pub fn year_calls(&self) -> usize {
        self.year_calls.load(Ordering::SeqCst)
    }

    pub fn sync_calls(&self) -> usize {
        self.sync_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn sync_requests(&self) -> Vec<Option<i32>> {
        self.state.lock().unwrap().sync_requests.clone()
    }

    pub fn updates(&self) -> Vec<CreditHistoryUpdate> {
        self.state.lock().unwrap().updates.clone()
    }

    fn delay(&self) -> Duration {
        self.state.lock().unwrap().delay
    }

    async fn pause(&self) {
        let delay = self.delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn check_session(&self) -> ApiResult<()> {
        let state = self.state.lock().unwrap();
        if state.signed_out {
            return Err(ApiError::not_authenticated("no user session"));
        }
        if state.failing {
            return Err(ApiError::from_http_status(500, "internal error"));
        }
        Ok(())
    }

    fn readable_year(&self, year: i32, query: &CalendarQuery) -> ApiResult<CalendarUserCredits> {
        self.check_session()?;
        let state = self.state.lock().unwrap();
        if !state.synced.contains(&year) {
            return Err(ApiError::from_http_status(404, "Year not found"));
        }
        let mut data = state
            .years
            .get(&year)
            .cloned()
            .unwrap_or_else(|| CalendarUserCredits::empty_year(year));
        if let Some(cards) = &query.card_ids {
            data.credits.retain(|c| cards.contains(&c.card_id));
        }
        Ok(data)
    }
}

#[async_trait]
impl CreditsApi for FakeCreditsApi {
    async fn fetch_month(
        &self,
        year: i32,
        month: u32,
        query: &CalendarQuery,
    ) -> ApiResult<CalendarUserCredits> {
        self.month_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        Ok(self.readable_year(year, query)?.month_slice(month))
    }

    async fn fetch_year(&self, year: i32, query: &CalendarQuery) -> ApiResult<CalendarUserCredits> {
        self.year_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.readable_year(year, query)
    }

    async fn fetch_range(
        &self,
        start: YearMonth,
        _end: YearMonth,
    ) -> ApiResult<CalendarUserCredits> {
        self.pause().await;
        self.readable_year(start.year, &CalendarQuery::default())
    }

    async fn update_history(&self, update: &CreditHistoryUpdate) -> ApiResult<UserCredit> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.check_session()?;
        let mut state = self.state.lock().unwrap();
        state.updates.push(update.clone());
        let year = update.year.unwrap_or(2024);
        let credit = state
            .years
            .get_mut(&year)
            .and_then(|data| {
                data.credits
                    .iter_mut()
                    .find(|c| c.matches(&update.card_id, &update.credit_id))
            })
            .ok_or_else(|| ApiError::from_http_status(404, "Credit not found"))?;

        credit.history.retain(|h| h.period_number != update.period_number);
        credit.history.push(SingleCreditHistory {
            period_number: update.period_number,
            usage: update.usage,
            value_used: update.value_used,
        });
        credit.history.sort_by_key(|h| h.period_number);
        Ok(credit.clone())
    }

    async fn sync_credits(
        &self,
        year: Option<i32>,
        query: &CalendarQuery,
    ) -> ApiResult<CalendarUserCredits> {
        self.sync_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.state.lock().unwrap().sync_requests.push(year);
        self.check_session()?;
        let year = {
            let mut state = self.state.lock().unwrap();
            let year = year.unwrap_or(2024);
            if state.sync_fixes_year {
                state.synced.insert(year);
            }
            year
        };
        match self.readable_year(year, query) {
            Ok(data) => Ok(data),
            Err(_) => Ok(CalendarUserCredits::empty_year(year)),
        }
    }

    async fn fetch_preferences(&self) -> ApiResult<UserCreditsTrackingPreferences> {
        self.check_session()?;
        Ok(self.state.lock().unwrap().preferences.clone())
    }

    async fn update_hide_preference(
        &self,
        update: &CreditHidePreferenceUpdate,
    ) -> ApiResult<UserCreditsTrackingPreferences> {
        self.check_session()?;
        let mut state = self.state.lock().unwrap();
        let cards = &mut state.preferences.card_preferences;
        let card = match cards.iter().position(|c| c.card_id == update.card_id) {
            Some(index) => &mut cards[index],
            None => {
                cards.push(CardTrackingPreferences {
                    card_id: update.card_id.clone(),
                    credits: Vec::new(),
                });
                cards.last_mut().unwrap()
            }
        };
        card.credits.retain(|c| c.credit_id != update.credit_id);
        card.credits.push(CreditTrackingPreference {
            credit_id: update.credit_id.clone(),
            is_hidden: update.is_hidden,
        });
        Ok(state.preferences.clone())
    }

    async fn fetch_monthly_stats(&self, month: Option<YearMonth>) -> ApiResult<Value> {
        self.check_session()?;
        Ok(json!({ "month": month.map(|m| m.to_string()), "totalValueUsed": 0 }))
    }

    async fn fetch_monthly_summary(&self, month: Option<YearMonth>) -> ApiResult<Value> {
        self.check_session()?;
        Ok(json!({ "month": month.map(|m| m.to_string()), "credits": [] }))
    }

    async fn fetch_historical_monthly_summary(&self) -> ApiResult<Value> {
        self.check_session()?;
        Ok(json!({ "months": [] }))
    }
}

/// A year with a quarterly dining credit and a monthly ride credit.
pub(crate) fn sample_year(year: i32) -> CalendarUserCredits {
    let dining = UserCredit {
        card_id: "amex-gold".to_string(),
        credit_id: "dining".to_string(),
        associated_period: CreditPeriod::Quarterly,
        history: (1..=4)
            .map(|n| SingleCreditHistory {
                period_number: n,
                usage: if n == 1 {
                    UsageState::Used
                } else {
                    UsageState::NotUsed
                },
                value_used: if n == 1 { 10.0 } else { 0.0 },
            })
            .collect(),
        is_anniversary_based: false,
        anniversary_date: None,
        anniversary_year: None,
    };
    let rides = UserCredit {
        card_id: "amex-plat".to_string(),
        credit_id: "rides".to_string(),
        associated_period: CreditPeriod::Monthly,
        history: (1..=12).map(SingleCreditHistory::unused).collect(),
        is_anniversary_based: false,
        anniversary_date: None,
        anniversary_year: None,
    };
    CalendarUserCredits {
        year,
        credits: vec![dining, rides],
        month: None,
    }
}
