//! Credits REST API client.
//!
//! - Bearer auth from an injected [`AccessTokenSource`]
//! - HTTP client tuning (pooling, timeouts)
//! - Back-off and re-send for reads
//! - Observability (tracing spans, metrics)

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use creditcal_models::{
    CalendarQuery, CalendarUserCredits, CreditHidePreferenceUpdate, CreditHistoryUpdate,
    UserCredit, UserCreditsTrackingPreferences, YearMonth,
};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info_span, warn, Instrument};
use url::Url;
use uuid::Uuid;

use crate::api::CreditsApi;
use crate::auth::{require_token, AccessTokenSource};
use crate::config::ApiClientConfig;
use crate::error::{ApiError, ApiResult};
use crate::metrics::{record_call, record_resend};

/// Path prefix shared by every endpoint.
const CREDITS_PATH: &str = "users/cards/credits";

/// Header carrying a per-request correlation id.
const REQUEST_ID_HEADER: &str = "x-request-id";

/// HTTP implementation of [`CreditsApi`].
#[derive(Clone)]
pub struct HttpCreditsApi {
    http: Client,
    config: ApiClientConfig,
    base_url: String,
    tokens: Arc<dyn AccessTokenSource>,
}

impl HttpCreditsApi {
    /// Create a new client.
    pub fn new(config: ApiClientConfig, tokens: Arc<dyn AccessTokenSource>) -> ApiResult<Self> {
        let base_url = config
            .parsed_base_url()?
            .as_str()
            .trim_end_matches('/')
            .to_string();

        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("creditcal-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ApiError::Network)?;

        Ok(Self {
            http,
            config,
            base_url,
            tokens,
        })
    }

    /// Create from environment variables.
    pub fn from_env(tokens: Arc<dyn AccessTokenSource>) -> ApiResult<Self> {
        Self::new(ApiClientConfig::from_env()?, tokens)
    }

    pub fn config(&self) -> &ApiClientConfig {
        &self.config
    }

    /// Build an endpoint URL with query parameters.
    fn endpoint(&self, path: &str, params: &[(&str, String)]) -> ApiResult<Url> {
        let raw = format!("{}/{}/{}", self.base_url, CREDITS_PATH, path);
        let mut url = Url::parse(&raw)
            .map_err(|e| ApiError::Config(format!("invalid endpoint {:?}: {}", raw, e)))?;
        if !params.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url)
    }

    /// Query parameters shared by month and year fetches.
    fn calendar_params(query: &CalendarQuery, with_expiring: bool) -> Vec<(&'static str, String)> {
        let mut params: Vec<(&'static str, String)> = query
            .sorted_card_ids()
            .into_iter()
            .map(|id| ("cardIds[]", id.to_string()))
            .collect();
        if query.exclude_hidden {
            params.push(("excludeHidden", "true".to_string()));
        }
        if with_expiring && query.include_expiring {
            params.push(("includeExpiring", "true".to_string()));
        }
        params
    }

    fn month_params(month: Option<YearMonth>) -> Vec<(&'static str, String)> {
        month
            .map(|m| vec![("year", m.year.to_string()), ("month", m.month.to_string())])
            .unwrap_or_default()
    }

    // =========================================================================
    // Request execution
    // =========================================================================

    /// Send one request inside a span and record its outcome.
    async fn execute<T, B>(
        &self,
        operation: &'static str,
        method: Method,
        url: &Url,
        body: Option<&B>,
    ) -> ApiResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + Sync + ?Sized,
    {
        let span = info_span!(
            "credits_api_request",
            operation,
            method = %method,
            path = %url.path()
        );

        let start = Instant::now();
        let result = self.send_once::<T, B>(method, url, body).instrument(span).await;
        record_call(operation, &result, start.elapsed());
        result
    }

    /// GET with the configured back-off on rate limiting and network errors.
    async fn get<T: DeserializeOwned>(&self, operation: &'static str, url: Url) -> ApiResult<T> {
        let mut attempt = 0;
        loop {
            let err = match self.execute::<T, ()>(operation, Method::GET, &url, None).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            let Some(delay) = self.config.retry.backoff(attempt, &err) else {
                return Err(err);
            };
            warn!(
                operation,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Credits API read failed, sending again"
            );
            record_resend(operation, &err);
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn send_once<T, B>(&self, method: Method, url: &Url, body: Option<&B>) -> ApiResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + Sync + ?Sized,
    {
        let token = require_token(self.tokens.as_ref()).await?;
        let request_id = Uuid::new_v4().to_string();

        let mut request = self
            .http
            .request(method, url.clone())
            .bearer_auth(&token)
            .header(REQUEST_ID_HEADER, &request_id);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        debug!(request_id = %request_id, status = status.as_u16(), "Credits API response");

        if status.is_success() {
            let bytes = response.bytes().await?;
            return Ok(serde_json::from_slice(&bytes)?);
        }

        Err(Self::handle_error_response(url, response).await)
    }

    async fn handle_error_response(url: &Url, response: Response) -> ApiError {
        let status = response.status();
        let retry_after_secs = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();

        match (status, retry_after_secs) {
            (StatusCode::TOO_MANY_REQUESTS, Some(secs)) => {
                ApiError::RateLimited(secs.saturating_mul(1000))
            }
            _ => ApiError::from_http_status(
                status.as_u16(),
                format!("{} failed: {}", url.path(), body),
            ),
        }
    }
}

#[async_trait]
impl CreditsApi for HttpCreditsApi {
    async fn fetch_month(
        &self,
        year: i32,
        month: u32,
        query: &CalendarQuery,
    ) -> ApiResult<CalendarUserCredits> {
        let url = self.endpoint(
            &format!("month/{}/{}", year, month),
            &Self::calendar_params(query, false),
        )?;
        self.get("fetch_month", url).await
    }

    async fn fetch_year(&self, year: i32, query: &CalendarQuery) -> ApiResult<CalendarUserCredits> {
        let url = self.endpoint(
            &format!("year/{}", year),
            &Self::calendar_params(query, true),
        )?;
        self.get("fetch_year", url).await
    }

    async fn fetch_range(
        &self,
        start: YearMonth,
        end: YearMonth,
    ) -> ApiResult<CalendarUserCredits> {
        let url = self.endpoint(
            "range",
            &[("start", start.to_string()), ("end", end.to_string())],
        )?;
        self.get("fetch_range", url).await
    }

    async fn update_history(&self, update: &CreditHistoryUpdate) -> ApiResult<UserCredit> {
        let url = self.endpoint("history", &[])?;
        self.execute("update_history", Method::PUT, &url, Some(update))
            .await
    }

    async fn sync_credits(
        &self,
        year: Option<i32>,
        query: &CalendarQuery,
    ) -> ApiResult<CalendarUserCredits> {
        let mut params = Vec::new();
        if let Some(year) = year {
            params.push(("year", year.to_string()));
        }
        if query.exclude_hidden {
            params.push(("excludeHidden", "true".to_string()));
        }
        let url = self.endpoint("sync", &params)?;
        self.execute::<_, ()>("sync_credits", Method::POST, &url, None)
            .await
    }

    async fn fetch_preferences(&self) -> ApiResult<UserCreditsTrackingPreferences> {
        let url = self.endpoint("preferences", &[])?;
        self.get("fetch_preferences", url).await
    }

    async fn update_hide_preference(
        &self,
        update: &CreditHidePreferenceUpdate,
    ) -> ApiResult<UserCreditsTrackingPreferences> {
        let url = self.endpoint("preferences", &[])?;
        self.execute("update_hide_preference", Method::PUT, &url, Some(update))
            .await
    }

    async fn fetch_monthly_stats(&self, month: Option<YearMonth>) -> ApiResult<Value> {
        let url = self.endpoint("monthly-stats", &Self::month_params(month))?;
        self.get("fetch_monthly_stats", url).await
    }

    async fn fetch_monthly_summary(&self, month: Option<YearMonth>) -> ApiResult<Value> {
        let url = self.endpoint("monthly-summary", &Self::month_params(month))?;
        self.get("fetch_monthly_summary", url).await
    }

    async fn fetch_historical_monthly_summary(&self) -> ApiResult<Value> {
        let url = self.endpoint("historical-monthly-summary", &[])?;
        self.get("fetch_historical_monthly_summary", url).await
    }
}
