//! Credits API call metrics.
//!
//! One sample per HTTP attempt, labelled by operation and outcome, plus a
//! counter of re-sent reads. Recorded through the `metrics` facade; the
//! embedding application installs the exporter.

use std::time::Duration;

use metrics::{counter, histogram};

use crate::error::{ApiError, ApiResult};

const CALLS: &str = "creditcal_api_calls_total";
const CALL_SECONDS: &str = "creditcal_api_call_seconds";
const RESENDS: &str = "creditcal_api_resends_total";

/// Record one finished HTTP attempt.
pub(crate) fn record_call<T>(operation: &'static str, result: &ApiResult<T>, elapsed: Duration) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(err) => outcome_of(err),
    };
    counter!(CALLS, "operation" => operation, "outcome" => outcome).increment(1);
    histogram!(CALL_SECONDS, "operation" => operation).record(elapsed.as_secs_f64());
}

/// Record that a read is sent again after `error`.
pub(crate) fn record_resend(operation: &'static str, error: &ApiError) {
    counter!(RESENDS, "operation" => operation, "cause" => outcome_of(error)).increment(1);
}

fn outcome_of(err: &ApiError) -> &'static str {
    match err {
        ApiError::NotAuthenticated(_) => "not_authenticated",
        ApiError::NotFound(_) => "not_found",
        ApiError::RateLimited(_) => "rate_limited",
        ApiError::ServerError(..) => "server_error",
        ApiError::RequestFailed(_) => "rejected",
        ApiError::Network(_) => "network",
        ApiError::Json(_) => "bad_body",
        ApiError::Config(_) => "config",
    }
}
