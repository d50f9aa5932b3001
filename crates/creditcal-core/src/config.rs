//! Calendar core configuration.

use std::time::Duration;

use tracing::warn;

use crate::clock::YearPolicy;

/// Timing and policy knobs for the calendar core.
#[derive(Debug, Clone)]
pub struct CalendarConfig {
    /// Freshness of cached month slices.
    pub month_ttl: Duration,
    /// Freshness of cached full years.
    pub year_ttl: Duration,
    /// How long a caller waits on another caller's in-flight load.
    pub peer_wait_timeout: Duration,
    /// Window in which sync calls for one year are coalesced.
    pub sync_debounce: Duration,
    /// How long a submitted usage edit is protected from refreshes.
    pub guard_window: Duration,
    /// Years that background month loads may fetch.
    pub year_policy: YearPolicy,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            month_ttl: Duration::from_secs(300),
            year_ttl: Duration::from_secs(300),
            peer_wait_timeout: Duration::from_secs(10),
            sync_debounce: Duration::from_millis(500),
            guard_window: Duration::from_millis(3000),
            year_policy: YearPolicy::CurrentYearOnly,
        }
    }
}

impl CalendarConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let ttl = env_parse::<u64>("CREDIT_CACHE_TTL_SECS").map(Duration::from_secs);

        let year_policy = match std::env::var("CREDIT_YEAR_POLICY") {
            Ok(raw) => YearPolicy::parse(&raw).unwrap_or_else(|| {
                warn!(value = %raw, "Unrecognised CREDIT_YEAR_POLICY, using current year only");
                YearPolicy::CurrentYearOnly
            }),
            Err(_) => defaults.year_policy,
        };

        Self {
            month_ttl: ttl.unwrap_or(defaults.month_ttl),
            year_ttl: ttl.unwrap_or(defaults.year_ttl),
            peer_wait_timeout: env_parse::<u64>("CREDIT_PEER_WAIT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.peer_wait_timeout),
            sync_debounce: env_parse::<u64>("CREDIT_SYNC_DEBOUNCE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.sync_debounce),
            guard_window: env_parse::<u64>("CREDIT_GUARD_WINDOW_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.guard_window),
            year_policy,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}
