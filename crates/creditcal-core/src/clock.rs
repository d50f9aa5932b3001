//! Calendar clock and the year-loading policy.

use chrono::{Datelike, Local, NaiveDate};

/// Source of "today" for year and period decisions.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;

    fn current_year(&self) -> i32 {
        self.today().year()
    }
}

/// The user's local calendar date.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// A clock pinned to one date.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

/// Which years background month loads may fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum YearPolicy {
    /// Only the current calendar year.
    #[default]
    CurrentYearOnly,
    /// The current year and up to `max_historical_years` before it.
    Recent { max_historical_years: u32 },
    /// Any year.
    Any,
}

impl YearPolicy {
    /// Parse `current`, `any` or `recent:N`.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_lowercase();
        match value.as_str() {
            "current" => Some(Self::CurrentYearOnly),
            "any" => Some(Self::Any),
            _ => value
                .strip_prefix("recent:")
                .and_then(|n| n.parse().ok())
                .map(|max_historical_years| Self::Recent {
                    max_historical_years,
                }),
        }
    }

    pub fn allows(&self, year: i32, current_year: i32) -> bool {
        match self {
            Self::CurrentYearOnly => year == current_year,
            Self::Recent {
                max_historical_years,
            } => {
                year <= current_year
                    && i64::from(current_year) - i64::from(year) <= i64::from(*max_historical_years)
            }
            Self::Any => true,
        }
    }
}
