//! Calendar aggregates.
//!
//! [`CalendarUserCredits`] is the unit the server hands out and the unit that
//! gets cached: one year of credits, each with its per-period history. A
//! month view is a projection of the year: every credit keeps only the history
//! entry for the period that contains the month.

use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::period::{anniversary_date_range, CreditPeriod};
use crate::usage::SingleCreditHistory;

/// One credit of one card, with its history for a year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserCredit {
    pub card_id: String,
    pub credit_id: String,
    pub associated_period: CreditPeriod,
    #[serde(default)]
    pub history: Vec<SingleCreditHistory>,

    /// Period starts on the card's opening anniversary instead of Jan 1.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_anniversary_based: bool,
    /// Anniversary in `MM-DD` form.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anniversary_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anniversary_year: Option<i32>,
}

impl UserCredit {
    /// Period number the credit uses for a zero-based month.
    ///
    /// Anniversary credits always have a single period.
    pub fn period_number_for_month(&self, month0: u32) -> u32 {
        if self.is_anniversary_based {
            1
        } else {
            self.associated_period.period_number_for_month(month0)
        }
    }

    /// History entry for a period number.
    pub fn history_for(&self, period_number: u32) -> Option<&SingleCreditHistory> {
        self.history.iter().find(|h| h.period_number == period_number)
    }

    /// Sum of tracked values across the history.
    pub fn total_value_used(&self) -> f64 {
        self.history.iter().map(SingleCreditHistory::tracked_value).sum()
    }

    /// Inclusive bounds of the anniversary credit year, when anniversary based.
    pub fn anniversary_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        if !self.is_anniversary_based {
            return None;
        }
        anniversary_date_range(self.anniversary_date.as_deref()?, self.anniversary_year?)
    }

    /// Copy of the credit restricted to the period containing `month0`.
    pub fn for_month(&self, month0: u32) -> UserCredit {
        let period_number = self.period_number_for_month(month0);
        UserCredit {
            history: self
                .history
                .iter()
                .filter(|h| h.period_number == period_number)
                .cloned()
                .collect(),
            ..self.clone()
        }
    }

    /// True if this credit is identified by the given card and credit ids.
    pub fn matches(&self, card_id: &str, credit_id: &str) -> bool {
        self.card_id == card_id && self.credit_id == credit_id
    }
}

/// A calendar year of credits, or a month slice of one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CalendarUserCredits {
    pub year: i32,
    #[serde(default)]
    pub credits: Vec<UserCredit>,
    /// 1-based month; present only on month slices.
    #[serde(rename = "_month", default, skip_serializing_if = "Option::is_none")]
    pub month: Option<u32>,
}

impl CalendarUserCredits {
    /// An empty year.
    pub fn empty_year(year: i32) -> Self {
        Self {
            year,
            credits: Vec::new(),
            month: None,
        }
    }

    /// An empty month slice.
    pub fn empty_month(year: i32, month: u32) -> Self {
        Self {
            year,
            credits: Vec::new(),
            month: Some(month),
        }
    }

    /// Project the year onto a 1-based month.
    ///
    /// Deterministic: the result depends only on `self` and `month`.
    pub fn month_slice(&self, month: u32) -> Self {
        let month0 = month.saturating_sub(1);
        Self {
            year: self.year,
            credits: self.credits.iter().map(|c| c.for_month(month0)).collect(),
            month: Some(month),
        }
    }

    /// All twelve month slices, January first.
    pub fn month_slices(&self) -> Vec<Self> {
        (1..=12).map(|month| self.month_slice(month)).collect()
    }

    /// Find a credit by card and credit id.
    pub fn find_credit(&self, card_id: &str, credit_id: &str) -> Option<&UserCredit> {
        self.credits.iter().find(|c| c.matches(card_id, credit_id))
    }

    /// Sum of tracked values across every credit.
    pub fn total_value_used(&self) -> f64 {
        self.credits.iter().map(UserCredit::total_value_used).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.credits.is_empty()
    }
}

/// A calendar month, used by the range endpoint.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub struct YearMonth {
    pub year: i32,
    /// 1-based month.
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }
}

impl std::fmt::Display for YearMonth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}
