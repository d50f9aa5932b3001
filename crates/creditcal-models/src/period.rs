//! Credit periods and period-number arithmetic.
//!
//! A calendar year is partitioned into `period_count()` equal runs of months.
//! Period numbers are 1-based; months are zero-based (`0..=11`) unless a
//! function says otherwise. Everything here is a pure function of its inputs,
//! so there are no clock reads in this module.

use chrono::{Datelike, NaiveDate};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Month abbreviations used for monthly period labels.
pub const MONTH_ABBREVIATIONS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// How often a credit resets within a calendar year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum CreditPeriod {
    Monthly,
    Quarterly,
    Semiannually,
    #[default]
    Annually,
}

impl CreditPeriod {
    /// All periods, shortest first.
    pub const ALL: [CreditPeriod; 4] = [
        CreditPeriod::Monthly,
        CreditPeriod::Quarterly,
        CreditPeriod::Semiannually,
        CreditPeriod::Annually,
    ];

    /// Returns the wire name of the period.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Semiannually => "semiannually",
            Self::Annually => "annually",
        }
    }

    /// Parse from the wire name (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "monthly" => Some(Self::Monthly),
            "quarterly" => Some(Self::Quarterly),
            "semiannually" => Some(Self::Semiannually),
            "annually" => Some(Self::Annually),
            _ => None,
        }
    }

    /// Number of intervals in a calendar year.
    pub fn period_count(&self) -> u32 {
        match self {
            Self::Monthly => 12,
            Self::Quarterly => 4,
            Self::Semiannually => 2,
            Self::Annually => 1,
        }
    }

    /// Months covered by a single interval.
    pub fn months_per_period(&self) -> u32 {
        12 / self.period_count()
    }

    /// True if `period_number` lies in `[1, period_count]`.
    pub fn is_valid_period_number(&self, period_number: u32) -> bool {
        (1..=self.period_count()).contains(&period_number)
    }

    fn clamp_period_number(&self, period_number: u32) -> u32 {
        period_number.clamp(1, self.period_count())
    }

    /// Period number containing the zero-based month.
    ///
    /// Out-of-range months are clamped into the last period.
    pub fn period_number_for_month(&self, month0: u32) -> u32 {
        self.clamp_period_number(month0 / self.months_per_period() + 1)
    }

    /// Period number containing a calendar date.
    pub fn period_number_for_date(&self, date: NaiveDate) -> u32 {
        self.period_number_for_month(date.month0())
    }

    /// Zero-based first and last month (inclusive) of a period.
    pub fn month_range(&self, period_number: u32) -> (u32, u32) {
        let months = self.months_per_period();
        let first = (self.clamp_period_number(period_number) - 1) * months;
        (first, first + months - 1)
    }

    /// Inclusive calendar bounds of a period in `year`.
    ///
    /// Returns `None` only for years chrono cannot represent.
    pub fn date_range(&self, period_number: u32, year: i32) -> Option<(NaiveDate, NaiveDate)> {
        let (first, last) = self.month_range(period_number);
        let start = NaiveDate::from_ymd_opt(year, first + 1, 1)?;
        let end = last_day_of_month(year, last + 1)?;
        Some((start, end))
    }

    /// True if the period lies entirely after the reference date's month.
    ///
    /// Years are compared first, so any period of a later year is in the
    /// future and any period of an earlier year is not.
    pub fn is_period_future(&self, period_number: u32, year: i32, reference: NaiveDate) -> bool {
        match year.cmp(&reference.year()) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => {
                let (first, _) = self.month_range(period_number);
                first > reference.month0()
            }
        }
    }

    /// Short display label for a period.
    ///
    /// `Jan`..`Dec` for monthly, `Q1`..`Q4` for quarterly, `H1`/`H2` for
    /// semiannual and the year itself for annual credits.
    pub fn label_for(&self, period_number: u32, year: i32) -> String {
        let n = self.clamp_period_number(period_number);
        match self {
            Self::Monthly => MONTH_ABBREVIATIONS[(n - 1) as usize].to_string(),
            Self::Quarterly => format!("Q{}", n),
            Self::Semiannually => format!("H{}", n),
            Self::Annually => year.to_string(),
        }
    }
}

impl std::fmt::Display for CreditPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Last day of a 1-based month.
fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}

/// Parse an anniversary date in `MM-DD` form.
pub fn parse_anniversary_date(value: &str) -> Option<(u32, u32)> {
    let (month, day) = value.trim().split_once('-')?;
    let month: u32 = month.parse().ok()?;
    let day: u32 = day.parse().ok()?;
    // 2000 is a leap year, so Feb 29 passes.
    NaiveDate::from_ymd_opt(2000, month, day)?;
    Some((month, day))
}

/// Anniversary in a given year; Feb 29 falls back to Feb 28 in non-leap years.
fn anniversary_in_year(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day).or_else(|| {
        if month == 2 && day == 29 {
            NaiveDate::from_ymd_opt(year, 2, 28)
        } else {
            None
        }
    })
}

/// Inclusive bounds of an anniversary-based credit year.
///
/// Starts on the card's opening anniversary in `anniversary_year` and ends
/// the day before the following anniversary.
pub fn anniversary_date_range(
    anniversary_date: &str,
    anniversary_year: i32,
) -> Option<(NaiveDate, NaiveDate)> {
    let (month, day) = parse_anniversary_date(anniversary_date)?;
    let start = anniversary_in_year(anniversary_year, month, day)?;
    let next = anniversary_in_year(anniversary_year + 1, month, day)?;
    Some((start, next.pred_opt()?))
}
