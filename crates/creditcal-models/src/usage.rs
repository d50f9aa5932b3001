//! Per-period credit usage.
//!
//! Each credit has one [`SingleCreditHistory`] entry per period number of a
//! year. The usage state and the value used must agree with each other:
//! `used` means the full nominal value, `not_used` means zero and
//! `partially_used` lies strictly between. Edits coming from callers pass
//! through [`UsageEdit::normalize`] so inconsistent pairs never reach the API.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

use crate::period::CreditPeriod;

/// Usage state of one credit period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum UsageState {
    Used,
    #[default]
    NotUsed,
    PartiallyUsed,
    /// Not tracked; the stored value is kept but ignored for totals.
    Inactive,
    /// Not tracked; the stored value is kept but ignored for totals.
    Disabled,
}

impl UsageState {
    /// Returns the wire name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Used => "used",
            Self::NotUsed => "not_used",
            Self::PartiallyUsed => "partially_used",
            Self::Inactive => "inactive",
            Self::Disabled => "disabled",
        }
    }

    /// Whether the state counts towards usage totals.
    pub fn is_tracked(&self) -> bool {
        !matches!(self, Self::Inactive | Self::Disabled)
    }

    /// Tracked state implied by a value against the nominal maximum.
    pub fn for_value(value_used: f64, max_value: f64) -> Self {
        if value_used <= 0.0 {
            Self::NotUsed
        } else if value_used >= max_value {
            Self::Used
        } else {
            Self::PartiallyUsed
        }
    }
}

impl std::fmt::Display for UsageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Usage of one credit in one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SingleCreditHistory {
    pub period_number: u32,
    pub usage: UsageState,
    #[serde(default)]
    pub value_used: f64,
}

impl SingleCreditHistory {
    /// An untouched period.
    pub fn unused(period_number: u32) -> Self {
        Self {
            period_number,
            usage: UsageState::NotUsed,
            value_used: 0.0,
        }
    }

    /// Check the usage/value invariant against the credit's nominal maximum.
    pub fn is_consistent(&self, max_value: f64) -> bool {
        if !self.value_used.is_finite() || self.value_used < 0.0 || self.value_used > max_value {
            return false;
        }
        match self.usage {
            UsageState::Used => self.value_used == max_value,
            UsageState::NotUsed => self.value_used == 0.0,
            UsageState::PartiallyUsed => self.value_used > 0.0 && self.value_used < max_value,
            UsageState::Inactive | UsageState::Disabled => true,
        }
    }

    /// Value that counts towards totals.
    pub fn tracked_value(&self) -> f64 {
        if self.usage.is_tracked() {
            self.value_used
        } else {
            0.0
        }
    }
}

/// Reasons a usage edit is rejected at the mutation boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UsageValidationError {
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Invalid nominal value: {0}")]
    InvalidMaxValue(f64),

    #[error("Period {period_number} is outside 1..={count} for {period} credits")]
    PeriodOutOfRange {
        period_number: u32,
        period: CreditPeriod,
        count: u32,
    },

    #[error("Value {value} is outside 0..={max}")]
    ValueOutOfRange { value: f64, max: f64 },

    #[error("Partial usage needs a value strictly between 0 and {max}, got {value}")]
    InconsistentPartialUsage { value: f64, max: f64 },

    #[error("Edit carries neither a usage state nor a value")]
    NothingToUpdate,
}

/// A caller's requested change to one credit period.
///
/// `usage` and `value_used` may each be omitted; [`UsageEdit::normalize`]
/// fills in whichever is missing and rejects contradictory combinations.
#[derive(Debug, Clone, Validate)]
pub struct UsageEdit {
    #[validate(length(min = 1))]
    pub card_id: String,
    #[validate(length(min = 1))]
    pub credit_id: String,
    pub period: CreditPeriod,
    pub period_number: u32,
    pub year: Option<i32>,
    pub usage: Option<UsageState>,
    pub value_used: Option<f64>,
    /// Nominal maximum of the credit, from the card catalog.
    pub max_value: f64,
}

impl UsageEdit {
    /// Produce the request body for this edit, or reject it.
    pub fn normalize(&self) -> Result<CreditHistoryUpdate, UsageValidationError> {
        self.validate()
            .map_err(|e| UsageValidationError::InvalidIdentifier(e.to_string()))?;

        let max = self.max_value;
        if !max.is_finite() || max < 0.0 {
            return Err(UsageValidationError::InvalidMaxValue(max));
        }

        if !self.period.is_valid_period_number(self.period_number) {
            return Err(UsageValidationError::PeriodOutOfRange {
                period_number: self.period_number,
                period: self.period,
                count: self.period.period_count(),
            });
        }

        if let Some(value) = self.value_used {
            if !value.is_finite() || value < 0.0 || value > max {
                return Err(UsageValidationError::ValueOutOfRange { value, max });
            }
        }

        let (usage, value_used) = match (self.usage, self.value_used) {
            (Some(UsageState::Used), _) => (UsageState::Used, max),
            (Some(UsageState::NotUsed), _) => (UsageState::NotUsed, 0.0),
            (Some(UsageState::PartiallyUsed), Some(value)) if value > 0.0 && value < max => {
                (UsageState::PartiallyUsed, value)
            }
            (Some(UsageState::PartiallyUsed), value) => {
                return Err(UsageValidationError::InconsistentPartialUsage {
                    value: value.unwrap_or(0.0),
                    max,
                });
            }
            (Some(state @ (UsageState::Inactive | UsageState::Disabled)), value) => {
                (state, value.unwrap_or(0.0))
            }
            (None, Some(value)) => (UsageState::for_value(value, max), value),
            (None, None) => return Err(UsageValidationError::NothingToUpdate),
        };

        Ok(CreditHistoryUpdate {
            card_id: self.card_id.clone(),
            credit_id: self.credit_id.clone(),
            period_number: self.period_number,
            usage,
            value_used,
            year: self.year,
        })
    }
}

/// Request body of `PUT /users/cards/credits/history`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreditHistoryUpdate {
    pub card_id: String,
    pub credit_id: String,
    pub period_number: u32,
    pub usage: UsageState,
    pub value_used: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
}
