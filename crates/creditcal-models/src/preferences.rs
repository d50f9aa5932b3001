//! Per-credit tracking preferences.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Hide flag for one credit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreditTrackingPreference {
    pub credit_id: String,
    #[serde(default)]
    pub is_hidden: bool,
}

/// Preferences for every credit of one card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CardTrackingPreferences {
    pub card_id: String,
    #[serde(default)]
    pub credits: Vec<CreditTrackingPreference>,
}

/// Response of `GET /users/cards/credits/preferences`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserCreditsTrackingPreferences {
    #[serde(default)]
    pub card_preferences: Vec<CardTrackingPreferences>,
}

impl UserCreditsTrackingPreferences {
    /// Whether a credit is hidden. Unknown credits are visible.
    pub fn is_hidden(&self, card_id: &str, credit_id: &str) -> bool {
        self.card_preferences
            .iter()
            .filter(|card| card.card_id == card_id)
            .flat_map(|card| card.credits.iter())
            .any(|credit| credit.credit_id == credit_id && credit.is_hidden)
    }
}

/// Request body of `PUT /users/cards/credits/preferences`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreditHidePreferenceUpdate {
    pub card_id: String,
    pub credit_id: String,
    pub is_hidden: bool,
}
