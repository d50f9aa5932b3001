//! Calendar query options and their canonical cache-key form.

use std::collections::BTreeSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Filters applied to month and year calendar fetches.
///
/// `cache_fragment` is the only place these options are turned into a key,
/// so month keys, year keys and per-option invalidation cannot drift apart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CalendarQuery {
    /// Restrict to these cards. `None` means all of the user's cards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_ids: Option<BTreeSet<String>>,
    /// Drop credits the user has hidden.
    #[serde(default)]
    pub exclude_hidden: bool,
    /// Include credits of cards that are about to expire (year fetches only).
    #[serde(default)]
    pub include_expiring: bool,
}

impl CalendarQuery {
    /// Query over all cards with default flags.
    pub fn all_cards() -> Self {
        Self::default()
    }

    /// Restrict to the given cards.
    pub fn with_cards<I, S>(mut self, card_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.card_ids = Some(card_ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn excluding_hidden(mut self, exclude_hidden: bool) -> Self {
        self.exclude_hidden = exclude_hidden;
        self
    }

    pub fn including_expiring(mut self, include_expiring: bool) -> Self {
        self.include_expiring = include_expiring;
        self
    }

    /// Card ids in sorted order (empty when unrestricted).
    pub fn sorted_card_ids(&self) -> Vec<&str> {
        self.card_ids
            .iter()
            .flat_map(|ids| ids.iter().map(String::as_str))
            .collect()
    }

    /// Canonical `{sorted,card,ids}-{excludeHidden}` key fragment.
    ///
    /// Commas and backslashes inside an id are backslash-escaped, so
    /// `["a,b"]` and `["a", "b"]` never share a fragment.
    pub fn cache_fragment(&self) -> String {
        let ids: Vec<String> = self
            .sorted_card_ids()
            .into_iter()
            .map(escape_card_id)
            .collect();
        format!("{}-{}", ids.join(","), self.exclude_hidden)
    }

    /// Cache key of a month slice (1-based month).
    pub fn month_key(&self, year: i32, month: u32) -> String {
        format!("{}-{}-{}", year, month, self.cache_fragment())
    }

    /// Cache key of a full year. Year fetches honor `include_expiring`, so
    /// it is part of the key.
    pub fn year_key(&self, year: i32) -> String {
        format!(
            "year:{}-{}-{}",
            year,
            self.cache_fragment(),
            self.include_expiring
        )
    }
}

fn escape_card_id(id: &str) -> String {
    id.replace('\\', "\\\\").replace(',', "\\,")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_month_key() {
        assert_eq!(CalendarQuery::default().month_key(2024, 3), "2024-3--false");
    }

    #[test]
    fn test_card_order_does_not_change_key() {
        let a = CalendarQuery::default().with_cards(["gold", "plat"]).excluding_hidden(true);
        let b = CalendarQuery::default().with_cards(["plat", "gold"]).excluding_hidden(true);
        assert_eq!(a.cache_fragment(), "gold,plat-true");
        assert_eq!(a.month_key(2024, 11), b.month_key(2024, 11));
        assert_eq!(a.year_key(2024), "year:2024-gold,plat-true-false");
    }

    #[test]
    fn test_include_expiring_only_changes_year_key() {
        let plain = CalendarQuery::default();
        let expiring = CalendarQuery::default().including_expiring(true);
        assert_eq!(plain.month_key(2024, 3), expiring.month_key(2024, 3));
        assert_eq!(plain.year_key(2024), "year:2024--false-false");
        assert_eq!(expiring.year_key(2024), "year:2024--false-true");
    }

    #[test]
    fn test_commas_in_card_ids_do_not_collide() {
        let joined = CalendarQuery::default().with_cards(["a,b"]);
        let split = CalendarQuery::default().with_cards(["a", "b"]);
        assert_ne!(joined.cache_fragment(), split.cache_fragment());
        assert_eq!(joined.cache_fragment(), r"a\,b-false");
        assert_eq!(split.cache_fragment(), "a,b-false");

        let slash = CalendarQuery::default().with_cards([r"a\", "b"]);
        assert_eq!(slash.cache_fragment(), r"a\\,b-false");
        assert_ne!(slash.cache_fragment(), joined.cache_fragment());
    }
}
