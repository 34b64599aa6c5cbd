//! Typed user, item and interaction records
//!
//! Field names follow the document-store layout (camelCase). Missing fields
//! take explicit neutral defaults; `sanitized()` clamps numeric fields into
//! their documented ranges so downstream feature extraction sees clean data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::vocabulary::{Cuisine, CulturalBackground, DietaryRestriction};

/// Neutral value for unknown spice tolerance / spice level
pub const NEUTRAL_SPICE: f32 = 0.5;
/// Lowest explicit rating accepted
pub const MIN_RATING: f32 = 1.0;
/// Highest explicit rating accepted
pub const MAX_RATING: f32 = 5.0;

fn neutral_spice() -> f32 {
    NEUTRAL_SPICE
}

/// Clamp into [0, 1], replacing non-finite values with `fallback`.
pub fn unit_interval(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        fallback
    }
}

/// Time-of-week activity scores of a user, each in [0, 1]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorPatterns {
    pub morning_activity: f32,
    pub afternoon_activity: f32,
    pub evening_activity: f32,
    pub weekend_activity: f32,
}

/// A user profile as stored in the `users` collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    #[serde(default)]
    pub cuisine_preferences: BTreeMap<Cuisine, f32>,
    #[serde(default)]
    pub dietary_restrictions: Vec<DietaryRestriction>,
    #[serde(default = "neutral_spice")]
    pub spice_tolerance: f32,
    #[serde(default)]
    pub cultural_background: CulturalBackground,
    #[serde(default)]
    pub behavior_patterns: BehaviorPatterns,
}

impl UserRecord {
    /// A user with no stated preferences.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            cuisine_preferences: BTreeMap::new(),
            dietary_restrictions: Vec::new(),
            spice_tolerance: NEUTRAL_SPICE,
            cultural_background: CulturalBackground::Mixed,
            behavior_patterns: BehaviorPatterns::default(),
        }
    }

    pub fn has_restriction(&self, restriction: &DietaryRestriction) -> bool {
        self.dietary_restrictions.contains(restriction)
    }

    /// Clamp numeric fields into [0, 1] and drop non-finite preference weights.
    pub fn sanitized(mut self) -> Self {
        self.spice_tolerance = unit_interval(self.spice_tolerance, NEUTRAL_SPICE);
        self.cuisine_preferences = self
            .cuisine_preferences
            .into_iter()
            .filter(|(cuisine, weight)| *cuisine != Cuisine::Other && weight.is_finite())
            .map(|(cuisine, weight)| (cuisine, weight.clamp(0.0, 1.0)))
            .collect();

        let patterns = &mut self.behavior_patterns;
        patterns.morning_activity = unit_interval(patterns.morning_activity, 0.0);
        patterns.afternoon_activity = unit_interval(patterns.afternoon_activity, 0.0);
        patterns.evening_activity = unit_interval(patterns.evening_activity, 0.0);
        patterns.weekend_activity = unit_interval(patterns.weekend_activity, 0.0);
        self
    }
}

/// A dish as stored in the `food_items` collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRecord {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "cuisineType")]
    pub cuisine: Cuisine,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub price: f32,
    #[serde(default = "neutral_spice")]
    pub spice_level: f32,
    #[serde(default)]
    pub is_halal: bool,
    #[serde(default)]
    pub is_vegetarian: bool,
    #[serde(default)]
    pub average_rating: f32,
    /// Exports may write counts as doubles; `sanitized()` floors and clamps
    #[serde(default)]
    pub total_orders: f32,
}

impl ItemRecord {
    pub fn new(id: impl Into<String>, cuisine: Cuisine) -> Self {
        Self {
            id: id.into(),
            name: None,
            cuisine,
            categories: Vec::new(),
            price: 0.0,
            spice_level: NEUTRAL_SPICE,
            is_halal: false,
            is_vegetarian: false,
            average_rating: 0.0,
            total_orders: 0.0,
        }
    }

    /// Clamp price to >= 0, spice to [0, 1], rating to [0, 5] and floor
    /// the order count to a whole number >= 0.
    pub fn sanitized(mut self) -> Self {
        self.price = if self.price.is_finite() {
            self.price.max(0.0)
        } else {
            0.0
        };
        self.spice_level = unit_interval(self.spice_level, NEUTRAL_SPICE);
        self.average_rating = if self.average_rating.is_finite() {
            self.average_rating.clamp(0.0, MAX_RATING)
        } else {
            0.0
        };
        self.total_orders = if self.total_orders.is_finite() {
            self.total_orders.floor().max(0.0)
        } else {
            0.0
        };
        self
    }
}

/// Kind of user/item interaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InteractionKind {
    View,
    Like,
    Order,
    Rate,
    Bookmark,
    Other(String),
}

impl InteractionKind {
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "view" => InteractionKind::View,
            "like" => InteractionKind::Like,
            "order" => InteractionKind::Order,
            "rate" => InteractionKind::Rate,
            "bookmark" => InteractionKind::Bookmark,
            _ => InteractionKind::Other(normalized),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            InteractionKind::View => "view",
            InteractionKind::Like => "like",
            InteractionKind::Order => "order",
            InteractionKind::Rate => "rate",
            InteractionKind::Bookmark => "bookmark",
            InteractionKind::Other(raw) => raw,
        }
    }
}

impl Default for InteractionKind {
    fn default() -> Self {
        InteractionKind::Other(String::new())
    }
}

impl From<String> for InteractionKind {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<&str> for InteractionKind {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl From<InteractionKind> for String {
    fn from(kind: InteractionKind) -> String {
        kind.as_str().to_string()
    }
}

impl fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One user/item event from the `user_interactions` collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionRecord {
    pub user_id: String,
    pub item_id: String,
    #[serde(default, rename = "interactionType")]
    pub kind: InteractionKind,
    #[serde(default)]
    pub rating: Option<f32>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl InteractionRecord {
    pub fn new(
        user_id: impl Into<String>,
        item_id: impl Into<String>,
        kind: InteractionKind,
        rating: Option<f32>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            item_id: item_id.into(),
            kind,
            rating,
            timestamp: None,
        }
    }

    /// Zero or non-finite ratings become absent; others are clamped to [1, 5].
    pub fn sanitized(mut self) -> Self {
        self.rating = self
            .rating
            .filter(|r| r.is_finite() && *r > 0.0)
            .map(|r| r.clamp(MIN_RATING, MAX_RATING));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_defaults_from_sparse_document() {
        let user: UserRecord = serde_json::from_str(r#"{"id":"u1"}"#).unwrap();
        assert_eq!(user.spice_tolerance, NEUTRAL_SPICE);
        assert_eq!(user.cultural_background, CulturalBackground::Mixed);
        assert!(user.cuisine_preferences.is_empty());
    }

    #[test]
    fn test_user_document_layout() {
        let json = r#"{
            "id": "user_7",
            "culturalBackground": "Chinese",
            "spiceTolerance": 1.7,
            "dietaryRestrictions": ["halal"],
            "cuisinePreferences": {"malay": 0.9, "thai": -2.0, "fusion": 0.4},
            "behaviorPatterns": {"morning_activity": 0.3, "evening_activity": 0.8}
        }"#;
        let user: UserRecord = serde_json::from_str(json).unwrap();
        let user = user.sanitized();

        assert_eq!(user.cultural_background, CulturalBackground::Chinese);
        assert_eq!(user.spice_tolerance, 1.0);
        assert!(user.has_restriction(&DietaryRestriction::Halal));
        assert_eq!(user.cuisine_preferences.get(&Cuisine::Malay), Some(&0.9));
        assert_eq!(user.cuisine_preferences.get(&Cuisine::Thai), Some(&0.0));
        assert!(!user.cuisine_preferences.contains_key(&Cuisine::Other));
        assert_eq!(user.behavior_patterns.evening_activity, 0.8);
    }

    #[test]
    fn test_item_defaults_to_western() {
        let item: ItemRecord = serde_json::from_str(r#"{"id":"i1","price":-3.0}"#).unwrap();
        let item = item.sanitized();
        assert_eq!(item.cuisine, Cuisine::Western);
        assert_eq!(item.price, 0.0);
        assert_eq!(item.spice_level, NEUTRAL_SPICE);
    }

    #[test]
    fn test_item_order_count_accepts_doubles() {
        let item: ItemRecord =
            serde_json::from_str(r#"{"id":"i1","totalOrders":12.7}"#).unwrap();
        assert_eq!(item.sanitized().total_orders, 12.0);

        let item: ItemRecord = serde_json::from_str(r#"{"id":"i2","totalOrders":-1}"#).unwrap();
        assert_eq!(item.sanitized().total_orders, 0.0);
    }

    #[test]
    fn test_interaction_rating_sanitation() {
        let zero = InteractionRecord::new("u", "i", InteractionKind::View, Some(0.0)).sanitized();
        assert_eq!(zero.rating, None);

        let high = InteractionRecord::new("u", "i", InteractionKind::Rate, Some(9.0)).sanitized();
        assert_eq!(high.rating, Some(MAX_RATING));

        let kept = InteractionRecord::new("u", "i", InteractionKind::Rate, Some(4.2)).sanitized();
        assert_eq!(kept.rating, Some(4.2));
    }

    #[test]
    fn test_interaction_kind_is_total() {
        let record: InteractionRecord = serde_json::from_str(
            r#"{"userId":"u","itemId":"i","interactionType":"Share","timestamp":"2024-05-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(record.kind, InteractionKind::Other("share".to_string()));
        assert!(record.timestamp.is_some());
    }
}
