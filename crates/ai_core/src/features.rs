//! Feature extraction for users and food items
//!
//! Both extractors are total: any record produces a fixed-length vector of
//! finite values. Layouts (index order):
//!
//! ```text
//! User (15):
//! 0-4.   Cuisine preference weights (`Cuisine::ALL` order), default 0
//! 5-7.   Dietary flags: halal, vegetarian, vegan
//! 8.     Spice tolerance, default 0.5
//! 9-12.  Cultural background one-hot (`CulturalBackground::ALL` order)
//! 13-14. Morning and evening activity
//!
//! Item (20):
//! 0.     Price / 100
//! 1.     Spice level
//! 2-3.   Halal and vegetarian flags
//! 4.     Average rating / 5
//! 5.     min(total orders / 100, 1)
//! 6-10.  Cuisine one-hot (`Cuisine::ALL` order)
//! 11-19. Category presence (`FoodCategory::ALL` order)
//! ```

use crate::records::{unit_interval, ItemRecord, UserRecord, MAX_RATING, NEUTRAL_SPICE};
use crate::vocabulary::{Cuisine, CulturalBackground, DietaryRestriction, FoodCategory};

/// Length of the user feature vector
pub const USER_FEATURE_DIM: usize = 15;
/// Length of the item feature vector
pub const ITEM_FEATURE_DIM: usize = 20;
/// Bumped whenever either layout changes
pub const FEATURE_LAYOUT_VERSION: u32 = 1;

/// Divisor applied to raw item price
pub const PRICE_DIVISOR: f32 = 100.0;
/// Order count at which the popularity feature saturates
pub const ORDER_COUNT_CAP: f32 = 100.0;

const ITEM_BASIC_FEATURES: usize = 6;

/// Fixed-length user feature vector
pub type UserFeatures = [f32; USER_FEATURE_DIM];
/// Fixed-length item feature vector
pub type ItemFeatures = [f32; ITEM_FEATURE_DIM];

fn flag(value: bool) -> f32 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// Extract the 15-dimensional user feature vector.
pub fn extract_user_features(user: &UserRecord) -> UserFeatures {
    let mut features = [0.0f32; USER_FEATURE_DIM];

    for (slot, cuisine) in Cuisine::ALL.iter().enumerate() {
        let weight = user.cuisine_preferences.get(cuisine).copied().unwrap_or(0.0);
        features[slot] = unit_interval(weight, 0.0);
    }

    features[5] = flag(user.has_restriction(&DietaryRestriction::Halal));
    features[6] = flag(user.has_restriction(&DietaryRestriction::Vegetarian));
    features[7] = flag(user.has_restriction(&DietaryRestriction::Vegan));

    features[8] = unit_interval(user.spice_tolerance, NEUTRAL_SPICE);

    features[9 + user.cultural_background.slot()] = 1.0;

    features[13] = unit_interval(user.behavior_patterns.morning_activity, 0.0);
    features[14] = unit_interval(user.behavior_patterns.evening_activity, 0.0);

    features
}

/// Extract the 20-dimensional item feature vector.
pub fn extract_item_features(item: &ItemRecord) -> ItemFeatures {
    let mut features = [0.0f32; ITEM_FEATURE_DIM];

    let price = if item.price.is_finite() { item.price.max(0.0) } else { 0.0 };
    features[0] = price / PRICE_DIVISOR;
    features[1] = unit_interval(item.spice_level, NEUTRAL_SPICE);
    features[2] = flag(item.is_halal);
    features[3] = flag(item.is_vegetarian);
    features[4] = unit_interval(item.average_rating / MAX_RATING, 0.0);
    features[5] = unit_interval(item.total_orders / ORDER_COUNT_CAP, 0.0);

    if let Some(slot) = item.cuisine.slot() {
        features[ITEM_BASIC_FEATURES + slot] = 1.0;
    }

    let category_offset = ITEM_BASIC_FEATURES + Cuisine::ALL.len();
    for (slot, category) in FoodCategory::ALL.iter().enumerate() {
        features[category_offset + slot] = flag(category.matches_any(&item.categories));
    }

    features
}

/// Human-readable names for each user feature position.
pub fn user_feature_names() -> Vec<String> {
    let mut names = Vec::with_capacity(USER_FEATURE_DIM);
    names.extend(Cuisine::ALL.iter().map(|c| format!("pref_{}", c)));
    names.extend(["halal", "vegetarian", "vegan"].iter().map(|d| format!("diet_{}", d)));
    names.push("spice_tolerance".to_string());
    names.extend(CulturalBackground::ALL.iter().map(|c| format!("culture_{}", c)));
    names.push("morning_activity".to_string());
    names.push("evening_activity".to_string());
    names
}

/// Human-readable names for each item feature position.
pub fn item_feature_names() -> Vec<String> {
    let mut names: Vec<String> = [
        "price",
        "spice_level",
        "is_halal",
        "is_vegetarian",
        "rating",
        "popularity",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    names.extend(Cuisine::ALL.iter().map(|c| format!("cuisine_{}", c)));
    names.extend(FoodCategory::ALL.iter().map(|c| format!("category_{}", c.keyword())));
    names
}
