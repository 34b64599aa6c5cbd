//! Seeded synthetic records for bootstrapping and tests
//!
//! Produces the same record shapes as the live export: `user_{i}` and
//! `item_{i}` identifiers, ten named Malaysian dishes ahead of randomly
//! composed items, and a fixed number of interactions per user.

use chrono::{Duration, Utc};
use makanmate_ai_core::{
    BehaviorPatterns, Cuisine, CulturalBackground, DietaryRestriction, InteractionKind,
    InteractionRecord, ItemRecord, UserRecord,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use crate::errors::Result;
use crate::source::{RawRecords, RecordSource, SkipCounts};

/// Synthetic data configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub num_users: usize,
    pub num_items: usize,
    pub interactions_per_user: usize,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            num_users: 1000,
            num_items: 500,
            interactions_per_user: 20,
            seed: 42,
        }
    }
}

struct Dish {
    name: &'static str,
    cuisine: Cuisine,
    categories: [&'static str; 2],
    spice: f32,
}

const NAMED_DISHES: [Dish; 10] = [
    Dish { name: "Nasi Lemak", cuisine: Cuisine::Malay, categories: ["rice", "breakfast"], spice: 0.6 },
    Dish { name: "Char Kway Teow", cuisine: Cuisine::Chinese, categories: ["noodles", "fried"], spice: 0.4 },
    Dish { name: "Laksa", cuisine: Cuisine::Chinese, categories: ["noodles", "soup"], spice: 0.8 },
    Dish { name: "Roti Canai", cuisine: Cuisine::Indian, categories: ["bread", "breakfast"], spice: 0.3 },
    Dish { name: "Satay", cuisine: Cuisine::Malay, categories: ["grilled", "meat"], spice: 0.5 },
    Dish { name: "Hainanese Chicken Rice", cuisine: Cuisine::Chinese, categories: ["rice", "chicken"], spice: 0.2 },
    Dish { name: "Nasi Goreng", cuisine: Cuisine::Malay, categories: ["rice", "fried"], spice: 0.7 },
    Dish { name: "Teh Tarik", cuisine: Cuisine::Malay, categories: ["beverage", "hot"], spice: 0.1 },
    Dish { name: "Cendol", cuisine: Cuisine::Malay, categories: ["dessert", "cold"], spice: 0.0 },
    Dish { name: "Wonton Noodles", cuisine: Cuisine::Chinese, categories: ["noodles", "soup"], spice: 0.3 },
];

const RANDOM_CATEGORIES: [&str; 7] = ["rice", "noodles", "soup", "grilled", "fried", "dessert", "beverage"];

const KINDS: [InteractionKind; 5] = [
    InteractionKind::View,
    InteractionKind::Like,
    InteractionKind::Order,
    InteractionKind::Rate,
    InteractionKind::Bookmark,
];

const EXPLICIT_RATING_SHARE: f32 = 0.3;
const HISTORY_DAYS: i64 = 90;

/// Generate a full record set from `config`. Same seed, same records
/// (interaction timestamps are relative to the current time).
pub fn generate(config: &SyntheticConfig) -> RawRecords {
    let mut rng = StdRng::seed_from_u64(config.seed);

    let users: Vec<UserRecord> = (0..config.num_users)
        .map(|i| synthetic_user(i, &mut rng))
        .collect();
    let items: Vec<ItemRecord> = (0..config.num_items)
        .map(|i| synthetic_item(i, &mut rng))
        .collect();

    let mut interactions = Vec::new();
    if !users.is_empty() && !items.is_empty() {
        let now = Utc::now();
        let total = config.num_users * config.interactions_per_user;
        interactions.reserve(total);
        for _ in 0..total {
            let user = &users[rng.gen_range(0..users.len())];
            let item = &items[rng.gen_range(0..items.len())];
            let kind = KINDS[rng.gen_range(0..KINDS.len())].clone();
            let rating = if rng.gen::<f32>() < EXPLICIT_RATING_SHARE {
                Some(rng.gen_range(1.0f32..5.0))
            } else {
                None
            };

            let mut record = InteractionRecord::new(user.id.clone(), item.id.clone(), kind, rating);
            record.timestamp = Some(now - Duration::days(rng.gen_range(0..HISTORY_DAYS)));
            interactions.push(record);
        }
    }

    info!(
        "Generated {} synthetic users, {} items, {} interactions (seed {})",
        users.len(),
        items.len(),
        interactions.len(),
        config.seed
    );

    RawRecords {
        users,
        items,
        interactions,
        skipped: SkipCounts::default(),
    }
}

fn synthetic_user(i: usize, rng: &mut StdRng) -> UserRecord {
    let cultural_background = CulturalBackground::ALL[rng.gen_range(0..CulturalBackground::ALL.len())];
    let spice_tolerance = rng.gen::<f32>();

    let draw = rng.gen::<f32>();
    let dietary_restrictions = if draw < 0.6 {
        vec![DietaryRestriction::Halal]
    } else if draw < 0.7 {
        vec![DietaryRestriction::Vegetarian]
    } else if draw < 0.75 {
        vec![DietaryRestriction::Halal, DietaryRestriction::Vegetarian]
    } else {
        Vec::new()
    };

    let cuisine_preferences: BTreeMap<Cuisine, f32> =
        Cuisine::ALL.iter().map(|&c| (c, rng.gen::<f32>())).collect();

    UserRecord {
        id: format!("user_{}", i),
        cuisine_preferences,
        dietary_restrictions,
        spice_tolerance,
        cultural_background,
        behavior_patterns: BehaviorPatterns {
            morning_activity: rng.gen(),
            afternoon_activity: rng.gen(),
            evening_activity: rng.gen(),
            weekend_activity: rng.gen(),
        },
    }
}

fn synthetic_item(i: usize, rng: &mut StdRng) -> ItemRecord {
    let (name, cuisine, categories, spice_level) = match NAMED_DISHES.get(i) {
        Some(dish) => (
            dish.name.to_string(),
            dish.cuisine,
            dish.categories.iter().map(|c| c.to_string()).collect(),
            dish.spice,
        ),
        None => {
            let cuisine = Cuisine::ALL[rng.gen_range(0..Cuisine::ALL.len())];
            let count = rng.gen_range(1..=3);
            let categories: Vec<String> = RANDOM_CATEGORIES
                .choose_multiple(rng, count)
                .map(|c| c.to_string())
                .collect();
            (format!("Food Item {}", i), cuisine, categories, rng.gen::<f32>())
        }
    };

    ItemRecord {
        id: format!("item_{}", i),
        name: Some(name),
        cuisine,
        categories,
        price: rng.gen_range(5.0..50.0),
        spice_level,
        is_halal: rng.gen_bool(0.7),
        is_vegetarian: rng.gen_bool(0.2),
        average_rating: rng.gen_range(3.0..5.0),
        total_orders: rng.gen_range(0..500) as f32,
    }
}

/// [`RecordSource`] backed by [`generate`]
pub struct SyntheticSource {
    config: SyntheticConfig,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self { config }
    }
}

impl RecordSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(&self) -> Result<RawRecords> {
        Ok(generate(&self.config))
    }
}
