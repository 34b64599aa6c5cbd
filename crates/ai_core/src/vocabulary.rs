//! Enumerations shared by feature extraction and serving-side feature builders.
//!
//! The `ALL` arrays fix the one-hot ordering of every categorical block in the
//! feature vectors. Reordering any of them changes the data contract and
//! requires bumping [`crate::features::FEATURE_LAYOUT_VERSION`].
//!
//! Every enum parses from free-form strings (case-insensitive) and never
//! fails: unrecognised values map to a neutral variant.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Cuisine families with a dedicated one-hot slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Cuisine {
    Malay,
    Chinese,
    Indian,
    Western,
    Thai,
    /// Anything else; contributes no one-hot bit
    Other,
}

impl Cuisine {
    pub const ALL: [Cuisine; 5] = [
        Cuisine::Malay,
        Cuisine::Chinese,
        Cuisine::Indian,
        Cuisine::Western,
        Cuisine::Thai,
    ];

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "malay" => Cuisine::Malay,
            "chinese" => Cuisine::Chinese,
            "indian" => Cuisine::Indian,
            "western" => Cuisine::Western,
            "thai" => Cuisine::Thai,
            _ => Cuisine::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Cuisine::Malay => "malay",
            Cuisine::Chinese => "chinese",
            Cuisine::Indian => "indian",
            Cuisine::Western => "western",
            Cuisine::Thai => "thai",
            Cuisine::Other => "other",
        }
    }

    /// Position inside the cuisine one-hot block.
    pub fn slot(&self) -> Option<usize> {
        Self::ALL.iter().position(|c| c == self)
    }
}

impl Default for Cuisine {
    fn default() -> Self {
        Cuisine::Western
    }
}

/// Cultural background of a user. Unknown values fall back to `Mixed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CulturalBackground {
    Malay,
    Chinese,
    Indian,
    Mixed,
}

impl CulturalBackground {
    pub const ALL: [CulturalBackground; 4] = [
        CulturalBackground::Malay,
        CulturalBackground::Chinese,
        CulturalBackground::Indian,
        CulturalBackground::Mixed,
    ];

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "malay" => CulturalBackground::Malay,
            "chinese" => CulturalBackground::Chinese,
            "indian" => CulturalBackground::Indian,
            _ => CulturalBackground::Mixed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CulturalBackground::Malay => "malay",
            CulturalBackground::Chinese => "chinese",
            CulturalBackground::Indian => "indian",
            CulturalBackground::Mixed => "mixed",
        }
    }

    pub fn slot(&self) -> usize {
        match self {
            CulturalBackground::Malay => 0,
            CulturalBackground::Chinese => 1,
            CulturalBackground::Indian => 2,
            CulturalBackground::Mixed => 3,
        }
    }
}

impl Default for CulturalBackground {
    fn default() -> Self {
        CulturalBackground::Mixed
    }
}

/// Dietary restriction declared by a user.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DietaryRestriction {
    Halal,
    Vegetarian,
    Vegan,
    Other(String),
}

impl DietaryRestriction {
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "halal" => DietaryRestriction::Halal,
            "vegetarian" => DietaryRestriction::Vegetarian,
            "vegan" => DietaryRestriction::Vegan,
            _ => DietaryRestriction::Other(normalized),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            DietaryRestriction::Halal => "halal",
            DietaryRestriction::Vegetarian => "vegetarian",
            DietaryRestriction::Vegan => "vegan",
            DietaryRestriction::Other(raw) => raw,
        }
    }
}

/// Common food categories detected in item tags.
///
/// A category is present when any tag contains its keyword as a substring,
/// so `"fried rice"` lights up both `Fried` and `Rice`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FoodCategory {
    Rice,
    Noodles,
    Soup,
    Dessert,
    Fried,
    Grilled,
    Beverage,
    Bread,
    Breakfast,
}

impl FoodCategory {
    pub const ALL: [FoodCategory; 9] = [
        FoodCategory::Rice,
        FoodCategory::Noodles,
        FoodCategory::Soup,
        FoodCategory::Dessert,
        FoodCategory::Fried,
        FoodCategory::Grilled,
        FoodCategory::Beverage,
        FoodCategory::Bread,
        FoodCategory::Breakfast,
    ];

    pub fn keyword(&self) -> &'static str {
        match self {
            FoodCategory::Rice => "rice",
            FoodCategory::Noodles => "noodles",
            FoodCategory::Soup => "soup",
            FoodCategory::Dessert => "dessert",
            FoodCategory::Fried => "fried",
            FoodCategory::Grilled => "grilled",
            FoodCategory::Beverage => "beverage",
            FoodCategory::Bread => "bread",
            FoodCategory::Breakfast => "breakfast",
        }
    }

    pub fn matches_any<S: AsRef<str>>(&self, tags: &[S]) -> bool {
        let keyword = self.keyword();
        tags.iter()
            .any(|tag| tag.as_ref().to_ascii_lowercase().contains(keyword))
    }
}

macro_rules! string_conversions {
    ($($ty:ty),*) => {
        $(
            impl From<String> for $ty {
                fn from(raw: String) -> Self {
                    Self::parse(&raw)
                }
            }

            impl From<&str> for $ty {
                fn from(raw: &str) -> Self {
                    Self::parse(raw)
                }
            }

            impl From<$ty> for String {
                fn from(value: $ty) -> String {
                    value.as_str().to_string()
                }
            }

            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.as_str())
                }
            }
        )*
    };
}

string_conversions!(Cuisine, CulturalBackground, DietaryRestriction);
