use makanmate_ai_core::{
    extract_item_features, extract_user_features, BehaviorPatterns, Cuisine, CulturalBackground,
    DietaryRestriction, FeatureScaler, IdentityEncoder, ItemRecord, UserRecord, ITEM_FEATURE_DIM,
    USER_FEATURE_DIM,
};
use proptest::prelude::*;
use std::collections::BTreeMap;

// Property tests for the feature layout shared by training and serving.

fn any_cuisine() -> impl Strategy<Value = Cuisine> {
    prop_oneof![
        Just(Cuisine::Malay),
        Just(Cuisine::Chinese),
        Just(Cuisine::Indian),
        Just(Cuisine::Western),
        Just(Cuisine::Thai),
        Just(Cuisine::Other),
    ]
}

fn any_culture() -> impl Strategy<Value = CulturalBackground> {
    prop_oneof![
        Just(CulturalBackground::Malay),
        Just(CulturalBackground::Chinese),
        Just(CulturalBackground::Indian),
        Just(CulturalBackground::Mixed),
    ]
}

fn any_restriction() -> impl Strategy<Value = DietaryRestriction> {
    prop_oneof![
        Just(DietaryRestriction::Halal),
        Just(DietaryRestriction::Vegetarian),
        Just(DietaryRestriction::Vegan),
        "[a-z]{1,8}".prop_map(DietaryRestriction::from),
    ]
}

// Unsanitized floats on purpose: extraction must be total.
fn any_user() -> impl Strategy<Value = UserRecord> {
    (
        "user_[0-9]{1,4}",
        prop::collection::btree_map(any_cuisine(), any::<f32>(), 0..6),
        prop::collection::vec(any_restriction(), 0..4),
        any::<f32>(),
        any_culture(),
        prop::array::uniform4(any::<f32>()),
    )
        .prop_map(|(id, prefs, restrictions, spice, culture, activity)| {
            let mut user = UserRecord::new(id);
            user.cuisine_preferences = prefs.into_iter().collect::<BTreeMap<_, _>>();
            user.dietary_restrictions = restrictions;
            user.spice_tolerance = spice;
            user.cultural_background = culture;
            user.behavior_patterns = BehaviorPatterns {
                morning_activity: activity[0],
                afternoon_activity: activity[1],
                evening_activity: activity[2],
                weekend_activity: activity[3],
            };
            user
        })
}

fn any_item() -> impl Strategy<Value = ItemRecord> {
    (
        "item_[0-9]{1,4}",
        any_cuisine(),
        prop::collection::vec("[a-zA-Z ]{0,16}", 0..5),
        any::<f32>(),
        any::<f32>(),
        any::<bool>(),
        any::<bool>(),
        any::<f32>(),
        any::<f32>(),
    )
        .prop_map(
            |(id, cuisine, categories, price, spice, halal, vegetarian, rating, orders)| {
                let mut item = ItemRecord::new(id, cuisine);
                item.categories = categories;
                item.price = price;
                item.spice_level = spice;
                item.is_halal = halal;
                item.is_vegetarian = vegetarian;
                item.average_rating = rating;
                item.total_orders = orders;
                item
            },
        )
}

fn is_flag(v: f32) -> bool {
    v == 0.0 || v == 1.0
}

proptest! {
    #[test]
    fn user_features_are_bounded(user in any_user()) {
        let features = extract_user_features(&user);
        prop_assert_eq!(features.len(), USER_FEATURE_DIM);
        prop_assert!(features.iter().all(|v| v.is_finite()));
        prop_assert!(features.iter().all(|v| (0.0..=1.0).contains(v)));
        prop_assert!(features[5..8].iter().all(|&v| is_flag(v)));

        let culture: f32 = features[9..13].iter().sum();
        prop_assert_eq!(culture, 1.0);
    }

    #[test]
    fn item_features_are_finite(item in any_item()) {
        let features = extract_item_features(&item);
        prop_assert_eq!(features.len(), ITEM_FEATURE_DIM);
        prop_assert!(features.iter().all(|v| v.is_finite()));
        prop_assert!(features[1..6].iter().all(|v| (0.0..=1.0).contains(v)));
        prop_assert!(features[6..].iter().all(|&v| is_flag(v)));

        let cuisine: f32 = features[6..11].iter().sum();
        prop_assert!(cuisine <= 1.0);
    }

    #[test]
    fn extraction_is_deterministic(user in any_user(), item in any_item()) {
        prop_assert_eq!(
            extract_user_features(&user).map(f32::to_bits),
            extract_user_features(&user).map(f32::to_bits)
        );
        prop_assert_eq!(
            extract_item_features(&item).map(f32::to_bits),
            extract_item_features(&item).map(f32::to_bits)
        );
    }

    #[test]
    fn encoder_indices_are_stable_and_bounded(
        ids in prop::collection::btree_set("[a-z0-9_]{1,10}", 1..40),
    ) {
        let encoder = IdentityEncoder::fit(ids.iter());
        let refit = IdentityEncoder::fit(ids.iter().rev());
        prop_assert_eq!(encoder.len(), ids.len());

        for id in &ids {
            let index = encoder.transform(id).unwrap();
            prop_assert!(index < encoder.len());
            prop_assert_eq!(index, encoder.transform(id).unwrap());
            prop_assert_eq!(index, refit.transform(id).unwrap());
            prop_assert_eq!(encoder.inverse_transform(index), Some(id.as_str()));
        }
    }

    #[test]
    fn scaling_the_fitted_mean_yields_zero(
        grid in prop::collection::vec(prop::array::uniform8(-1000i32..1000), 1..30),
    ) {
        let rows: Vec<Vec<f32>> = grid
            .iter()
            .map(|row| row.iter().map(|&v| v as f32).collect())
            .collect();
        let scaler = FeatureScaler::fit(&rows).unwrap();
        let mean: Vec<f32> = scaler.mean.iter().map(|&m| m as f32).collect();
        let scaled = scaler.transform(&mean).unwrap();
        prop_assert!(scaled.iter().all(|v| v.abs() < 1e-3), "scaled mean = {:?}", scaled);
    }
}

#[test]
fn sparse_user_gets_neutral_defaults() {
    let user: UserRecord = serde_json::from_str(r#"{"id":"u_new"}"#).unwrap();
    let features = extract_user_features(&user);

    assert!(features[..8].iter().all(|&v| v == 0.0));
    assert_eq!(features[8], 0.5);
    // "mixed" is the last culture slot
    assert_eq!(&features[9..13], &[0.0, 0.0, 0.0, 1.0]);
}
