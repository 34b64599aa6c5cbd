//! Training sample assembly
//!
//! Joins each interaction with the scaled features and embedding rows of its
//! user and item. Interactions naming an identity the encoders were not
//! fitted on are dropped one by one and counted.

use makanmate_ai_core::{
    CoreError, FittedPreprocessing, InteractionRecord, ItemRecord, UserRecord, ITEM_FEATURE_DIM,
    USER_FEATURE_DIM,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::errors::Result;
use crate::rating::resolve_rating;

/// One supervised example
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSample {
    pub user_index: usize,
    pub item_index: usize,
    pub user_features: Vec<f32>,
    pub item_features: Vec<f32>,
    pub rating: f32,
}

/// Counts from one sample-building pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleReport {
    pub interactions: usize,
    pub samples: usize,
    pub dropped_unknown_user: usize,
    pub dropped_unknown_item: usize,
}

impl SampleReport {
    pub fn dropped(&self) -> usize {
        self.dropped_unknown_user + self.dropped_unknown_item
    }
}

/// Precomputed per-identity features, keyed by identifier
pub struct SampleBuilder<'a> {
    preprocessing: &'a FittedPreprocessing,
    users: HashMap<&'a str, Vec<f32>>,
    items: HashMap<&'a str, Vec<f32>>,
}

impl<'a> SampleBuilder<'a> {
    /// Scale every known user and item once up front.
    pub fn new(
        preprocessing: &'a FittedPreprocessing,
        users: &'a [UserRecord],
        items: &'a [ItemRecord],
    ) -> Result<Self> {
        let mut user_features = HashMap::with_capacity(users.len());
        for user in users {
            user_features.insert(user.id.as_str(), preprocessing.scale_user(user)?);
        }
        let mut item_features = HashMap::with_capacity(items.len());
        for item in items {
            item_features.insert(item.id.as_str(), preprocessing.scale_item(item)?);
        }

        Ok(Self {
            preprocessing,
            users: user_features,
            items: item_features,
        })
    }

    /// Build one sample, or `UnknownIdentifier` for the first unknown side.
    pub fn sample(&self, interaction: &InteractionRecord) -> std::result::Result<TrainingSample, CoreError> {
        let user_index = self.preprocessing.user_encoder.transform(&interaction.user_id)?;
        let item_index = self.preprocessing.item_encoder.transform(&interaction.item_id)?;

        let user_features = self
            .users
            .get(interaction.user_id.as_str())
            .ok_or_else(|| CoreError::UnknownIdentifier(interaction.user_id.clone()))?;
        let item_features = self
            .items
            .get(interaction.item_id.as_str())
            .ok_or_else(|| CoreError::UnknownIdentifier(interaction.item_id.clone()))?;

        Ok(TrainingSample {
            user_index,
            item_index,
            user_features: user_features.clone(),
            item_features: item_features.clone(),
            rating: resolve_rating(interaction),
        })
    }

    /// Build samples for every interaction whose identities are known.
    pub fn build(&self, interactions: &[InteractionRecord]) -> (Vec<TrainingSample>, SampleReport) {
        let mut samples = Vec::with_capacity(interactions.len());
        let mut report = SampleReport {
            interactions: interactions.len(),
            ..SampleReport::default()
        };

        for interaction in interactions {
            match self.sample(interaction) {
                Ok(sample) => samples.push(sample),
                Err(err) => {
                    if !self.preprocessing.user_encoder.contains(&interaction.user_id) {
                        report.dropped_unknown_user += 1;
                    } else {
                        report.dropped_unknown_item += 1;
                    }
                    debug!("Dropping interaction: {}", err);
                }
            }
        }

        report.samples = samples.len();
        info!(
            "Built {} training samples from {} interactions ({} dropped: {} unknown users, {} unknown items)",
            report.samples,
            report.interactions,
            report.dropped(),
            report.dropped_unknown_user,
            report.dropped_unknown_item
        );
        debug_assert!(samples
            .iter()
            .all(|s| s.user_features.len() == USER_FEATURE_DIM
                && s.item_features.len() == ITEM_FEATURE_DIM));
        (samples, report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use makanmate_ai_core::{Cuisine, InteractionKind};

    fn fixture() -> (Vec<UserRecord>, Vec<ItemRecord>) {
        let users = vec![UserRecord::new("user_0"), UserRecord::new("user_1")];
        let mut spicy = ItemRecord::new("item_0", Cuisine::Indian);
        spicy.spice_level = 0.9;
        let items = vec![spicy, ItemRecord::new("item_1", Cuisine::Malay)];
        (users, items)
    }

    #[test]
    fn test_unknown_identities_are_dropped_and_counted() {
        let (users, items) = fixture();
        let prep = FittedPreprocessing::fit(&users, &items).unwrap();
        let builder = SampleBuilder::new(&prep, &users, &items).unwrap();

        let interactions = vec![
            InteractionRecord::new("user_0", "item_1", InteractionKind::Order, None),
            InteractionRecord::new("ghost", "item_1", InteractionKind::Like, None),
            InteractionRecord::new("user_1", "missing", InteractionKind::View, None),
            InteractionRecord::new("ghost", "missing", InteractionKind::View, None),
            InteractionRecord::new("user_1", "item_0", InteractionKind::Rate, Some(4.5)),
        ];
        let (samples, report) = builder.build(&interactions);

        assert_eq!(samples.len(), 2);
        assert_eq!(report.dropped(), 3);
        assert_eq!(report.dropped_unknown_user, 2);
        assert_eq!(report.dropped_unknown_item, 1);
        assert_eq!(report.samples + report.dropped(), report.interactions);

        assert_eq!(samples[0].user_index, 0);
        assert_eq!(samples[0].item_index, 1);
        assert_eq!(samples[0].rating, 5.0);
        assert_eq!(samples[1].rating, 4.5);
    }

    #[test]
    fn test_sample_features_match_preprocessing() {
        let (users, items) = fixture();
        let prep = FittedPreprocessing::fit(&users, &items).unwrap();
        let builder = SampleBuilder::new(&prep, &users, &items).unwrap();

        let sample = builder
            .sample(&InteractionRecord::new("user_1", "item_0", InteractionKind::View, None))
            .unwrap();
        assert_eq!(sample.user_features, prep.scale_user(&users[1]).unwrap());
        assert_eq!(sample.item_features, prep.scale_item(&items[0]).unwrap());
        assert_eq!(sample.item_features.len(), ITEM_FEATURE_DIM);
    }
}
