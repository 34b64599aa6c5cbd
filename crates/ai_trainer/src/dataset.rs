//! Column-oriented training data
//!
//! Holds samples as dense `ndarray` matrices and provides seeded
//! shuffling, train/validation splitting and mini-batch selection.

use makanmate_ai_core::{CoreError, ITEM_FEATURE_DIM, USER_FEATURE_DIM};
use ndarray::{concatenate, Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::errors::{Result, TrainerError};
use crate::samples::TrainingSample;

/// Training samples laid out as columns
#[derive(Clone, Debug)]
pub struct Dataset {
    pub user_ids: Vec<usize>,
    pub item_ids: Vec<usize>,
    pub user_features: Array2<f32>,
    pub item_features: Array2<f32>,
    pub ratings: Array1<f32>,
}

impl Dataset {
    /// Stack samples into matrices. Rejects empty input and wrong widths.
    pub fn from_samples(samples: &[TrainingSample]) -> Result<Self> {
        if samples.is_empty() {
            return Err(TrainerError::EmptyDataset("no training samples".into()));
        }

        let n = samples.len();
        let mut user_features = Array2::zeros((n, USER_FEATURE_DIM));
        let mut item_features = Array2::zeros((n, ITEM_FEATURE_DIM));

        for (i, sample) in samples.iter().enumerate() {
            if sample.user_features.len() != USER_FEATURE_DIM
                || sample.item_features.len() != ITEM_FEATURE_DIM
            {
                return Err(CoreError::ShapeMismatch {
                    name: format!("sample_{}", i),
                    expected: vec![USER_FEATURE_DIM, ITEM_FEATURE_DIM],
                    actual: vec![sample.user_features.len(), sample.item_features.len()],
                }
                .into());
            }
            user_features
                .row_mut(i)
                .assign(&Array1::from(sample.user_features.clone()));
            item_features
                .row_mut(i)
                .assign(&Array1::from(sample.item_features.clone()));
        }

        Ok(Self {
            user_ids: samples.iter().map(|s| s.user_index).collect(),
            item_ids: samples.iter().map(|s| s.item_index).collect(),
            user_features,
            item_features,
            ratings: samples.iter().map(|s| s.rating).collect(),
        })
    }

    /// Get number of samples
    pub fn len(&self) -> usize {
        self.ratings.len()
    }

    /// Check if dataset is empty
    pub fn is_empty(&self) -> bool {
        self.ratings.is_empty()
    }

    /// Rows at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            user_ids: indices.iter().map(|&i| self.user_ids[i]).collect(),
            item_ids: indices.iter().map(|&i| self.item_ids[i]).collect(),
            user_features: self.user_features.select(Axis(0), indices),
            item_features: self.item_features.select(Axis(0), indices),
            ratings: self.ratings.select(Axis(0), indices),
        }
    }

    /// Rows of `self` followed by the rows of `other`.
    pub fn concat(&self, other: &Dataset) -> Result<Self> {
        let stack = |name: &str, a: &Array2<f32>, b: &Array2<f32>| {
            concatenate(Axis(0), &[a.view(), b.view()]).map_err(|_| CoreError::ShapeMismatch {
                name: name.to_string(),
                expected: vec![a.ncols()],
                actual: vec![b.ncols()],
            })
        };

        Ok(Self {
            user_ids: self.user_ids.iter().chain(&other.user_ids).copied().collect(),
            item_ids: self.item_ids.iter().chain(&other.item_ids).copied().collect(),
            user_features: stack("user_features", &self.user_features, &other.user_features)?,
            item_features: stack("item_features", &self.item_features, &other.item_features)?,
            ratings: self.ratings.iter().chain(other.ratings.iter()).copied().collect(),
        })
    }

    /// Row indices in a random order drawn from `rng`.
    pub fn shuffled_indices(&self, rng: &mut StdRng) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.len()).collect();
        indices.shuffle(rng);
        indices
    }

    /// Partition into `(train, validation)` by a seeded permutation.
    ///
    /// The validation share is `ceil(len * fraction)`, but at least one row
    /// always stays in the training half. A zero fraction yields an empty
    /// validation set.
    pub fn split(&self, validation_fraction: f32, seed: u64) -> Result<(Self, Self)> {
        if !(0.0..1.0).contains(&validation_fraction) {
            return Err(TrainerError::Configuration(format!(
                "validation fraction {} outside [0, 1)",
                validation_fraction
            )));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let order = self.shuffled_indices(&mut rng);
        let wanted = (self.len() as f32 * validation_fraction).ceil() as usize;
        let validation_len = wanted.min(self.len().saturating_sub(1));

        let (validation, train) = order.split_at(validation_len);
        Ok((self.select(train), self.select(validation)))
    }

    /// Per-column `(min, max)` of the user and item feature matrices.
    pub fn feature_stats(&self) -> (Vec<(f32, f32)>, Vec<(f32, f32)>) {
        let stats = |m: &Array2<f32>| {
            m.axis_iter(Axis(1))
                .map(|col| {
                    col.iter()
                        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                            (lo.min(v), hi.max(v))
                        })
                })
                .collect()
        };
        (stats(&self.user_features), stats(&self.item_features))
    }
}
