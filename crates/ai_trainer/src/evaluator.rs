//! Regression metrics for the float model and the quantized artifact

use makanmate_ai_core::{named_inputs, InferenceArtifact};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::Dataset;
use crate::errors::{Result, TrainerError};
use crate::model::TwoTowerModel;
use crate::samples::TrainingSample;

const EVAL_BATCH: usize = 1024;

/// Aggregate error of predictions against target ratings
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub mse: f32,
    pub rmse: f32,
    pub mae: f32,
    pub count: usize,
}

impl Metrics {
    fn from_pairs<I: IntoIterator<Item = (f32, f32)>>(pairs: I) -> Self {
        let mut sq = 0.0f64;
        let mut abs = 0.0f64;
        let mut count = 0usize;
        for (predicted, target) in pairs {
            let err = (predicted - target) as f64;
            sq += err * err;
            abs += err.abs();
            count += 1;
        }
        if count == 0 {
            return Self::default();
        }

        let mse = sq / count as f64;
        Self {
            mse: mse as f32,
            rmse: mse.sqrt() as f32,
            mae: (abs / count as f64) as f32,
            count,
        }
    }
}

/// Evaluate a trained model on `samples`. Does not touch model state.
pub fn evaluate(model: &TwoTowerModel, samples: &[TrainingSample]) -> Result<Metrics> {
    if !model.is_trained() {
        return Err(TrainerError::ModelNotTrained);
    }
    let dataset = Dataset::from_samples(samples)?;
    evaluate_dataset(model, &dataset, EVAL_BATCH)
}

/// Evaluate on an already stacked dataset in chunks of `batch_size` rows.
pub fn evaluate_dataset(model: &TwoTowerModel, dataset: &Dataset, batch_size: usize) -> Result<Metrics> {
    if !model.is_trained() {
        return Err(TrainerError::ModelNotTrained);
    }

    let indices: Vec<usize> = (0..dataset.len()).collect();
    let mut pairs = Vec::with_capacity(dataset.len());
    for chunk in indices.chunks(batch_size.max(1)) {
        let batch = dataset.select(chunk);
        let predictions = model.predict(&batch)?;
        pairs.extend(predictions.iter().copied().zip(batch.ratings.iter().copied()));
    }

    let metrics = Metrics::from_pairs(pairs);
    debug!(
        "Evaluated {} samples: mse={:.4} rmse={:.4} mae={:.4}",
        metrics.count, metrics.mse, metrics.rmse, metrics.mae
    );
    Ok(metrics)
}

/// Evaluate the quantized artifact one sample at a time through its named inputs.
pub fn evaluate_artifact(artifact: &InferenceArtifact, samples: &[TrainingSample]) -> Result<Metrics> {
    if samples.is_empty() {
        return Err(TrainerError::EmptyDataset("no samples to evaluate".into()));
    }

    let mut pairs = Vec::with_capacity(samples.len());
    for sample in samples {
        let inputs = named_inputs(
            sample.user_index as i32,
            sample.item_index as i32,
            &sample.user_features,
            &sample.item_features,
        );
        let prediction = artifact.predict(&inputs)?;
        pairs.push((prediction.rating, sample.rating));
    }
    Ok(Metrics::from_pairs(pairs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelConfig;
    use makanmate_ai_core::{ITEM_FEATURE_DIM, USER_FEATURE_DIM};

    fn samples() -> Vec<TrainingSample> {
        (0..5)
            .map(|i| TrainingSample {
                user_index: i % 3,
                item_index: i % 2,
                user_features: vec![0.1 * i as f32; USER_FEATURE_DIM],
                item_features: vec![-0.1 * i as f32; ITEM_FEATURE_DIM],
                rating: 1.0 + i as f32,
            })
            .collect()
    }

    fn model() -> TwoTowerModel {
        let config = ModelConfig {
            num_users: 3,
            num_items: 2,
            embedding_dim: 2,
            feature_units: 2,
            hidden_units: vec![4, 3, 2],
            ..ModelConfig::default()
        };
        TwoTowerModel::new(config, 9).unwrap()
    }

    #[test]
    fn test_metrics_from_pairs() {
        let metrics = Metrics::from_pairs(vec![(2.0, 1.0), (3.0, 5.0)]);
        assert_eq!(metrics.count, 2);
        assert!((metrics.mse - 2.5).abs() < 1e-6);
        assert!((metrics.mae - 1.5).abs() < 1e-6);
        assert!((metrics.rmse - 2.5f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_untrained_model_is_rejected() {
        assert!(matches!(
            evaluate(&model(), &samples()),
            Err(TrainerError::ModelNotTrained)
        ));
    }

    #[test]
    fn test_evaluate_is_read_only_and_chunking_invariant() {
        let mut model = model();
        model.mark_trained(1);
        let before = model.weights().clone();

        let full = evaluate(&model, &samples()).unwrap();
        let dataset = Dataset::from_samples(&samples()).unwrap();
        let chunked = evaluate_dataset(&model, &dataset, 2).unwrap();

        assert_eq!(full.count, 5);
        assert!((full.mse - chunked.mse).abs() < 1e-5);
        assert_eq!(model.weights(), &before);
    }
}
