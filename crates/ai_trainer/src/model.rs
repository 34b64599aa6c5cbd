//! Two-tower rating model
//!
//! ```text
//! user_id ─ Embedding(D) ─────────────────────┐
//! user_features ─ Dense(32, relu) ─ Dropout ─ BN ┴ concat ─┐
//! item_id ─ Embedding(D) ─────────────────────┐            ├ concat ─ Dense(128) ─ Dense(64) ─ Dense(32) ─ Dense(1, sigmoid) ─ ×4+1
//! item_features ─ Dense(32, relu) ─ Dropout ─ BN ┴ concat ─┘
//! ```
//!
//! Forward and backward passes are written out by hand over `ndarray`.

use makanmate_ai_core::{CoreError, ITEM_FEATURE_DIM, USER_FEATURE_DIM};
use ndarray::{s, Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::debug;

use crate::dataset::Dataset;
use crate::errors::{Result, TrainerError};
use crate::layers::{
    dropout_mask, relu, relu_backward, sigmoid, uniform_embedding, BatchNormCache,
    BatchNormWeights, DenseWeights,
};

/// Architecture and regularization hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Rows in the user embedding table
    pub num_users: usize,
    /// Rows in the item embedding table
    pub num_items: usize,
    pub embedding_dim: usize,
    /// Width of the dense projection of each tower's feature vector
    pub feature_units: usize,
    pub tower_dropout: f32,
    pub hidden_units: Vec<usize>,
    pub hidden_dropout: Vec<f32>,
    /// Leading hidden layers followed by batch normalization
    pub normalized_hidden_layers: usize,
    pub embedding_l2: f32,
    pub batch_norm_momentum: f32,
    pub batch_norm_epsilon: f32,
    pub rating_scale: f32,
    pub rating_offset: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            num_users: 1000,
            num_items: 500,
            embedding_dim: 64,
            feature_units: 32,
            tower_dropout: 0.3,
            hidden_units: vec![128, 64, 32],
            hidden_dropout: vec![0.4, 0.3, 0.2],
            normalized_hidden_layers: 2,
            embedding_l2: 1e-6,
            batch_norm_momentum: 0.99,
            batch_norm_epsilon: 1e-3,
            rating_scale: 4.0,
            rating_offset: 1.0,
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(TrainerError::Configuration(msg));

        if self.num_users == 0 || self.num_items == 0 {
            return fail("embedding tables need at least one row".into());
        }
        if self.embedding_dim == 0 || self.feature_units == 0 {
            return fail("embedding_dim and feature_units must be positive".into());
        }
        if self.hidden_units.is_empty() || self.hidden_units.contains(&0) {
            return fail("hidden_units must be a non-empty list of positive widths".into());
        }
        if self.hidden_dropout.len() != self.hidden_units.len() {
            return fail(format!(
                "hidden_dropout has {} rates for {} hidden layers",
                self.hidden_dropout.len(),
                self.hidden_units.len()
            ));
        }
        let rates = self.hidden_dropout.iter().chain(std::iter::once(&self.tower_dropout));
        for &rate in rates {
            if !(0.0..1.0).contains(&rate) {
                return fail(format!("dropout rate {} outside [0, 1)", rate));
            }
        }
        if self.normalized_hidden_layers > self.hidden_units.len() {
            return fail("normalized_hidden_layers exceeds the number of hidden layers".into());
        }
        Ok(())
    }

    /// Width of one tower's output (embedding plus projected features).
    pub fn tower_width(&self) -> usize {
        self.embedding_dim + self.feature_units
    }
}

/// Embedding table plus the feature projection of one tower
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TowerWeights {
    pub embedding: Array2<f32>,
    pub projection: DenseWeights,
    pub norm: BatchNormWeights,
}

impl TowerWeights {
    fn init(rows: usize, features: usize, config: &ModelConfig, rng: &mut StdRng) -> Self {
        Self {
            embedding: uniform_embedding(rows, config.embedding_dim, rng),
            projection: DenseWeights::glorot(features, config.feature_units, rng),
            norm: BatchNormWeights::new(config.feature_units),
        }
    }

    fn zeros_like(&self) -> Self {
        Self {
            embedding: Array2::zeros(self.embedding.raw_dim()),
            projection: self.projection.zeros_like(),
            norm: self.norm.zeros_like(),
        }
    }
}

/// A hidden layer of the interaction head
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HiddenWeights {
    pub dense: DenseWeights,
    pub norm: Option<BatchNormWeights>,
}

/// All model parameters. Also used as the gradient container, in which case
/// the running batch-norm statistics stay zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelWeights {
    pub user: TowerWeights,
    pub item: TowerWeights,
    pub hidden: Vec<HiddenWeights>,
    pub output: DenseWeights,
}

impl ModelWeights {
    pub fn init(config: &ModelConfig, rng: &mut StdRng) -> Self {
        let user = TowerWeights::init(config.num_users, USER_FEATURE_DIM, config, rng);
        let item = TowerWeights::init(config.num_items, ITEM_FEATURE_DIM, config, rng);

        let mut width = 2 * config.tower_width();
        let mut hidden = Vec::with_capacity(config.hidden_units.len());
        for (i, &units) in config.hidden_units.iter().enumerate() {
            hidden.push(HiddenWeights {
                dense: DenseWeights::glorot(width, units, rng),
                norm: (i < config.normalized_hidden_layers).then(|| BatchNormWeights::new(units)),
            });
            width = units;
        }

        Self {
            user,
            item,
            hidden,
            output: DenseWeights::glorot(width, 1, rng),
        }
    }

    pub fn zeros_like(&self) -> Self {
        Self {
            user: self.user.zeros_like(),
            item: self.item.zeros_like(),
            hidden: self
                .hidden
                .iter()
                .map(|h| HiddenWeights {
                    dense: h.dense.zeros_like(),
                    norm: h.norm.as_ref().map(BatchNormWeights::zeros_like),
                })
                .collect(),
            output: self.output.zeros_like(),
        }
    }

    /// Trainable tensors in a fixed visiting order.
    pub fn trainable(&self) -> Vec<&Array2<f32>> {
        let mut out = Vec::new();
        for tower in [&self.user, &self.item] {
            out.extend([
                &tower.embedding,
                &tower.projection.kernel,
                &tower.projection.bias,
                &tower.norm.gamma,
                &tower.norm.beta,
            ]);
        }
        for layer in &self.hidden {
            out.extend([&layer.dense.kernel, &layer.dense.bias]);
            if let Some(norm) = &layer.norm {
                out.extend([&norm.gamma, &norm.beta]);
            }
        }
        out.extend([&self.output.kernel, &self.output.bias]);
        out
    }

    /// Mutable counterpart of [`ModelWeights::trainable`], same order.
    pub fn trainable_mut(&mut self) -> Vec<&mut Array2<f32>> {
        let mut out = Vec::new();
        for tower in [&mut self.user, &mut self.item] {
            out.push(&mut tower.embedding);
            out.push(&mut tower.projection.kernel);
            out.push(&mut tower.projection.bias);
            out.push(&mut tower.norm.gamma);
            out.push(&mut tower.norm.beta);
        }
        for layer in &mut self.hidden {
            out.push(&mut layer.dense.kernel);
            out.push(&mut layer.dense.bias);
            if let Some(norm) = &mut layer.norm {
                out.push(&mut norm.gamma);
                out.push(&mut norm.beta);
            }
        }
        out.push(&mut self.output.kernel);
        out.push(&mut self.output.bias);
        out
    }

    pub fn parameter_count(&self) -> usize {
        self.trainable().iter().map(|t| t.len()).sum()
    }
}

/// Loss and gradients of one training step
#[derive(Debug, Clone)]
pub struct StepOutput {
    pub loss: f32,
    pub mae: f32,
    pub gradients: ModelWeights,
}

/// Inference-mode activations feeding each dense layer, in graph order:
/// user projection, item projection, hidden layers, output.
#[derive(Debug, Clone)]
pub struct ForwardTrace {
    pub dense_inputs: Vec<Array2<f32>>,
    pub predictions: Array1<f32>,
}

struct LayerCache {
    input: Array2<f32>,
    pre_activation: Array2<f32>,
    mask: Option<Array2<f32>>,
    norm: Option<BatchNormCache>,
}

struct TrainCache {
    user: LayerCache,
    item: LayerCache,
    hidden: Vec<LayerCache>,
    output_input: Array2<f32>,
    output_sigmoid: Array2<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Checkpoint {
    config: ModelConfig,
    weights: ModelWeights,
    epochs_trained: usize,
}

/// The two-tower network with its hyperparameters
#[derive(Debug, Clone)]
pub struct TwoTowerModel {
    config: ModelConfig,
    weights: ModelWeights,
    epochs_trained: usize,
}

impl TwoTowerModel {
    /// Build an untrained model with seeded initialization.
    pub fn new(config: ModelConfig, seed: u64) -> Result<Self> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(seed);
        let weights = ModelWeights::init(&config, &mut rng);
        debug!("Initialized model with {} parameters", weights.parameter_count());

        Ok(Self {
            config,
            weights,
            epochs_trained: 0,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn weights(&self) -> &ModelWeights {
        &self.weights
    }

    pub fn weights_mut(&mut self) -> &mut ModelWeights {
        &mut self.weights
    }

    pub fn set_weights(&mut self, weights: ModelWeights) {
        self.weights = weights;
    }

    pub fn is_trained(&self) -> bool {
        self.epochs_trained > 0
    }

    pub fn epochs_trained(&self) -> usize {
        self.epochs_trained
    }

    pub fn mark_trained(&mut self, epochs: usize) {
        self.epochs_trained = epochs;
    }

    /// `embedding_l2 * Σ W²` over both embedding tables.
    pub fn regularization_penalty(&self) -> f32 {
        let squares = |t: &Array2<f32>| t.iter().map(|v| v * v).sum::<f32>();
        self.config.embedding_l2 * (squares(&self.weights.user.embedding) + squares(&self.weights.item.embedding))
    }

    fn check_indices(&self, batch: &Dataset) -> Result<()> {
        let tables = [
            ("user_embedding", &batch.user_ids, self.config.num_users),
            ("item_embedding", &batch.item_ids, self.config.num_items),
        ];
        for (name, ids, size) in tables {
            if let Some(&index) = ids.iter().find(|&&i| i >= size) {
                return Err(CoreError::IndexOutOfRange {
                    name: name.to_string(),
                    index: index as i64,
                    size,
                }
                .into());
            }
        }
        Ok(())
    }

    /// Inference-mode forward pass recording each dense layer's input.
    pub fn trace(&self, batch: &Dataset) -> Result<ForwardTrace> {
        self.check_indices(batch)?;
        let eps = self.config.batch_norm_epsilon;
        let w = &self.weights;
        let mut dense_inputs = Vec::with_capacity(w.hidden.len() + 3);

        let mut run_tower = |tower: &TowerWeights, ids: &[usize], features: &Array2<f32>| {
            dense_inputs.push(features.clone());
            let projected = relu(&tower.projection.forward(features));
            let normed = tower.norm.forward_infer(&projected, eps);
            concat(&tower.embedding.select(Axis(0), ids), &normed)
        };
        let user = run_tower(&w.user, &batch.user_ids, &batch.user_features);
        let item = run_tower(&w.item, &batch.item_ids, &batch.item_features);

        let mut h = concat(&user, &item);
        for layer in &w.hidden {
            dense_inputs.push(h.clone());
            h = relu(&layer.dense.forward(&h));
            if let Some(norm) = &layer.norm {
                h = norm.forward_infer(&h, eps);
            }
        }

        dense_inputs.push(h.clone());
        let unit = sigmoid(&w.output.forward(&h));
        let predictions = unit.column(0).mapv(|s| s * self.config.rating_scale + self.config.rating_offset);

        Ok(ForwardTrace {
            dense_inputs,
            predictions,
        })
    }

    /// Predicted ratings for every row of `batch`.
    pub fn predict(&self, batch: &Dataset) -> Result<Array1<f32>> {
        Ok(self.trace(batch)?.predictions)
    }

    fn tower_train(
        tower: &mut TowerWeights,
        ids: &[usize],
        features: &Array2<f32>,
        config: &ModelConfig,
        rng: &mut StdRng,
    ) -> (Array2<f32>, LayerCache) {
        let z = tower.projection.forward(features);
        let mask = dropout_mask(z.nrows(), z.ncols(), config.tower_dropout, rng);
        let dropped = relu(&z) * &mask;
        let (normed, norm_cache) =
            tower
                .norm
                .forward_train(&dropped, config.batch_norm_momentum, config.batch_norm_epsilon);

        let out = concat(&tower.embedding.select(Axis(0), ids), &normed);
        let cache = LayerCache {
            input: features.clone(),
            pre_activation: z,
            mask: Some(mask),
            norm: Some(norm_cache),
        };
        (out, cache)
    }

    fn forward_train(&mut self, batch: &Dataset, rng: &mut StdRng) -> (Array2<f32>, TrainCache) {
        let config = &self.config;
        let w = &mut self.weights;

        let (user, user_cache) =
            Self::tower_train(&mut w.user, &batch.user_ids, &batch.user_features, config, rng);
        let (item, item_cache) =
            Self::tower_train(&mut w.item, &batch.item_ids, &batch.item_features, config, rng);

        let mut h = concat(&user, &item);
        let mut hidden = Vec::with_capacity(w.hidden.len());
        for (layer, &rate) in w.hidden.iter_mut().zip(&config.hidden_dropout) {
            let z = layer.dense.forward(&h);
            let mask = dropout_mask(z.nrows(), z.ncols(), rate, rng);
            let mut out = relu(&z) * &mask;
            let mut norm_cache = None;
            if let Some(norm) = &mut layer.norm {
                let (normed, cache) =
                    norm.forward_train(&out, config.batch_norm_momentum, config.batch_norm_epsilon);
                out = normed;
                norm_cache = Some(cache);
            }
            hidden.push(LayerCache {
                input: h,
                pre_activation: z,
                mask: Some(mask),
                norm: norm_cache,
            });
            h = out;
        }

        let unit = sigmoid(&w.output.forward(&h));
        let predictions = unit.mapv(|s| s * config.rating_scale + config.rating_offset);
        let cache = TrainCache {
            user: user_cache,
            item: item_cache,
            hidden,
            output_input: h,
            output_sigmoid: unit,
        };
        (predictions, cache)
    }

    fn tower_backward(
        tower: &TowerWeights,
        grads: &mut TowerWeights,
        cache: &LayerCache,
        ids: &[usize],
        d_out: &Array2<f32>,
        embedding_dim: usize,
    ) {
        let d_embedding = d_out.slice(s![.., ..embedding_dim]);
        for (row, &id) in d_embedding.outer_iter().zip(ids) {
            let mut target = grads.embedding.row_mut(id);
            target += &row;
        }

        let mut d_dropped = d_out.slice(s![.., embedding_dim..]).to_owned();
        if let Some(norm_cache) = &cache.norm {
            let (norm_grads, dx) = tower.norm.backward(norm_cache, &d_dropped);
            grads.norm.gamma = norm_grads.gamma;
            grads.norm.beta = norm_grads.beta;
            d_dropped = dx;
        }
        let d_activation = match &cache.mask {
            Some(mask) => d_dropped * mask,
            None => d_dropped,
        };
        let dz = relu_backward(&cache.pre_activation, &d_activation);
        let (proj_grads, _) = tower.projection.backward(&cache.input, &dz);
        grads.projection = proj_grads;
    }

    /// One forward/backward pass in training mode on `batch`.
    ///
    /// Updates batch-norm running statistics; does not touch trainable
    /// weights. Returns the batch MSE (plus embedding penalty), MAE and
    /// gradients.
    pub fn train_step(&mut self, batch: &Dataset, rng: &mut StdRng) -> Result<StepOutput> {
        if batch.is_empty() {
            return Err(TrainerError::EmptyDataset("training batch is empty".into()));
        }
        self.check_indices(batch)?;

        let (predictions, cache) = self.forward_train(batch, rng);
        let n = batch.len() as f32;
        let targets = batch.ratings.view().insert_axis(Axis(1));
        let errors = &predictions - &targets;

        let mse = errors.mapv(|e| e * e).sum() / n;
        let mae = errors.mapv(f32::abs).sum() / n;
        let loss = mse + self.regularization_penalty();

        let w = &self.weights;
        let mut grads = w.zeros_like();

        // d(mse)/d(pred), then through the affine rescale and sigmoid
        let s = &cache.output_sigmoid;
        let scale = self.config.rating_scale;
        let dz_out = errors.mapv(|e| 2.0 * e / n) * &s.mapv(|v| scale * v * (1.0 - v));
        let (out_grads, mut dh) = w.output.backward(&cache.output_input, &dz_out);
        grads.output = out_grads;

        for ((layer, layer_cache), layer_grads) in w
            .hidden
            .iter()
            .zip(&cache.hidden)
            .zip(grads.hidden.iter_mut())
            .rev()
        {
            if let (Some(norm), Some(norm_cache)) = (&layer.norm, &layer_cache.norm) {
                let (norm_grads, dx) = norm.backward(norm_cache, &dh);
                if let Some(g) = &mut layer_grads.norm {
                    g.gamma = norm_grads.gamma;
                    g.beta = norm_grads.beta;
                }
                dh = dx;
            }
            if let Some(mask) = &layer_cache.mask {
                dh = dh * mask;
            }
            let dz = relu_backward(&layer_cache.pre_activation, &dh);
            let (dense_grads, dx) = layer.dense.backward(&layer_cache.input, &dz);
            layer_grads.dense = dense_grads;
            dh = dx;
        }

        let width = self.config.tower_width();
        let dim = self.config.embedding_dim;
        let d_user = dh.slice(s![.., ..width]).to_owned();
        let d_item = dh.slice(s![.., width..]).to_owned();
        Self::tower_backward(&w.user, &mut grads.user, &cache.user, &batch.user_ids, &d_user, dim);
        Self::tower_backward(&w.item, &mut grads.item, &cache.item, &batch.item_ids, &d_item, dim);

        let l2 = 2.0 * self.config.embedding_l2;
        grads.user.embedding.scaled_add(l2, &w.user.embedding);
        grads.item.embedding.scaled_add(l2, &w.item.embedding);

        Ok(StepOutput {
            loss,
            mae,
            gradients: grads,
        })
    }

    /// Write config and weights to `path` through a temp file + rename.
    pub fn save_checkpoint(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let checkpoint = Checkpoint {
            config: self.config.clone(),
            weights: self.weights.clone(),
            epochs_trained: self.epochs_trained,
        };
        let bytes = bincode::serialize(&checkpoint)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.persist(path).map_err(|e| TrainerError::Io(e.error))?;
        debug!("Checkpoint written to {}", path.display());
        Ok(())
    }

    pub fn load_checkpoint(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let checkpoint: Checkpoint = bincode::deserialize(&bytes)?;
        checkpoint.config.validate()?;
        Ok(Self {
            config: checkpoint.config,
            weights: checkpoint.weights,
            epochs_trained: checkpoint.epochs_trained,
        })
    }
}

fn concat(left: &Array2<f32>, right: &Array2<f32>) -> Array2<f32> {
    let mut out = Array2::zeros((left.nrows(), left.ncols() + right.ncols()));
    out.slice_mut(s![.., ..left.ncols()]).assign(left);
    out.slice_mut(s![.., left.ncols()..]).assign(right);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::samples::TrainingSample;
    use tempfile::tempdir;

    fn small_config() -> ModelConfig {
        ModelConfig {
            num_users: 4,
            num_items: 3,
            embedding_dim: 4,
            feature_units: 3,
            hidden_units: vec![6, 4, 2],
            ..ModelConfig::default()
        }
    }

    fn batch() -> Dataset {
        let samples: Vec<TrainingSample> = (0..6)
            .map(|i| TrainingSample {
                user_index: i % 4,
                item_index: i % 3,
                user_features: vec![0.1 * i as f32; USER_FEATURE_DIM],
                item_features: vec![-0.05 * i as f32; ITEM_FEATURE_DIM],
                rating: 1.0 + (i % 5) as f32,
            })
            .collect();
        Dataset::from_samples(&samples).unwrap()
    }

    #[test]
    fn test_predictions_within_rating_range() {
        let model = TwoTowerModel::new(small_config(), 42).unwrap();
        let predictions = model.predict(&batch()).unwrap();
        assert_eq!(predictions.len(), 6);
        assert!(predictions.iter().all(|&p| (1.0..=5.0).contains(&p)));
    }

    #[test]
    fn test_trace_covers_every_dense_layer() {
        let model = TwoTowerModel::new(small_config(), 42).unwrap();
        let trace = model.trace(&batch()).unwrap();
        // two projections, three hidden layers, output
        assert_eq!(trace.dense_inputs.len(), 6);
        assert_eq!(trace.dense_inputs[2].ncols(), 2 * (4 + 3));
        assert_eq!(trace.dense_inputs[5].ncols(), 2);
    }

    #[test]
    fn test_initialization_is_seeded() {
        let a = TwoTowerModel::new(small_config(), 7).unwrap();
        let b = TwoTowerModel::new(small_config(), 7).unwrap();
        let c = TwoTowerModel::new(small_config(), 8).unwrap();
        assert_eq!(a.weights(), b.weights());
        assert_ne!(a.weights(), c.weights());
    }

    #[test]
    fn test_out_of_range_index_is_rejected() {
        let model = TwoTowerModel::new(small_config(), 1).unwrap();
        let mut data = batch();
        data.user_ids[0] = 4;
        assert!(matches!(
            model.predict(&data),
            Err(TrainerError::Core(CoreError::IndexOutOfRange { .. }))
        ));
    }

    #[test]
    fn test_output_gradient_matches_finite_difference() {
        let mut config = small_config();
        config.tower_dropout = 0.0;
        config.hidden_dropout = vec![0.0; 3];
        config.normalized_hidden_layers = 0;
        let data = batch();

        let mut model = TwoTowerModel::new(config, 3).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let analytic = model.train_step(&data, &mut rng).unwrap().gradients.output.bias[[0, 0]];

        let loss_at = |delta: f32| {
            let mut probe = model.clone();
            probe.weights_mut().output.bias[[0, 0]] += delta;
            let mut rng = StdRng::seed_from_u64(0);
            probe.train_step(&data, &mut rng).unwrap().loss
        };
        let h = 1e-2;
        let numeric = (loss_at(h) - loss_at(-h)) / (2.0 * h);
        assert!(
            (numeric - analytic).abs() < 1e-2,
            "numeric {} analytic {}",
            numeric,
            analytic
        );
    }

    #[test]
    fn test_gradients_align_with_trainable_order() {
        let mut model = TwoTowerModel::new(small_config(), 5).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let step = model.train_step(&batch(), &mut rng).unwrap();

        let params = model.weights().trainable();
        let grads = step.gradients.trainable();
        assert_eq!(params.len(), grads.len());
        for (p, g) in params.iter().zip(&grads) {
            assert_eq!(p.shape(), g.shape());
        }
        assert!(step.loss.is_finite() && step.mae.is_finite());
    }

    #[test]
    fn test_checkpoint_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("best_model.ckpt");
        let mut model = TwoTowerModel::new(small_config(), 9).unwrap();
        model.mark_trained(3);
        model.save_checkpoint(&path).unwrap();

        let restored = TwoTowerModel::load_checkpoint(&path).unwrap();
        assert_eq!(restored.weights(), model.weights());
        assert_eq!(restored.epochs_trained(), 3);
        assert_eq!(restored.config(), model.config());
    }

    #[test]
    fn test_config_validation() {
        let mut config = ModelConfig::default();
        assert!(config.validate().is_ok());
        config.hidden_dropout = vec![0.4];
        assert!(matches!(config.validate(), Err(TrainerError::Configuration(_))));

        let config = ModelConfig {
            tower_dropout: 1.0,
            ..ModelConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
