//! Mini-batch trainer for the two-tower model
//!
//! Adam on MSE with a seeded train/validation split, per-epoch shuffling,
//! best-weights checkpointing, early stopping and learning-rate reduction
//! on plateau. The monitored quantity is validation loss, or training loss
//! when the validation split is empty.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::dataset::Dataset;
use crate::errors::{Result, TrainerError};
use crate::evaluator::evaluate_dataset;
use crate::layers::Adam;
use crate::model::{ModelWeights, TwoTowerModel};
use crate::samples::TrainingSample;

/// Training configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub validation_fraction: f32,
    pub learning_rate: f32,
    /// Seeds the split, weight initialization, shuffling and dropout
    pub seed: u64,
    pub early_stopping_patience: usize,
    pub lr_reduce_factor: f32,
    pub lr_reduce_patience: usize,
    /// Minimum decrease that resets the plateau counter
    pub lr_min_delta: f32,
    pub min_learning_rate: f32,
    /// Where the best weights are written during training; `None` disables
    pub checkpoint_path: Option<PathBuf>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 50,
            batch_size: 512,
            validation_fraction: 0.2,
            learning_rate: 1e-3,
            seed: 42,
            early_stopping_patience: 10,
            lr_reduce_factor: 0.8,
            lr_reduce_patience: 5,
            lr_min_delta: 1e-4,
            min_learning_rate: 0.0,
            checkpoint_path: Some(PathBuf::from("best_model.ckpt")),
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(TrainerError::Configuration("epochs must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(TrainerError::Configuration("batch_size must be at least 1".into()));
        }
        if !(0.0..1.0).contains(&self.validation_fraction) {
            return Err(TrainerError::Configuration(format!(
                "validation_fraction {} outside [0, 1)",
                self.validation_fraction
            )));
        }
        if !(self.learning_rate > 0.0) {
            return Err(TrainerError::Configuration("learning_rate must be positive".into()));
        }
        if !(self.lr_reduce_factor > 0.0 && self.lr_reduce_factor < 1.0) {
            return Err(TrainerError::Configuration(
                "lr_reduce_factor must be in (0, 1)".into(),
            ));
        }
        Ok(())
    }
}

/// Metrics of one epoch
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub loss: f32,
    pub mae: f32,
    pub val_loss: Option<f32>,
    pub val_mae: Option<f32>,
    pub learning_rate: f32,
}

/// What happened during training
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochRecord>,
    pub best_epoch: usize,
    pub best_monitor: f32,
    pub stopped_early: bool,
    pub train_samples: usize,
    pub validation_samples: usize,
}

impl TrainingHistory {
    pub fn last(&self) -> Option<&EpochRecord> {
        self.epochs.last()
    }
}

/// Keeps the best monitored value and weights; counts epochs without improvement
struct EarlyStopping {
    patience: usize,
    wait: usize,
    best: f32,
    best_epoch: usize,
    best_weights: Option<ModelWeights>,
}

impl EarlyStopping {
    fn new(patience: usize) -> Self {
        Self {
            patience,
            wait: 0,
            best: f32::INFINITY,
            best_epoch: 0,
            best_weights: None,
        }
    }

    /// Returns `true` when `current` improves on the best so far.
    fn observe(&mut self, epoch: usize, current: f32, weights: &ModelWeights) -> bool {
        if current < self.best {
            self.best = current;
            self.best_epoch = epoch;
            self.best_weights = Some(weights.clone());
            self.wait = 0;
            true
        } else {
            self.wait += 1;
            false
        }
    }

    fn should_stop(&self) -> bool {
        self.wait >= self.patience
    }
}

/// Multiplies the learning rate by `factor` after `patience` stale epochs
struct ReduceOnPlateau {
    factor: f32,
    patience: usize,
    min_delta: f32,
    min_lr: f32,
    wait: usize,
    best: f32,
}

impl ReduceOnPlateau {
    /// Returns the new learning rate when a reduction fires.
    fn observe(&mut self, current: f32, lr: f32) -> Option<f32> {
        if current < self.best - self.min_delta {
            self.best = current;
            self.wait = 0;
            return None;
        }

        self.wait += 1;
        if self.wait >= self.patience {
            self.wait = 0;
            let reduced = (lr * self.factor).max(self.min_lr);
            if reduced < lr {
                return Some(reduced);
            }
        }
        None
    }
}

/// Fits a [`TwoTowerModel`] on training samples
pub struct Trainer {
    config: TrainingConfig,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Train `model` in place on `samples`.
    ///
    /// On return the model holds the best weights seen (by the monitored
    /// loss) and is marked trained.
    pub fn train(&self, model: &mut TwoTowerModel, samples: &[TrainingSample]) -> Result<TrainingHistory> {
        self.config.validate()?;
        let dataset = Dataset::from_samples(samples)?;
        let (train, validation) = dataset.split(self.config.validation_fraction, self.config.seed)?;

        info!(
            "Training on {} samples, validating on {} (batch size {}, up to {} epochs)",
            train.len(),
            validation.len(),
            self.config.batch_size,
            self.config.epochs
        );
        if validation.is_empty() {
            warn!("Validation split is empty; monitoring training loss instead");
        }

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut optimizer = Adam::new(self.config.learning_rate);
        let mut stopper = EarlyStopping::new(self.config.early_stopping_patience);
        let mut plateau = ReduceOnPlateau {
            factor: self.config.lr_reduce_factor,
            patience: self.config.lr_reduce_patience,
            min_delta: self.config.lr_min_delta,
            min_lr: self.config.min_learning_rate,
            wait: 0,
            best: f32::INFINITY,
        };

        let mut history = TrainingHistory {
            train_samples: train.len(),
            validation_samples: validation.len(),
            ..TrainingHistory::default()
        };

        for epoch in 1..=self.config.epochs {
            let (loss, mae) = self.run_epoch(model, &train, &mut optimizer, &mut rng)?;
            if !loss.is_finite() {
                return Err(TrainerError::Training(format!(
                    "loss diverged to {} at epoch {}",
                    loss, epoch
                )));
            }
            model.mark_trained(epoch);

            let (val_loss, val_mae) = if validation.is_empty() {
                (None, None)
            } else {
                let metrics = evaluate_dataset(model, &validation, self.config.batch_size)?;
                (Some(metrics.mse + model.regularization_penalty()), Some(metrics.mae))
            };

            let record = EpochRecord {
                epoch,
                loss,
                mae,
                val_loss,
                val_mae,
                learning_rate: optimizer.learning_rate,
            };
            info!(
                "Epoch {}/{}: loss={:.4} mae={:.4} val_loss={} val_mae={} lr={:.2e}",
                epoch,
                self.config.epochs,
                loss,
                mae,
                format_metric(val_loss),
                format_metric(val_mae),
                optimizer.learning_rate
            );
            history.epochs.push(record);

            let monitor = val_loss.unwrap_or(loss);
            if stopper.observe(epoch, monitor, model.weights()) {
                if let Some(path) = &self.config.checkpoint_path {
                    model.save_checkpoint(path)?;
                    debug!("Epoch {}: monitored loss improved to {:.4}, checkpoint saved", epoch, monitor);
                }
            }

            if stopper.should_stop() {
                info!(
                    "Early stopping at epoch {}: no improvement since epoch {}",
                    epoch, stopper.best_epoch
                );
                history.stopped_early = true;
                break;
            }

            if let Some(lr) = plateau.observe(monitor, optimizer.learning_rate) {
                info!(
                    "Epoch {}: reducing learning rate {:.2e} -> {:.2e}",
                    epoch, optimizer.learning_rate, lr
                );
                optimizer.learning_rate = lr;
            }
        }

        if let Some(best) = stopper.best_weights.take() {
            info!("Restoring weights from epoch {}", stopper.best_epoch);
            model.set_weights(best);
        }

        history.best_epoch = stopper.best_epoch;
        history.best_monitor = stopper.best;
        Ok(history)
    }

    /// One pass over shuffled mini-batches. Returns sample-weighted mean loss and MAE.
    fn run_epoch(
        &self,
        model: &mut TwoTowerModel,
        train: &Dataset,
        optimizer: &mut Adam,
        rng: &mut StdRng,
    ) -> Result<(f32, f32)> {
        let order = train.shuffled_indices(rng);
        let mut loss_sum = 0.0f64;
        let mut mae_sum = 0.0f64;

        for chunk in order.chunks(self.config.batch_size) {
            let batch = train.select(chunk);
            let step = model.train_step(&batch, rng)?;
            optimizer.apply(model.weights_mut().trainable_mut(), step.gradients.trainable());

            loss_sum += step.loss as f64 * chunk.len() as f64;
            mae_sum += step.mae as f64 * chunk.len() as f64;
        }

        let n = train.len() as f64;
        Ok(((loss_sum / n) as f32, (mae_sum / n) as f32))
    }
}

fn format_metric(value: Option<f32>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.4}", v))
}
