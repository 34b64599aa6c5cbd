//! Conversion of a trained model into the published inference bundle
//!
//! The bundle directory holds the quantized artifact and its hash file, the
//! four preprocessing state files, `training_history.json` and a
//! `manifest.json` with a BLAKE3 digest per file. It is assembled in a
//! staging directory next to the destination and renamed into place, so a
//! reader sees either the old bundle or the complete new one.

use chrono::{DateTime, Utc};
use makanmate_ai_core::{
    blake3_hex, named_inputs, Activation, CalibrationSummary, ChannelAffine, CoreError,
    FittedPreprocessing, HeadLayer, InferenceArtifact, Prediction, QuantizedDense,
    QuantizedEmbedding, QuantizedGraph, TensorSpec, TowerGraph, ARTIFACT_FILE, HASH_FILE,
    FEATURE_LAYOUT_VERSION, ITEM_FEATURE_DIM, USER_FEATURE_DIM,
};
use makanmate_ai_core::serialization::{read_json_file, write_canonical_file};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::dataset::Dataset;
use crate::errors::{Result, TrainerError};
use crate::evaluator::Metrics;
use crate::layers::{BatchNormWeights, DenseWeights};
use crate::model::TwoTowerModel;
use crate::samples::SampleReport;
use crate::trainer::TrainingHistory;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const HISTORY_FILE: &str = "training_history.json";
pub const MANIFEST_VERSION: u32 = 1;

/// Export configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub output_dir: PathBuf,
    /// Random feature rows drawn to calibrate activation ranges
    pub calibration_samples: usize,
    pub calibration_seed: u64,
    pub feature_min: f32,
    pub feature_max: f32,
    /// Keep the previous bundle as `<output_dir>.bak` instead of deleting it
    pub keep_backup: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("models"),
            calibration_samples: 100,
            calibration_seed: 42,
            feature_min: -3.0,
            feature_max: 3.0,
            keep_backup: true,
        }
    }
}

/// Everything recorded about the run in `training_history.json`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub source: String,
    pub seed: u64,
    pub samples: SampleReport,
    pub history: TrainingHistory,
    pub metrics: Metrics,
    pub quantized_metrics: Option<Metrics>,
}

/// Contents of `manifest.json`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub manifest_version: u32,
    pub feature_layout_version: u32,
    pub created_at: DateTime<Utc>,
    pub artifact_hash: String,
    pub num_users: usize,
    pub num_items: usize,
    pub inputs: Vec<TensorSpec>,
    pub outputs: Vec<TensorSpec>,
    /// File name to BLAKE3 hex digest
    pub files: std::collections::BTreeMap<String, String>,
    pub metrics: Metrics,
    pub quantized_metrics: Option<Metrics>,
}

/// Result of a successful export
#[derive(Clone, Debug)]
pub struct ExportSummary {
    pub output_dir: PathBuf,
    pub artifact_hash: String,
    pub manifest: Manifest,
}

/// Result of [`verify_bundle`]
#[derive(Clone, Debug)]
pub struct BundleCheck {
    pub artifact_hash: String,
    pub files_checked: usize,
    /// Identifiers decoded from embedding row 0 of each table
    pub probe_user: String,
    pub probe_item: String,
    pub probe: Prediction,
}

/// Quantizes trained models and publishes bundles
pub struct Exporter {
    config: ExportConfig,
}

impl Exporter {
    pub fn new(config: ExportConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Quantize `model`, calibrating activation ranges on random inputs in
    /// the configured feature range plus the `reference` rows when given.
    ///
    /// Standardized rare flags land far outside the random range, so the
    /// training rows should be passed as reference; otherwise their inputs
    /// are clamped at every quantized layer.
    pub fn build_artifact(
        &self,
        model: &TwoTowerModel,
        reference: Option<&Dataset>,
    ) -> Result<InferenceArtifact> {
        if !model.is_trained() {
            return Err(TrainerError::ModelNotTrained);
        }
        if self.config.calibration_samples == 0 {
            return Err(TrainerError::Configuration(
                "calibration_samples must be at least 1".into(),
            ));
        }
        if !(self.config.feature_min < self.config.feature_max) {
            return Err(TrainerError::Configuration(format!(
                "calibration range [{}, {}] is empty",
                self.config.feature_min, self.config.feature_max
            )));
        }

        let random = self.calibration_dataset(model);
        let (calibration, reference_samples, (feature_min, feature_max)) = match reference {
            Some(rows) if !rows.is_empty() => {
                let covered = self.covered_range(rows);
                if covered != (self.config.feature_min, self.config.feature_max) {
                    info!(
                        "Training features span [{:.3}, {:.3}]; widening calibration range",
                        covered.0, covered.1
                    );
                }
                (random.concat(rows)?, rows.len(), covered)
            }
            _ => (random, 0, (self.config.feature_min, self.config.feature_max)),
        };
        let trace = model.trace(&calibration)?;
        let ranges: Vec<(f32, f32)> = trace.dense_inputs.iter().map(value_range).collect();
        debug!("Calibrated {} dense layer input ranges", ranges.len());

        let config = model.config();
        let weights = model.weights();
        let eps = config.batch_norm_epsilon;

        let tower = |name: &str, tw: &crate::model::TowerWeights, range: (f32, f32)| -> Result<TowerGraph> {
            Ok(TowerGraph {
                embedding: QuantizedEmbedding::from_float(
                    &format!("{}_embedding", name),
                    &flatten(&tw.embedding),
                    tw.embedding.nrows(),
                    tw.embedding.ncols(),
                )?,
                projection: quantize_dense(
                    &format!("{}_projection", name),
                    &tw.projection,
                    range,
                    Activation::Relu,
                )?,
                normalization: fold_batch_norm(&tw.norm, eps),
            })
        };
        let user_tower = tower("user", &weights.user, ranges[0])?;
        let item_tower = tower("item", &weights.item, ranges[1])?;

        let mut hidden = Vec::with_capacity(weights.hidden.len());
        for (i, layer) in weights.hidden.iter().enumerate() {
            hidden.push(HeadLayer {
                dense: quantize_dense(
                    &format!("dense_{}", i + 1),
                    &layer.dense,
                    ranges[2 + i],
                    Activation::Relu,
                )?,
                normalization: layer.norm.as_ref().map(|bn| fold_batch_norm(bn, eps)),
            });
        }
        let output = quantize_dense(
            "rating",
            &weights.output,
            ranges[2 + weights.hidden.len()],
            Activation::Sigmoid,
        )?;

        let graph = QuantizedGraph {
            user_tower,
            item_tower,
            hidden,
            output,
            rating_scale: config.rating_scale,
            rating_offset: config.rating_offset,
        };
        let artifact = InferenceArtifact::new(
            graph,
            CalibrationSummary {
                samples: self.config.calibration_samples,
                seed: self.config.calibration_seed,
                reference_samples,
                feature_min,
                feature_max,
            },
        )?;

        info!(
            "Built quantized artifact for {} users and {} items",
            artifact.num_users(),
            artifact.num_items()
        );
        Ok(artifact)
    }

    /// Configured feature range widened to every column of `rows`.
    fn covered_range(&self, rows: &Dataset) -> (f32, f32) {
        let (user, item) = rows.feature_stats();
        user.iter()
            .chain(&item)
            .fold((self.config.feature_min, self.config.feature_max), |(lo, hi), &(min, max)| {
                (lo.min(min), hi.max(max))
            })
    }

    fn calibration_dataset(&self, model: &TwoTowerModel) -> Dataset {
        let n = self.config.calibration_samples;
        let (lo, hi) = (self.config.feature_min, self.config.feature_max);
        let mut rng = StdRng::seed_from_u64(self.config.calibration_seed);
        let num_users = model.config().num_users;
        let num_items = model.config().num_items;

        let user_ids = (0..n).map(|_| rng.gen_range(0..num_users)).collect();
        let item_ids = (0..n).map(|_| rng.gen_range(0..num_items)).collect();
        let user_features = Array2::from_shape_fn((n, USER_FEATURE_DIM), |_| rng.gen_range(lo..hi));
        let item_features = Array2::from_shape_fn((n, ITEM_FEATURE_DIM), |_| rng.gen_range(lo..hi));

        Dataset {
            user_ids,
            item_ids,
            user_features,
            item_features,
            ratings: Array1::zeros(n),
        }
    }

    /// Publish the artifact, preprocessing state and report into the output directory.
    pub fn export(
        &self,
        artifact: &InferenceArtifact,
        preprocessing: &FittedPreprocessing,
        report: &TrainingReport,
    ) -> Result<ExportSummary> {
        preprocessing.validate()?;
        if preprocessing.user_encoder.len() > artifact.num_users()
            || preprocessing.item_encoder.len() > artifact.num_items()
        {
            return Err(TrainerError::Export(format!(
                "encoders know {} users and {} items but the artifact has {} and {} rows",
                preprocessing.user_encoder.len(),
                preprocessing.item_encoder.len(),
                artifact.num_users(),
                artifact.num_items()
            )));
        }

        let target = &self.config.output_dir;
        let parent = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;

        let staging = tempfile::Builder::new()
            .prefix(".makanmate-export-")
            .tempdir_in(&parent)?;
        let manifest = write_bundle(staging.path(), artifact, preprocessing, report)?;

        self.publish(staging.path(), target)?;
        info!(
            "Exported {} files to {} (artifact hash {})",
            manifest.files.len() + 2,
            target.display(),
            manifest.artifact_hash
        );

        Ok(ExportSummary {
            output_dir: target.clone(),
            artifact_hash: manifest.artifact_hash.clone(),
            manifest,
        })
    }

    fn publish(&self, staged: &Path, target: &Path) -> Result<()> {
        let backup = backup_path(target);
        let had_previous = target.exists();

        if had_previous {
            if backup.exists() {
                fs::remove_dir_all(&backup)?;
            }
            fs::rename(target, &backup)?;
            debug!("Moved previous bundle to {}", backup.display());
        }

        if let Err(err) = fs::rename(staged, target) {
            if had_previous {
                if let Err(restore) = fs::rename(&backup, target) {
                    warn!("Failed to restore previous bundle: {}", restore);
                }
            }
            return Err(TrainerError::Export(format!(
                "failed to move bundle into {}: {}",
                target.display(),
                err
            )));
        }

        if had_previous && !self.config.keep_backup {
            fs::remove_dir_all(&backup)?;
        }
        Ok(())
    }
}

fn backup_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".bak");
    target.with_file_name(name)
}

fn write_bundle(
    dir: &Path,
    artifact: &InferenceArtifact,
    preprocessing: &FittedPreprocessing,
    report: &TrainingReport,
) -> Result<Manifest> {
    let artifact_hash = artifact.save(dir)?;

    let mut files = preprocessing.write_to_dir(dir)?;
    files.insert(ARTIFACT_FILE.to_string(), artifact_hash.clone());
    files.insert(
        HISTORY_FILE.to_string(),
        write_canonical_file(&dir.join(HISTORY_FILE), report)?,
    );

    let manifest = Manifest {
        manifest_version: MANIFEST_VERSION,
        feature_layout_version: FEATURE_LAYOUT_VERSION,
        created_at: Utc::now(),
        artifact_hash,
        num_users: artifact.num_users(),
        num_items: artifact.num_items(),
        inputs: artifact.inputs.clone(),
        outputs: artifact.outputs.clone(),
        files,
        metrics: report.metrics,
        quantized_metrics: report.quantized_metrics,
    };
    write_canonical_file(&dir.join(MANIFEST_FILE), &manifest)?;
    Ok(manifest)
}

/// Re-check a published bundle: file digests, artifact hash, preprocessing
/// state and one probe inference for the first known user and item on the
/// scaled-mean feature vectors.
pub fn verify_bundle(dir: &Path) -> Result<BundleCheck> {
    let manifest: Manifest = read_json_file(&dir.join(MANIFEST_FILE))?;
    if manifest.feature_layout_version != FEATURE_LAYOUT_VERSION {
        return Err(TrainerError::Export(format!(
            "bundle uses feature layout {}, this build expects {}",
            manifest.feature_layout_version, FEATURE_LAYOUT_VERSION
        )));
    }

    for (file, expected) in &manifest.files {
        let actual = blake3_hex(&fs::read(dir.join(file))?);
        if &actual != expected {
            return Err(CoreError::HashMismatch {
                expected: format!("{} {}", file, expected),
                actual,
            }
            .into());
        }
    }

    let recorded = fs::read_to_string(dir.join(HASH_FILE))?;
    if recorded.trim() != manifest.artifact_hash {
        return Err(CoreError::HashMismatch {
            expected: manifest.artifact_hash.clone(),
            actual: recorded.trim().to_string(),
        }
        .into());
    }
    let artifact = InferenceArtifact::load_verified(&dir.join(ARTIFACT_FILE), &manifest.artifact_hash)?;
    let preprocessing = FittedPreprocessing::read_from_dir(dir)?;
    if preprocessing.user_encoder.len() > artifact.num_users()
        || preprocessing.item_encoder.len() > artifact.num_items()
    {
        return Err(TrainerError::Export(
            "encoder vocabulary exceeds artifact embedding tables".into(),
        ));
    }

    let (probe_user, probe_item) = match (
        preprocessing.user_encoder.inverse_transform(0),
        preprocessing.item_encoder.inverse_transform(0),
    ) {
        (Some(user), Some(item)) => (user.to_string(), item.to_string()),
        _ => return Err(TrainerError::Export("bundle encoders are empty".into())),
    };

    let probe = artifact.predict(&named_inputs(
        0,
        0,
        &[0.0; USER_FEATURE_DIM],
        &[0.0; ITEM_FEATURE_DIM],
    ))?;
    if !probe.rating.is_finite() {
        return Err(TrainerError::Export(format!(
            "probe inference returned {}",
            probe.rating
        )));
    }

    info!(
        "Verified bundle {} ({} files, probe rating {:.3} for {} / {})",
        dir.display(),
        manifest.files.len(),
        probe.rating,
        probe_user,
        probe_item
    );
    Ok(BundleCheck {
        artifact_hash: manifest.artifact_hash,
        files_checked: manifest.files.len(),
        probe_user,
        probe_item,
        probe,
    })
}

fn flatten(m: &Array2<f32>) -> Vec<f32> {
    m.iter().copied().collect()
}

fn value_range(m: &Array2<f32>) -> (f32, f32) {
    m.iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}

fn quantize_dense(
    name: &str,
    dense: &DenseWeights,
    range: (f32, f32),
    activation: Activation,
) -> Result<QuantizedDense> {
    Ok(QuantizedDense::from_float(
        name,
        &flatten(&dense.kernel),
        &flatten(&dense.bias),
        dense.inputs(),
        dense.outputs(),
        range,
        activation,
    )?)
}

fn fold_batch_norm(bn: &BatchNormWeights, epsilon: f32) -> ChannelAffine {
    ChannelAffine::from_batch_norm(
        &flatten(&bn.gamma),
        &flatten(&bn.beta),
        &flatten(&bn.moving_mean),
        &flatten(&bn.moving_var),
        epsilon,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelConfig;
    use crate::samples::SampleBuilder;
    use crate::synthetic::{generate, SyntheticConfig};
    use crate::trainer::{Trainer, TrainingConfig};
    use makanmate_ai_core::{Cuisine, DietaryRestriction, ItemRecord, UserRecord};
    use tempfile::tempdir;

    fn trained_model() -> TwoTowerModel {
        let config = ModelConfig {
            num_users: 4,
            num_items: 3,
            embedding_dim: 4,
            feature_units: 4,
            hidden_units: vec![8, 6, 4],
            ..ModelConfig::default()
        };
        let mut model = TwoTowerModel::new(config, 3).unwrap();
        model.mark_trained(1);
        model
    }

    fn preprocessing() -> FittedPreprocessing {
        let users: Vec<UserRecord> = (0..4).map(|i| UserRecord::new(format!("user_{}", i))).collect();
        let items: Vec<ItemRecord> = (0..3)
            .map(|i| ItemRecord::new(format!("item_{}", i), Cuisine::Malay))
            .collect();
        FittedPreprocessing::fit(&users, &items).unwrap()
    }

    fn report() -> TrainingReport {
        TrainingReport {
            source: "test".into(),
            seed: 1,
            samples: SampleReport::default(),
            history: TrainingHistory::default(),
            metrics: Metrics::default(),
            quantized_metrics: None,
        }
    }

    #[test]
    fn test_untrained_model_cannot_be_exported() {
        let config = ModelConfig {
            num_users: 2,
            num_items: 2,
            embedding_dim: 2,
            feature_units: 2,
            hidden_units: vec![4, 3, 2],
            ..ModelConfig::default()
        };
        let model = TwoTowerModel::new(config, 1).unwrap();
        let result = Exporter::new(ExportConfig::default()).build_artifact(&model, None);
        assert!(matches!(result, Err(TrainerError::ModelNotTrained)));
    }

    #[test]
    fn test_quantized_predictions_track_float_model() {
        let model = trained_model();
        let exporter = Exporter::new(ExportConfig::default());
        let artifact = exporter.build_artifact(&model, None).unwrap();

        let probe = Exporter::new(ExportConfig {
            calibration_samples: 20,
            calibration_seed: 77,
            ..ExportConfig::default()
        })
        .calibration_dataset(&model);
        let expected = model.predict(&probe).unwrap();

        for row in 0..probe.len() {
            let inputs = named_inputs(
                probe.user_ids[row] as i32,
                probe.item_ids[row] as i32,
                &probe.user_features.row(row).to_vec(),
                &probe.item_features.row(row).to_vec(),
            );
            let got = artifact.predict(&inputs).unwrap().rating;
            assert!(
                (got - expected[row]).abs() < 0.15,
                "row {}: quantized {} float {}",
                row,
                got,
                expected[row]
            );
        }
    }

    #[test]
    fn test_rare_flag_user_tracks_float_model() {
        // Nobody in the synthetic data is vegan, so one vegan user scales to ~14.
        let mut records = generate(&SyntheticConfig {
            num_users: 200,
            num_items: 20,
            interactions_per_user: 10,
            seed: 9,
        });
        records.users[0].dietary_restrictions.push(DietaryRestriction::Vegan);

        let prep = FittedPreprocessing::fit(&records.users, &records.items).unwrap();
        let (samples, _) = SampleBuilder::new(&prep, &records.users, &records.items)
            .unwrap()
            .build(&records.interactions);

        let config = ModelConfig {
            num_users: 200,
            num_items: 20,
            embedding_dim: 8,
            feature_units: 8,
            hidden_units: vec![16, 8, 8],
            ..ModelConfig::default()
        };
        let mut model = TwoTowerModel::new(config, 9).unwrap();
        Trainer::new(TrainingConfig {
            epochs: 5,
            batch_size: 64,
            checkpoint_path: None,
            ..TrainingConfig::default()
        })
        .train(&mut model, &samples)
        .unwrap();

        let reference = Dataset::from_samples(&samples).unwrap();
        let vegan_column = 7;
        let rare: Vec<usize> = (0..reference.len())
            .filter(|&row| reference.user_features[[row, vegan_column]] > 3.0)
            .collect();
        assert!(!rare.is_empty());

        let artifact = Exporter::new(ExportConfig::default())
            .build_artifact(&model, Some(&reference))
            .unwrap();
        assert_eq!(artifact.calibration.reference_samples, samples.len());
        assert!(artifact.calibration.feature_max > 10.0);

        let rows = reference.select(&rare);
        let expected = model.predict(&rows).unwrap();
        for row in 0..rows.len() {
            let inputs = named_inputs(
                rows.user_ids[row] as i32,
                rows.item_ids[row] as i32,
                &rows.user_features.row(row).to_vec(),
                &rows.item_features.row(row).to_vec(),
            );
            let got = artifact.predict(&inputs).unwrap().rating;
            assert!(
                (got - expected[row]).abs() < 0.15,
                "row {}: quantized {} float {}",
                row,
                got,
                expected[row]
            );
        }
    }

    #[test]
    fn test_export_publishes_verifiable_bundle() {
        let root = tempdir().unwrap();
        let out = root.path().join("models");
        let exporter = Exporter::new(ExportConfig {
            output_dir: out.clone(),
            ..ExportConfig::default()
        });
        let artifact = exporter.build_artifact(&trained_model(), None).unwrap();
        let summary = exporter.export(&artifact, &preprocessing(), &report()).unwrap();

        for file in [ARTIFACT_FILE, HASH_FILE, MANIFEST_FILE, HISTORY_FILE, "user_scaler.json"] {
            assert!(out.join(file).exists(), "missing {}", file);
        }
        assert_eq!(summary.artifact_hash, artifact.digest().unwrap());

        let check = verify_bundle(&out).unwrap();
        assert_eq!(check.artifact_hash, summary.artifact_hash);
        assert_eq!(check.files_checked, 6);
        assert_eq!(check.probe_user, "user_0");
        assert_eq!(check.probe_item, "item_0");

        // no staging directories left behind
        let leftovers = fs::read_dir(root.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".makanmate-export-"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_reexport_keeps_backup() {
        let root = tempdir().unwrap();
        let out = root.path().join("bundle");
        let exporter = Exporter::new(ExportConfig {
            output_dir: out.clone(),
            keep_backup: true,
            ..ExportConfig::default()
        });
        let artifact = exporter.build_artifact(&trained_model(), None).unwrap();
        exporter.export(&artifact, &preprocessing(), &report()).unwrap();
        exporter.export(&artifact, &preprocessing(), &report()).unwrap();

        assert!(root.path().join("bundle.bak").join(ARTIFACT_FILE).exists());
        assert!(verify_bundle(&out).is_ok());
    }

    #[test]
    fn test_tampered_bundle_fails_verification() {
        let root = tempdir().unwrap();
        let out = root.path().join("models");
        let exporter = Exporter::new(ExportConfig {
            output_dir: out.clone(),
            ..ExportConfig::default()
        });
        let artifact = exporter.build_artifact(&trained_model(), None).unwrap();
        exporter.export(&artifact, &preprocessing(), &report()).unwrap();

        fs::write(out.join("item_encoder.json"), b"{\"classes\":[]}").unwrap();
        assert!(matches!(
            verify_bundle(&out),
            Err(TrainerError::Core(CoreError::HashMismatch { .. }))
        ));
    }

    #[test]
    fn test_vocabulary_larger_than_tables_is_rejected() {
        let root = tempdir().unwrap();
        let exporter = Exporter::new(ExportConfig {
            output_dir: root.path().join("models"),
            ..ExportConfig::default()
        });
        let artifact = exporter.build_artifact(&trained_model(), None).unwrap();

        let users: Vec<UserRecord> = (0..9).map(|i| UserRecord::new(format!("u{}", i))).collect();
        let items = vec![ItemRecord::new("i0", Cuisine::Thai)];
        let prep = FittedPreprocessing::fit(&users, &items).unwrap();

        assert!(matches!(
            exporter.export(&artifact, &prep, &report()),
            Err(TrainerError::Export(_))
        ));
    }
}
