//! End-to-end tests: synthetic records through training to a verified bundle

use anyhow::Result;
use makanmate_ai_core::{
    named_inputs, FittedPreprocessing, InferenceArtifact, InteractionKind, InteractionRecord,
    ARTIFACT_FILE, HASH_FILE, ITEM_FEATURE_DIM, USER_FEATURE_DIM,
};
use makanmate_ai_trainer::{
    evaluate, generate, resolve_rating, verify_bundle, ExportConfig, Exporter, ModelConfig,
    Pipeline, PipelineConfig, SampleBuilder, SourceKind, SyntheticConfig, TrainerError,
    TrainingSample, TwoTowerModel,
};
use proptest::prelude::*;
use tempfile::tempdir;

fn small_synthetic() -> SyntheticConfig {
    SyntheticConfig {
        num_users: 10,
        num_items: 10,
        interactions_per_user: 10,
        seed: 42,
    }
}

fn small_model() -> ModelConfig {
    ModelConfig {
        num_users: 10,
        num_items: 10,
        embedding_dim: 8,
        feature_units: 8,
        hidden_units: vec![16, 8, 4],
        ..ModelConfig::default()
    }
}

#[test]
fn test_samples_from_small_synthetic_population() -> Result<()> {
    let records = generate(&small_synthetic());
    assert_eq!(records.interactions.len(), 100);

    let prep = FittedPreprocessing::fit(&records.users, &records.items)?;
    let builder = SampleBuilder::new(&prep, &records.users, &records.items)?;
    let (samples, report) = builder.build(&records.interactions);

    assert!(samples.len() <= 100);
    assert_eq!(report.samples + report.dropped(), 100);
    for sample in &samples {
        assert!((1.0..=5.0).contains(&sample.rating));
        assert_eq!(sample.user_features.len(), USER_FEATURE_DIM);
        assert_eq!(sample.item_features.len(), ITEM_FEATURE_DIM);
        assert!(sample.user_index < 10 && sample.item_index < 10);
    }
    Ok(())
}

#[test]
fn test_pipeline_publishes_verifiable_bundle() -> Result<()> {
    let dir = tempdir()?;
    let mut config = PipelineConfig::default();
    config.source.kind = SourceKind::Synthetic;
    config.source.synthetic = small_synthetic();
    config.model = small_model();
    config.training.epochs = 3;
    config.training.batch_size = 32;
    config.training.checkpoint_path = Some(dir.path().join("best_model.ckpt"));
    config.export.output_dir = dir.path().join("models");

    let outcome = Pipeline::new(config)?.run()?;

    assert_eq!(outcome.report.source, "synthetic");
    assert!(!outcome.report.history.epochs.is_empty());
    assert!(outcome.report.history.epochs.len() <= 3);
    assert!(outcome.report.metrics.rmse.is_finite());
    assert!(dir.path().join("best_model.ckpt").exists());

    let bundle = dir.path().join("models");
    assert!(bundle.join(ARTIFACT_FILE).exists());
    assert!(bundle.join(HASH_FILE).exists());
    let check = verify_bundle(&bundle)?;
    assert_eq!(check.artifact_hash, outcome.export.artifact_hash);

    // The published preprocessing reproduces training-time features exactly.
    let records = generate(&small_synthetic());
    let fitted = FittedPreprocessing::fit(&records.users, &records.items)?;
    let loaded = FittedPreprocessing::read_from_dir(&bundle)?;
    assert_eq!(loaded, fitted);
    for user in &records.users {
        assert_eq!(loaded.scale_user(user)?, fitted.scale_user(user)?);
    }
    for item in &records.items {
        assert_eq!(loaded.encode_item(item)?, fitted.encode_item(item)?);
    }

    // Inputs are resolved by name, and the loaded artifact serves the bundle's vocabulary.
    let artifact = InferenceArtifact::load(&bundle.join(ARTIFACT_FILE))?;
    let user = loaded.encode_user(&records.users[3])?;
    let item = loaded.encode_item(&records.items[7])?;
    let prediction = artifact.predict(&named_inputs(
        user.index as i32,
        item.index as i32,
        &user.features,
        &item.features,
    ))?;
    assert!(prediction.rating.is_finite());
    Ok(())
}

#[test]
fn test_untrained_model_cannot_be_evaluated_or_exported() -> Result<()> {
    let model = TwoTowerModel::new(small_model(), 1)?;
    let sample = TrainingSample {
        user_index: 0,
        item_index: 0,
        user_features: vec![0.0; USER_FEATURE_DIM],
        item_features: vec![0.0; ITEM_FEATURE_DIM],
        rating: 3.0,
    };

    assert!(matches!(
        evaluate(&model, &[sample]),
        Err(TrainerError::ModelNotTrained)
    ));
    assert!(matches!(
        Exporter::new(ExportConfig::default()).build_artifact(&model, None),
        Err(TrainerError::ModelNotTrained)
    ));
    Ok(())
}

proptest! {
    #[test]
    fn explicit_rating_always_wins(rating in 1.0f32..=5.0, kind in "[a-z]{0,10}") {
        let interaction = InteractionRecord::new("u", "i", InteractionKind::parse(&kind), Some(rating));
        prop_assert_eq!(resolve_rating(&interaction), rating);
    }

    #[test]
    fn implicit_rating_stays_in_range(kind in "[a-z]{0,10}") {
        let interaction = InteractionRecord::new("u", "i", InteractionKind::parse(&kind), None);
        let rating = resolve_rating(&interaction);
        prop_assert!((1.0..=5.0).contains(&rating));
    }
}
