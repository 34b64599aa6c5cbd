//! End-to-end training run: fetch, preprocess, train, evaluate, export

use makanmate_ai_core::FittedPreprocessing;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::dataset::Dataset;
use crate::errors::{Result, TrainerError};
use crate::evaluator::{evaluate, evaluate_artifact};
use crate::exporter::{ExportSummary, Exporter, TrainingReport};
use crate::model::TwoTowerModel;
use crate::samples::SampleBuilder;
use crate::source::{JsonExportSource, RawRecords, RecordSource, SourceKind};
use crate::synthetic::SyntheticSource;
use crate::trainer::Trainer;

/// What a completed run produced
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub report: TrainingReport,
    pub export: ExportSummary,
}

/// One training run over an explicit configuration
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Validate `config` and build the pipeline.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Fetch records from the configured source, falling back to synthetic
    /// data when it is unavailable and fallback is enabled.
    pub fn fetch_records(&self) -> Result<(RawRecords, String)> {
        let source = &self.config.source;
        let primary: Box<dyn RecordSource> = match source.kind {
            SourceKind::Synthetic => Box::new(SyntheticSource::new(source.synthetic.clone())),
            SourceKind::JsonExport => {
                let path = source.path.clone().ok_or_else(|| {
                    TrainerError::Configuration("json_export source needs a path".into())
                })?;
                Box::new(JsonExportSource::new(path))
            }
        };

        match primary.fetch() {
            Ok(records) => Ok((records, primary.name().to_string())),
            Err(TrainerError::SourceUnavailable(reason)) if source.fallback_to_synthetic => {
                warn!("{} source unavailable ({}); using synthetic data", primary.name(), reason);
                let fallback = SyntheticSource::new(source.synthetic.clone());
                Ok((fallback.fetch()?, fallback.name().to_string()))
            }
            Err(err) => Err(err),
        }
    }

    pub fn run(&self) -> Result<PipelineOutcome> {
        let (records, source_name) = self.fetch_records()?;
        self.run_on(records, source_name)
    }

    /// Run every stage after fetching on already loaded records.
    pub fn run_on(&self, records: RawRecords, source_name: String) -> Result<PipelineOutcome> {
        if records.users.is_empty() || records.items.is_empty() {
            return Err(TrainerError::EmptyDataset(format!(
                "{} source returned {} users and {} items",
                source_name,
                records.users.len(),
                records.items.len()
            )));
        }

        let preprocessing = FittedPreprocessing::fit(&records.users, &records.items)?;
        self.check_table_sizes(&preprocessing)?;

        let builder = SampleBuilder::new(&preprocessing, &records.users, &records.items)?;
        let (samples, sample_report) = builder.build(&records.interactions);
        if samples.is_empty() {
            return Err(TrainerError::EmptyDataset(format!(
                "none of {} interactions reference known users and items",
                sample_report.interactions
            )));
        }

        let mut model = TwoTowerModel::new(self.config.model.clone(), self.config.training.seed)?;
        let trainer = Trainer::new(self.config.training.clone());
        let history = trainer.train(&mut model, &samples)?;

        let metrics = evaluate(&model, &samples)?;
        info!(
            "Float model: mse={:.4} rmse={:.4} mae={:.4} over {} samples",
            metrics.mse, metrics.rmse, metrics.mae, metrics.count
        );

        let exporter = Exporter::new(self.config.export.clone());
        let reference = Dataset::from_samples(&samples)?;
        let artifact = exporter.build_artifact(&model, Some(&reference))?;
        let quantized = evaluate_artifact(&artifact, &samples)?;
        info!(
            "Quantized artifact: mae={:.4} (drift {:+.4} vs float)",
            quantized.mae,
            quantized.mae - metrics.mae
        );

        let report = TrainingReport {
            source: source_name,
            seed: self.config.training.seed,
            samples: sample_report,
            history,
            metrics,
            quantized_metrics: Some(quantized),
        };
        let export = exporter.export(&artifact, &preprocessing, &report)?;

        Ok(PipelineOutcome { report, export })
    }

    fn check_table_sizes(&self, preprocessing: &FittedPreprocessing) -> Result<()> {
        let model = &self.config.model;
        if preprocessing.user_encoder.len() > model.num_users {
            return Err(TrainerError::Configuration(format!(
                "{} distinct users exceed model.num_users = {}",
                preprocessing.user_encoder.len(),
                model.num_users
            )));
        }
        if preprocessing.item_encoder.len() > model.num_items {
            return Err(TrainerError::Configuration(format!(
                "{} distinct items exceed model.num_items = {}",
                preprocessing.item_encoder.len(),
                model.num_items
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::SyntheticConfig;
    use std::path::PathBuf;

    fn config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.source.path = Some(PathBuf::from("/nonexistent/makanmate/export"));
        config.source.synthetic = SyntheticConfig {
            num_users: 6,
            num_items: 5,
            interactions_per_user: 4,
            seed: 3,
        };
        config
    }

    #[test]
    fn test_unavailable_source_falls_back() {
        let pipeline = Pipeline::new(config()).unwrap();
        let (records, name) = pipeline.fetch_records().unwrap();
        assert_eq!(name, "synthetic");
        assert_eq!(records.users.len(), 6);
    }

    #[test]
    fn test_fallback_can_be_disabled() {
        let mut cfg = config();
        cfg.source.fallback_to_synthetic = false;
        let pipeline = Pipeline::new(cfg).unwrap();
        assert!(matches!(
            pipeline.fetch_records(),
            Err(TrainerError::SourceUnavailable(_))
        ));
    }

    #[test]
    fn test_vocabulary_must_fit_tables() {
        let mut cfg = config();
        cfg.model.num_users = 3;
        let pipeline = Pipeline::new(cfg).unwrap();
        let (records, name) = pipeline.fetch_records().unwrap();
        assert!(matches!(
            pipeline.run_on(records, name),
            Err(TrainerError::Configuration(_))
        ));
    }

    #[test]
    fn test_empty_records_abort() {
        let pipeline = Pipeline::new(config()).unwrap();
        assert!(matches!(
            pipeline.run_on(RawRecords::default(), "json_export".into()),
            Err(TrainerError::EmptyDataset(_))
        ));
    }
}
