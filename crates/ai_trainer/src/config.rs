//! Pipeline configuration
//!
//! Built once per run: defaults, then an optional TOML file, then
//! `MAKANMATE_*` environment variables, then command-line flags.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::errors::{Result, TrainerError};
use crate::exporter::ExportConfig;
use crate::model::ModelConfig;
use crate::source::{SourceConfig, SourceKind};
use crate::trainer::TrainingConfig;

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Complete configuration of one training run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub source: SourceConfig,
    pub model: ModelConfig,
    pub training: TrainingConfig,
    pub export: ExportConfig,
    pub logging: LoggingConfig,
}

impl PipelineConfig {
    /// Load configuration from a TOML file. Missing sections keep their defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let content = std::fs::read_to_string(path).map_err(|e| {
            TrainerError::Configuration(format!("failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| {
            TrainerError::Configuration(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Save configuration as TOML
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| TrainerError::Configuration(format!("failed to serialize config: {}", e)))?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply `MAKANMATE_*` overrides read through `lookup`.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("MAKANMATE_SOURCE_KIND") {
            self.source.kind = val.parse::<SourceKind>()?;
        }
        if let Some(val) = lookup("MAKANMATE_SOURCE_PATH") {
            self.source.path = Some(PathBuf::from(val));
        }
        if let Some(val) = lookup("MAKANMATE_EPOCHS") {
            self.training.epochs = parse_number("MAKANMATE_EPOCHS", &val)?;
        }
        if let Some(val) = lookup("MAKANMATE_BATCH_SIZE") {
            self.training.batch_size = parse_number("MAKANMATE_BATCH_SIZE", &val)?;
        }
        if let Some(val) = lookup("MAKANMATE_SEED") {
            let seed = parse_number("MAKANMATE_SEED", &val)?;
            self.set_seed(seed);
        }
        if let Some(val) = lookup("MAKANMATE_OUTPUT_DIR") {
            self.export.output_dir = PathBuf::from(val);
        }
        if let Some(val) = lookup("MAKANMATE_LOG_LEVEL") {
            self.logging.level = val;
        }
        Ok(())
    }

    /// Use one seed for the split, initialization, calibration and synthetic data.
    pub fn set_seed(&mut self, seed: u64) {
        self.training.seed = seed;
        self.export.calibration_seed = seed;
        self.source.synthetic.seed = seed;
    }

    /// Check the configuration. Hard errors fail; soft issues come back as warnings.
    pub fn validate(&self) -> Result<Vec<String>> {
        self.model.validate()?;
        self.training.validate()?;

        if self.source.kind == SourceKind::JsonExport && self.source.path.is_none() {
            return Err(TrainerError::Configuration(
                "source.kind = json_export requires source.path".into(),
            ));
        }
        if self.export.calibration_samples == 0 {
            return Err(TrainerError::Configuration(
                "export.calibration_samples must be at least 1".into(),
            ));
        }
        if !(self.export.feature_min < self.export.feature_max) {
            return Err(TrainerError::Configuration(
                "export.feature_min must be below export.feature_max".into(),
            ));
        }
        if !matches!(
            self.logging.level.to_ascii_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            return Err(TrainerError::Configuration(format!(
                "unknown log level '{}'",
                self.logging.level
            )));
        }

        let mut warnings = Vec::new();
        if self.model.embedding_dim < 8 {
            warnings.push(format!(
                "embedding_dim {} is very small",
                self.model.embedding_dim
            ));
        }
        if self.training.validation_fraction == 0.0 {
            warnings.push("validation_fraction is 0; early stopping monitors training loss".into());
        }
        if self.training.checkpoint_path.is_none() {
            warnings.push("checkpointing disabled".into());
        }
        if self.source.kind == SourceKind::Synthetic
            && (self.source.synthetic.num_users > self.model.num_users
                || self.source.synthetic.num_items > self.model.num_items)
        {
            warnings.push(format!(
                "synthetic data has {} users / {} items but embedding tables hold {} / {}",
                self.source.synthetic.num_users,
                self.source.synthetic.num_items,
                self.model.num_users,
                self.model.num_items
            ));
        }

        if warnings.is_empty() {
            info!("Configuration validation passed");
        } else {
            warn!("Configuration validation warnings: {:?}", warnings);
        }
        Ok(warnings)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| TrainerError::Configuration(format!("{} must be a number, got '{}'", key, raw)))
}
