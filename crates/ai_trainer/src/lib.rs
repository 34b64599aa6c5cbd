//! MakanMate AI Trainer - offline two-tower recommendation trainer
//!
//! Fetches user, item and interaction records, fits the shared
//! preprocessing state, trains the two-tower rating model and publishes a
//! quantized inference bundle.

pub mod config;
pub mod dataset;
pub mod errors;
pub mod evaluator;
pub mod exporter;
pub mod layers;
pub mod model;
pub mod pipeline;
pub mod rating;
pub mod samples;
pub mod source;
pub mod synthetic;
pub mod trainer;

pub use config::{LoggingConfig, PipelineConfig};
pub use dataset::Dataset;
pub use errors::{Result, TrainerError};
pub use evaluator::{evaluate, evaluate_artifact, Metrics};
pub use exporter::{
    verify_bundle, BundleCheck, ExportConfig, ExportSummary, Exporter, Manifest, TrainingReport,
    HISTORY_FILE, MANIFEST_FILE,
};
pub use model::{ModelConfig, TwoTowerModel};
pub use pipeline::{Pipeline, PipelineOutcome};
pub use rating::{implicit_rating, resolve_rating};
pub use samples::{SampleBuilder, SampleReport, TrainingSample};
pub use source::{JsonExportSource, RawRecords, RecordSource, SkipCounts, SourceConfig, SourceKind};
pub use synthetic::{generate, SyntheticConfig, SyntheticSource};
pub use trainer::{EpochRecord, Trainer, TrainingConfig, TrainingHistory};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
