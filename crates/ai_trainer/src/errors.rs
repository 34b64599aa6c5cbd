use makanmate_ai_core::CoreError;
use thiserror::Error;

/// Errors returned by the training pipeline.
#[derive(Debug, Error)]
pub enum TrainerError {
    /// Live record source missing or unreadable; the pipeline falls back to synthetic data
    #[error("record source unavailable: {0}")]
    SourceUnavailable(String),

    /// Required configuration absent or invalid; fatal
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Evaluation or export requested before any training epoch ran
    #[error("model has not been trained")]
    ModelNotTrained,

    #[error("dataset error: {0}")]
    EmptyDataset(String),

    #[error("training error: {0}")]
    Training(String),

    #[error("export error: {0}")]
    Export(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<bincode::Error> for TrainerError {
    fn from(err: bincode::Error) -> Self {
        TrainerError::Core(CoreError::Encoding(err))
    }
}

/// Result type for trainer operations
pub type Result<T> = std::result::Result<T, TrainerError>;
