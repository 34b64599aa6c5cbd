//! Error types for the MakanMate AI core

use thiserror::Error;

/// Errors that can occur in the shared feature, preprocessing and inference code
#[derive(Error, Debug)]
pub enum CoreError {
    /// Identifier was not present when the encoder was fitted
    #[error("Unknown identifier: {0}")]
    UnknownIdentifier(String),

    /// Tensor or vector shape does not match the declared contract
    #[error("Shape mismatch for '{name}': expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Tensor dtype does not match the declared contract
    #[error("Dtype mismatch for '{name}': expected {expected}, got {actual}")]
    DtypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    /// A declared model input was not supplied
    #[error("Missing input tensor: {0}")]
    MissingInput(String),

    /// Embedding lookup outside the table bounds
    #[error("Index {index} out of range for '{name}' (size {size})")]
    IndexOutOfRange {
        name: String,
        index: i64,
        size: usize,
    },

    /// Transform requested from state that was never fitted
    #[error("Not fitted: {0}")]
    NotFitted(String),

    /// Invalid parameters supplied to a fit or build step
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// Artifact bytes or preprocessing files are structurally invalid
    #[error("Invalid artifact: {0}")]
    InvalidArtifact(String),

    /// Artifact digest does not match the expected value
    #[error("Hash mismatch: expected {expected}, computed {actual}")]
    HashMismatch { expected: String, actual: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Binary encoding error
    #[error("Encoding error: {0}")]
    Encoding(#[from] bincode::Error),
}

/// Result type for AI core operations
pub type Result<T> = std::result::Result<T, CoreError>;
