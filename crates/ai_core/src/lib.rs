//! Shared core for the MakanMate recommendation model
//!
//! Holds everything training and serving must agree on: record types, the
//! feature layout, fitted preprocessing state and the quantized inference
//! artifact.
//!
//! Modules:
//! - `vocabulary`: Cuisine, culture, dietary and category enumerations
//! - `records`: Typed user, item and interaction records
//! - `features`: Fixed-length user and item feature extraction
//! - `encoder`: Identifier to embedding-row mapping
//! - `scaler`: Per-feature standardization
//! - `preprocessing`: Persisted scaler/encoder bundle
//! - `artifact`: Quantized model format and named-input inference
//! - `serialization`: Canonical JSON and BLAKE3 helpers

pub mod artifact;
pub mod encoder;
pub mod errors;
pub mod features;
pub mod preprocessing;
pub mod records;
pub mod scaler;
pub mod serialization;
pub mod vocabulary;

pub use artifact::quant::{Activation, ChannelAffine, QuantParams, QuantizedDense, QuantizedEmbedding};
pub use artifact::tensor::{
    model_input_specs, model_output_specs, named_inputs, DType, NamedInputs, Tensor, TensorData,
    TensorSpec,
};
pub use artifact::{
    CalibrationSummary, HeadLayer, InferenceArtifact, Prediction, QuantizedGraph, TowerGraph,
    ARTIFACT_FILE, HASH_FILE,
};
pub use encoder::IdentityEncoder;
pub use errors::{CoreError, Result};
pub use features::{
    extract_item_features, extract_user_features, item_feature_names, user_feature_names,
    ItemFeatures, UserFeatures, FEATURE_LAYOUT_VERSION, ITEM_FEATURE_DIM, USER_FEATURE_DIM,
};
pub use preprocessing::{EncodedEntity, FittedPreprocessing};
pub use records::{
    BehaviorPatterns, InteractionKind, InteractionRecord, ItemRecord, UserRecord, MAX_RATING,
    MIN_RATING,
};
pub use scaler::FeatureScaler;
pub use serialization::{blake3_hex, canonical_json_string};
pub use vocabulary::{Cuisine, CulturalBackground, DietaryRestriction, FoodCategory};

/// Crate version string for manifests and reports
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
