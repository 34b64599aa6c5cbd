//! Quantized inference artifact
//!
//! File layout: `MKRT` magic, little-endian u16 format version, then a
//! bincode payload holding the tensor contract and the quantized graph.
//! Callers supply inputs by name; position carries no meaning.

pub mod quant;
pub mod tensor;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::errors::{CoreError, Result};
use crate::features::{FEATURE_LAYOUT_VERSION, ITEM_FEATURE_DIM, USER_FEATURE_DIM};
use crate::records::{MAX_RATING, MIN_RATING};
use crate::serialization::blake3_hex;

use self::quant::{ChannelAffine, QuantizedDense, QuantizedEmbedding};
use self::tensor::{
    model_input_specs, model_output_specs, DType, NamedInputs, Tensor, TensorSpec,
    ITEM_FEATURES_INPUT, ITEM_ID_INPUT, USER_FEATURES_INPUT, USER_ID_INPUT,
};

pub const ARTIFACT_FILE: &str = "recommendation_model.mkrt";
pub const HASH_FILE: &str = "recommendation_model.hash";
pub const ARTIFACT_MAGIC: &[u8; 4] = b"MKRT";
pub const ARTIFACT_FORMAT_VERSION: u16 = 1;

const HEADER_LEN: usize = 6;

/// One side of the two-tower network: embedding row plus projected features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TowerGraph {
    pub embedding: QuantizedEmbedding,
    pub projection: QuantizedDense,
    pub normalization: ChannelAffine,
}

impl TowerGraph {
    pub fn output_dim(&self) -> usize {
        self.embedding.dim + self.projection.outputs
    }

    fn forward(&self, index: i64, features: &[f32]) -> Result<Vec<f32>> {
        let mut out = self.embedding.lookup(index)?;
        let mut projected = self.projection.forward(features)?;
        self.normalization.apply(&mut projected);
        out.extend(projected);
        Ok(out)
    }

    fn validate(&self, feature_dim: usize) -> Result<()> {
        self.embedding.validate()?;
        self.projection.validate()?;
        if self.projection.inputs != feature_dim
            || self.normalization.channels() != self.projection.outputs
        {
            return Err(CoreError::InvalidArtifact(format!(
                "tower '{}' expects {} features, projection takes {}",
                self.embedding.name, feature_dim, self.projection.inputs
            )));
        }
        Ok(())
    }
}

/// Hidden layer of the interaction head
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadLayer {
    pub dense: QuantizedDense,
    pub normalization: Option<ChannelAffine>,
}

/// The full quantized network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizedGraph {
    pub user_tower: TowerGraph,
    pub item_tower: TowerGraph,
    pub hidden: Vec<HeadLayer>,
    pub output: QuantizedDense,
    pub rating_scale: f32,
    pub rating_offset: f32,
}

impl QuantizedGraph {
    /// Raw rating for one (user, item) pair.
    pub fn forward(
        &self,
        user_index: i64,
        item_index: i64,
        user_features: &[f32],
        item_features: &[f32],
    ) -> Result<f32> {
        let mut x = self.user_tower.forward(user_index, user_features)?;
        x.extend(self.item_tower.forward(item_index, item_features)?);

        for layer in &self.hidden {
            x = layer.dense.forward(&x)?;
            if let Some(norm) = &layer.normalization {
                norm.apply(&mut x);
            }
        }

        let out = self.output.forward(&x)?;
        let unit = out.first().copied().ok_or_else(|| {
            CoreError::InvalidArtifact("output layer produced no values".into())
        })?;
        Ok(unit * self.rating_scale + self.rating_offset)
    }

    /// Check that every layer's width feeds the next.
    pub fn validate(&self) -> Result<()> {
        self.user_tower.validate(USER_FEATURE_DIM)?;
        self.item_tower.validate(ITEM_FEATURE_DIM)?;

        let mut width = self.user_tower.output_dim() + self.item_tower.output_dim();
        for layer in &self.hidden {
            layer.dense.validate()?;
            if layer.dense.inputs != width {
                return Err(CoreError::InvalidArtifact(format!(
                    "layer '{}' takes {} inputs, previous layer yields {}",
                    layer.dense.name, layer.dense.inputs, width
                )));
            }
            if let Some(norm) = &layer.normalization {
                if norm.channels() != layer.dense.outputs {
                    return Err(CoreError::InvalidArtifact(format!(
                        "normalization after '{}' has {} channels",
                        layer.dense.name,
                        norm.channels()
                    )));
                }
            }
            width = layer.dense.outputs;
        }

        self.output.validate()?;
        if self.output.inputs != width || self.output.outputs != 1 {
            return Err(CoreError::InvalidArtifact(format!(
                "output layer is {}x{}, expected {}x1",
                self.output.inputs, self.output.outputs, width
            )));
        }
        Ok(())
    }
}

/// How the activation ranges were calibrated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSummary {
    /// Random rows drawn in the configured feature range
    pub samples: usize,
    pub seed: u64,
    /// Real training rows traced alongside the random ones
    pub reference_samples: usize,
    /// Feature bounds covered by calibration, widened to the reference data
    pub feature_min: f32,
    pub feature_max: f32,
}

/// Output of one inference call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub rating: f32,
    /// Whether `rating` lies in the nominal [1, 5] range. Not clamped.
    pub in_range: bool,
}

/// Portable quantized model plus its declared tensor contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceArtifact {
    pub feature_layout_version: u32,
    pub inputs: Vec<TensorSpec>,
    pub outputs: Vec<TensorSpec>,
    pub calibration: CalibrationSummary,
    pub graph: QuantizedGraph,
}

impl InferenceArtifact {
    pub fn new(graph: QuantizedGraph, calibration: CalibrationSummary) -> Result<Self> {
        let artifact = Self {
            feature_layout_version: FEATURE_LAYOUT_VERSION,
            inputs: model_input_specs(),
            outputs: model_output_specs(),
            calibration,
            graph,
        };
        artifact.validate()?;
        Ok(artifact)
    }

    pub fn validate(&self) -> Result<()> {
        if self.feature_layout_version != FEATURE_LAYOUT_VERSION {
            return Err(CoreError::InvalidArtifact(format!(
                "feature layout version {} is not supported (expected {})",
                self.feature_layout_version, FEATURE_LAYOUT_VERSION
            )));
        }
        if self.inputs != model_input_specs() || self.outputs != model_output_specs() {
            return Err(CoreError::InvalidArtifact(
                "declared tensors differ from the model contract".into(),
            ));
        }
        self.graph.validate()
    }

    pub fn num_users(&self) -> usize {
        self.graph.user_tower.embedding.rows
    }

    pub fn num_items(&self) -> usize {
        self.graph.item_tower.embedding.rows
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let payload = bincode::serialize(self)?;
        let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
        bytes.extend_from_slice(ARTIFACT_MAGIC);
        bytes.extend_from_slice(&ARTIFACT_FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN || &bytes[..4] != ARTIFACT_MAGIC {
            return Err(CoreError::InvalidArtifact("missing MKRT header".into()));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != ARTIFACT_FORMAT_VERSION {
            return Err(CoreError::InvalidArtifact(format!(
                "unsupported artifact format version {}",
                version
            )));
        }

        let artifact: Self = bincode::deserialize(&bytes[HEADER_LEN..])?;
        artifact.validate()?;
        Ok(artifact)
    }

    /// BLAKE3 hex digest of the serialized artifact.
    pub fn digest(&self) -> Result<String> {
        Ok(blake3_hex(&self.to_bytes()?))
    }

    /// Write the artifact and its hash file into `dir`; returns the digest.
    pub fn save(&self, dir: &Path) -> Result<String> {
        let bytes = self.to_bytes()?;
        let digest = blake3_hex(&bytes);
        fs::write(dir.join(ARTIFACT_FILE), &bytes)?;
        fs::write(dir.join(HASH_FILE), &digest)?;
        info!(
            "Saved inference artifact ({} bytes, hash {})",
            bytes.len(),
            digest
        );
        Ok(digest)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        debug!("Loaded {} artifact bytes from {}", bytes.len(), path.display());
        Self::from_bytes(&bytes)
    }

    /// Load and check the file digest against `expected_hash`.
    pub fn load_verified(path: &Path, expected_hash: &str) -> Result<Self> {
        let bytes = fs::read(path)?;
        let actual = blake3_hex(&bytes);
        let expected = expected_hash.trim();
        if actual != expected {
            return Err(CoreError::HashMismatch {
                expected: expected.to_string(),
                actual,
            });
        }
        Self::from_bytes(&bytes)
    }

    /// Run the model on named inputs.
    pub fn predict(&self, inputs: &NamedInputs) -> Result<Prediction> {
        for spec in &self.inputs {
            resolve_input(inputs, spec)?;
        }

        let user_index = index_input(inputs, USER_ID_INPUT, self.num_users())?;
        let item_index = index_input(inputs, ITEM_ID_INPUT, self.num_items())?;
        let user_features = feature_input(inputs, USER_FEATURES_INPUT)?;
        let item_features = feature_input(inputs, ITEM_FEATURES_INPUT)?;

        let rating = self
            .graph
            .forward(user_index, item_index, user_features, item_features)?;
        let in_range = (MIN_RATING..=MAX_RATING).contains(&rating);
        if !in_range {
            warn!(
                "Predicted rating {:.3} outside [{}, {}] for user row {} item row {}",
                rating, MIN_RATING, MAX_RATING, user_index, item_index
            );
        }

        Ok(Prediction { rating, in_range })
    }
}

fn resolve_input<'a>(inputs: &'a NamedInputs, spec: &TensorSpec) -> Result<&'a Tensor> {
    let tensor = inputs
        .get(&spec.name)
        .ok_or_else(|| CoreError::MissingInput(spec.name.clone()))?;

    if tensor.dtype() != spec.dtype {
        return Err(CoreError::DtypeMismatch {
            name: spec.name.clone(),
            expected: spec.dtype.to_string(),
            actual: tensor.dtype().to_string(),
        });
    }
    if tensor.shape() != spec.shape.as_slice() {
        return Err(CoreError::ShapeMismatch {
            name: spec.name.clone(),
            expected: spec.shape.clone(),
            actual: tensor.shape().to_vec(),
        });
    }
    Ok(tensor)
}

fn index_input(inputs: &NamedInputs, name: &str, size: usize) -> Result<i64> {
    let value = inputs
        .get(name)
        .and_then(Tensor::as_i32)
        .and_then(|v| v.first().copied())
        .ok_or_else(|| CoreError::MissingInput(name.to_string()))? as i64;

    if value < 0 || value as usize >= size {
        return Err(CoreError::IndexOutOfRange {
            name: name.to_string(),
            index: value,
            size,
        });
    }
    Ok(value)
}

fn feature_input<'a>(inputs: &'a NamedInputs, name: &str) -> Result<&'a [f32]> {
    inputs
        .get(name)
        .and_then(Tensor::as_f32)
        .ok_or_else(|| CoreError::DtypeMismatch {
            name: name.to_string(),
            expected: DType::Float32.to_string(),
            actual: DType::Int32.to_string(),
        })
}
