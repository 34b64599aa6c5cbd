//! Named tensors exchanged with the inference engine

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::{CoreError, Result};
use crate::features::{ITEM_FEATURE_DIM, USER_FEATURE_DIM};

pub const USER_ID_INPUT: &str = "user_id";
pub const ITEM_ID_INPUT: &str = "item_id";
pub const USER_FEATURES_INPUT: &str = "user_features";
pub const ITEM_FEATURES_INPUT: &str = "item_features";
pub const RATING_OUTPUT: &str = "rating";

/// Element type of a tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Int32,
    Float32,
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::Int32 => f.write_str("int32"),
            DType::Float32 => f.write_str("float32"),
        }
    }
}

/// Declared name, dtype and shape of a model input or output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorSpec {
    pub name: String,
    pub dtype: DType,
    pub shape: Vec<usize>,
}

impl TensorSpec {
    pub fn new(name: &str, dtype: DType, shape: &[usize]) -> Self {
        Self {
            name: name.to_string(),
            dtype,
            shape: shape.to_vec(),
        }
    }
}

/// The four inputs of the rating model, sorted by name.
pub fn model_input_specs() -> Vec<TensorSpec> {
    let mut specs = vec![
        TensorSpec::new(USER_ID_INPUT, DType::Int32, &[1]),
        TensorSpec::new(ITEM_ID_INPUT, DType::Int32, &[1]),
        TensorSpec::new(USER_FEATURES_INPUT, DType::Float32, &[1, USER_FEATURE_DIM]),
        TensorSpec::new(ITEM_FEATURES_INPUT, DType::Float32, &[1, ITEM_FEATURE_DIM]),
    ];
    specs.sort_by(|a, b| a.name.cmp(&b.name));
    specs
}

pub fn model_output_specs() -> Vec<TensorSpec> {
    vec![TensorSpec::new(RATING_OUTPUT, DType::Float32, &[1, 1])]
}

/// Flat tensor storage
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    Int32(Vec<i32>),
    Float32(Vec<f32>),
}

/// A dense row-major tensor
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: TensorData,
}

impl Tensor {
    fn checked(name: &str, shape: Vec<usize>, data: TensorData, len: usize) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != len {
            return Err(CoreError::ShapeMismatch {
                name: name.to_string(),
                expected: shape,
                actual: vec![len],
            });
        }
        Ok(Self { shape, data })
    }

    pub fn int32(shape: Vec<usize>, values: Vec<i32>) -> Result<Self> {
        let len = values.len();
        Self::checked("int32", shape, TensorData::Int32(values), len)
    }

    pub fn float32(shape: Vec<usize>, values: Vec<f32>) -> Result<Self> {
        let len = values.len();
        Self::checked("float32", shape, TensorData::Float32(values), len)
    }

    /// `int32[1]` holding one embedding row index.
    pub fn index(value: i32) -> Self {
        Self {
            shape: vec![1],
            data: TensorData::Int32(vec![value]),
        }
    }

    /// `float32[1, n]` holding one feature row.
    pub fn row(values: &[f32]) -> Self {
        Self {
            shape: vec![1, values.len()],
            data: TensorData::Float32(values.to_vec()),
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    pub fn dtype(&self) -> DType {
        match self.data {
            TensorData::Int32(_) => DType::Int32,
            TensorData::Float32(_) => DType::Float32,
        }
    }

    pub fn as_i32(&self) -> Option<&[i32]> {
        match &self.data {
            TensorData::Int32(v) => Some(v),
            TensorData::Float32(_) => None,
        }
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match &self.data {
            TensorData::Float32(v) => Some(v),
            TensorData::Int32(_) => None,
        }
    }
}

/// Inputs keyed by tensor name; position carries no meaning.
pub type NamedInputs = BTreeMap<String, Tensor>;

/// Build the four named inputs for one (user, item) pair.
pub fn named_inputs(
    user_index: i32,
    item_index: i32,
    user_features: &[f32],
    item_features: &[f32],
) -> NamedInputs {
    let mut inputs = NamedInputs::new();
    inputs.insert(USER_ID_INPUT.to_string(), Tensor::index(user_index));
    inputs.insert(ITEM_ID_INPUT.to_string(), Tensor::index(item_index));
    inputs.insert(USER_FEATURES_INPUT.to_string(), Tensor::row(user_features));
    inputs.insert(ITEM_FEATURES_INPUT.to_string(), Tensor::row(item_features));
    inputs
}
