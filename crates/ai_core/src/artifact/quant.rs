//! Int8 quantized building blocks
//!
//! Weights are symmetric int8 (per output channel for dense layers, per row
//! for embedding tables). Dense inputs are asymmetric int8 with parameters
//! taken from calibration ranges; products accumulate in i32 and are
//! dequantized once per output channel.

use serde::{Deserialize, Serialize};

use crate::errors::{CoreError, Result};

const QMIN: i32 = -128;
const QMAX: i32 = 127;
const WEIGHT_QMAX: f32 = 127.0;

/// Affine int8 parameters: `real = scale * (q - zero_point)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantParams {
    pub scale: f32,
    pub zero_point: i32,
}

impl QuantParams {
    /// Parameters covering `[min, max]` widened to include zero.
    pub fn from_range(min: f32, max: f32) -> Self {
        let lo = if min.is_finite() { min.min(0.0) } else { 0.0 };
        let hi = if max.is_finite() { max.max(0.0) } else { 0.0 };
        let span = hi - lo;
        if span <= f32::EPSILON {
            return Self {
                scale: 1.0,
                zero_point: 0,
            };
        }

        let scale = span / (QMAX - QMIN) as f32;
        let zero_point = (QMIN as f32 - lo / scale).round().clamp(QMIN as f32, QMAX as f32) as i32;
        Self { scale, zero_point }
    }

    pub fn quantize(&self, value: f32) -> i8 {
        let q = (value / self.scale).round() as i32 + self.zero_point;
        q.clamp(QMIN, QMAX) as i8
    }

    pub fn dequantize(&self, q: i8) -> f32 {
        self.scale * (q as i32 - self.zero_point) as f32
    }
}

fn symmetric_scale(values: impl Iterator<Item = f32>) -> f32 {
    let max_abs = values.fold(0.0f32, |acc, v| acc.max(v.abs()));
    if max_abs <= f32::EPSILON {
        1.0
    } else {
        max_abs / WEIGHT_QMAX
    }
}

fn quantize_symmetric(value: f32, scale: f32) -> i8 {
    (value / scale).round().clamp(-WEIGHT_QMAX, WEIGHT_QMAX) as i8
}

/// Elementwise nonlinearity applied after a dense layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    Linear,
    Relu,
    Sigmoid,
}

impl Activation {
    pub fn apply(&self, x: f32) -> f32 {
        match self {
            Activation::Linear => x,
            Activation::Relu => x.max(0.0),
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
        }
    }
}

/// Dense layer with int8 weights stored output-major (`[outputs][inputs]`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizedDense {
    pub name: String,
    pub inputs: usize,
    pub outputs: usize,
    pub weights: Vec<i8>,
    pub weight_scales: Vec<f32>,
    pub bias: Vec<f32>,
    pub input_quant: QuantParams,
    pub activation: Activation,
}

impl QuantizedDense {
    /// Quantize float weights laid out input-major (`[inputs][outputs]`).
    pub fn from_float(
        name: &str,
        weights: &[f32],
        bias: &[f32],
        inputs: usize,
        outputs: usize,
        input_range: (f32, f32),
        activation: Activation,
    ) -> Result<Self> {
        if weights.len() != inputs * outputs || bias.len() != outputs {
            return Err(CoreError::InvalidParameters(format!(
                "{}: expected {}x{} weights and {} biases, got {} and {}",
                name,
                inputs,
                outputs,
                outputs,
                weights.len(),
                bias.len()
            )));
        }

        let mut quantized = Vec::with_capacity(inputs * outputs);
        let mut weight_scales = Vec::with_capacity(outputs);
        for o in 0..outputs {
            let column = (0..inputs).map(|i| weights[i * outputs + o]);
            let scale = symmetric_scale(column.clone());
            quantized.extend(column.map(|w| quantize_symmetric(w, scale)));
            weight_scales.push(scale);
        }

        Ok(Self {
            name: name.to_string(),
            inputs,
            outputs,
            weights: quantized,
            weight_scales,
            bias: bias.to_vec(),
            input_quant: QuantParams::from_range(input_range.0, input_range.1),
            activation,
        })
    }

    pub fn forward(&self, x: &[f32]) -> Result<Vec<f32>> {
        if x.len() != self.inputs {
            return Err(CoreError::ShapeMismatch {
                name: self.name.clone(),
                expected: vec![self.inputs],
                actual: vec![x.len()],
            });
        }

        let zero_point = self.input_quant.zero_point;
        let xq: Vec<i32> = x
            .iter()
            .map(|&v| self.input_quant.quantize(v) as i32 - zero_point)
            .collect();

        let out = self
            .weights
            .chunks_exact(self.inputs)
            .zip(self.weight_scales.iter().zip(&self.bias))
            .map(|(row, (w_scale, bias))| {
                let acc: i32 = row.iter().zip(&xq).map(|(&w, &q)| w as i32 * q).sum();
                let real = acc as f32 * self.input_quant.scale * w_scale + bias;
                self.activation.apply(real)
            })
            .collect();

        Ok(out)
    }

    pub fn validate(&self) -> Result<()> {
        if self.weights.len() != self.inputs * self.outputs
            || self.weight_scales.len() != self.outputs
            || self.bias.len() != self.outputs
            || self.input_quant.scale <= 0.0
        {
            return Err(CoreError::InvalidArtifact(format!(
                "dense layer '{}' is inconsistent",
                self.name
            )));
        }
        Ok(())
    }
}

/// Embedding table with one symmetric int8 scale per row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizedEmbedding {
    pub name: String,
    pub rows: usize,
    pub dim: usize,
    pub values: Vec<i8>,
    pub row_scales: Vec<f32>,
}

impl QuantizedEmbedding {
    /// Quantize a row-major `[rows][dim]` table.
    pub fn from_float(name: &str, table: &[f32], rows: usize, dim: usize) -> Result<Self> {
        if table.len() != rows * dim {
            return Err(CoreError::InvalidParameters(format!(
                "{}: expected {}x{} table, got {} values",
                name,
                rows,
                dim,
                table.len()
            )));
        }

        let mut values = Vec::with_capacity(rows * dim);
        let mut row_scales = Vec::with_capacity(rows);
        for row in table.chunks_exact(dim.max(1)) {
            let scale = symmetric_scale(row.iter().copied());
            values.extend(row.iter().map(|&w| quantize_symmetric(w, scale)));
            row_scales.push(scale);
        }

        Ok(Self {
            name: name.to_string(),
            rows,
            dim,
            values,
            row_scales,
        })
    }

    pub fn lookup(&self, index: i64) -> Result<Vec<f32>> {
        if index < 0 || index as usize >= self.rows {
            return Err(CoreError::IndexOutOfRange {
                name: self.name.clone(),
                index,
                size: self.rows,
            });
        }

        let row = index as usize;
        let scale = self.row_scales[row];
        Ok(self.values[row * self.dim..(row + 1) * self.dim]
            .iter()
            .map(|&q| q as f32 * scale)
            .collect())
    }

    pub fn validate(&self) -> Result<()> {
        if self.dim == 0
            || self.values.len() != self.rows * self.dim
            || self.row_scales.len() != self.rows
        {
            return Err(CoreError::InvalidArtifact(format!(
                "embedding table '{}' is inconsistent",
                self.name
            )));
        }
        Ok(())
    }
}

/// Per-channel `y = x * scale + shift`, used for folded normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelAffine {
    pub scale: Vec<f32>,
    pub shift: Vec<f32>,
}

impl ChannelAffine {
    /// Fold inference-time batch normalization into one affine map.
    pub fn from_batch_norm(gamma: &[f32], beta: &[f32], mean: &[f32], var: &[f32], epsilon: f32) -> Self {
        let scale: Vec<f32> = gamma
            .iter()
            .zip(var)
            .map(|(g, v)| g / (v + epsilon).sqrt())
            .collect();
        let shift = beta
            .iter()
            .zip(mean.iter().zip(&scale))
            .map(|(b, (m, s))| b - m * s)
            .collect();
        Self { scale, shift }
    }

    pub fn channels(&self) -> usize {
        self.scale.len()
    }

    pub fn apply(&self, x: &mut [f32]) {
        for (v, (s, b)) in x.iter_mut().zip(self.scale.iter().zip(&self.shift)) {
            *v = *v * s + b;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quant_params_cover_range() {
        let params = QuantParams::from_range(-1.0, 3.0);
        assert!(params.scale > 0.0);
        for &x in &[-1.0f32, 0.0, 1.5, 3.0] {
            let restored = params.dequantize(params.quantize(x));
            assert!((restored - x).abs() <= params.scale, "x={} restored={}", x, restored);
        }
        assert_eq!(params.dequantize(params.quantize(0.0)), 0.0);
    }

    #[test]
    fn test_degenerate_range() {
        let params = QuantParams::from_range(0.0, 0.0);
        assert_eq!(params.scale, 1.0);
        assert_eq!(params.zero_point, 0);
    }

    #[test]
    fn test_dense_matches_float_within_tolerance() {
        // y = [x0 + 2*x1, -x0 + 0.5*x1], input-major layout
        let weights = vec![1.0, -1.0, 2.0, 0.5];
        let bias = vec![0.1, -0.2];
        let layer =
            QuantizedDense::from_float("d", &weights, &bias, 2, 2, (-1.0, 1.0), Activation::Linear)
                .unwrap();

        let out = layer.forward(&[0.5, -0.25]).unwrap();
        assert!((out[0] - 0.1).abs() < 0.03);
        assert!((out[1] - (-0.825)).abs() < 0.03);
    }

    #[test]
    fn test_dense_rejects_wrong_width() {
        let layer = QuantizedDense::from_float("d", &[1.0, 1.0], &[0.0], 2, 1, (0.0, 1.0), Activation::Relu)
            .unwrap();
        assert!(matches!(
            layer.forward(&[1.0]),
            Err(CoreError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_embedding_lookup_bounds() {
        let table = vec![0.5, -0.5, 0.25, 1.0];
        let embedding = QuantizedEmbedding::from_float("e", &table, 2, 2).unwrap();

        let row = embedding.lookup(1).unwrap();
        assert!((row[0] - 0.25).abs() < 0.01);
        assert!((row[1] - 1.0).abs() < 0.01);
        assert!(matches!(
            embedding.lookup(2),
            Err(CoreError::IndexOutOfRange { .. })
        ));
        assert!(embedding.lookup(-1).is_err());
    }

    #[test]
    fn test_fold_batch_norm() {
        let affine = ChannelAffine::from_batch_norm(&[2.0], &[1.0], &[3.0], &[4.0], 0.0);
        let mut x = vec![5.0];
        affine.apply(&mut x);
        // 2 * (5 - 3) / 2 + 1
        assert!((x[0] - 3.0).abs() < 1e-6);
    }
}
