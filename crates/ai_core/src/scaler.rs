//! Per-feature standardization
//!
//! `(x - mean) / scale` column-wise, with population statistics computed in
//! f64. Columns with zero variance get a scale of 1 so constant features map
//! to 0 instead of dividing by zero.

use serde::{Deserialize, Serialize};

use crate::errors::{CoreError, Result};

/// Standard deviations below this are treated as zero
const MIN_SCALE: f64 = 10.0 * f64::EPSILON;

/// Fitted standardization parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
    pub var: Vec<f64>,
    pub n_samples_seen: usize,
}

impl FeatureScaler {
    /// Fit on a population of equally sized rows.
    pub fn fit<R: AsRef<[f32]>>(rows: &[R]) -> Result<Self> {
        let first = rows
            .first()
            .ok_or_else(|| CoreError::InvalidParameters("cannot fit scaler on zero rows".into()))?;
        let n_features = first.as_ref().len();
        if n_features == 0 {
            return Err(CoreError::InvalidParameters(
                "cannot fit scaler on zero-width rows".into(),
            ));
        }

        let mut sum = vec![0.0f64; n_features];
        for row in rows {
            let row = row.as_ref();
            if row.len() != n_features {
                return Err(CoreError::ShapeMismatch {
                    name: "scaler_fit".into(),
                    expected: vec![n_features],
                    actual: vec![row.len()],
                });
            }
            for (acc, &v) in sum.iter_mut().zip(row) {
                *acc += v as f64;
            }
        }

        let n = rows.len() as f64;
        let mean: Vec<f64> = sum.into_iter().map(|s| s / n).collect();

        let mut var = vec![0.0f64; n_features];
        for row in rows {
            for ((acc, &v), m) in var.iter_mut().zip(row.as_ref()).zip(&mean) {
                let diff = v as f64 - m;
                *acc += diff * diff;
            }
        }
        for v in &mut var {
            *v /= n;
        }

        let scale = var
            .iter()
            .map(|v| {
                let std = v.sqrt();
                if std < MIN_SCALE {
                    1.0
                } else {
                    std
                }
            })
            .collect();

        Ok(Self {
            mean,
            scale,
            var,
            n_samples_seen: rows.len(),
        })
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    /// Standardize one row.
    pub fn transform(&self, row: &[f32]) -> Result<Vec<f32>> {
        if row.len() != self.n_features() {
            return Err(CoreError::ShapeMismatch {
                name: "scaler_transform".into(),
                expected: vec![self.n_features()],
                actual: vec![row.len()],
            });
        }

        Ok(row
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(&x, (m, s))| ((x as f64 - m) / s) as f32)
            .collect())
    }

    /// Check the fitted parameters are usable.
    pub fn validate(&self, expected_features: usize) -> Result<()> {
        if self.n_features() != expected_features
            || self.scale.len() != expected_features
            || self.var.len() != expected_features
        {
            return Err(CoreError::InvalidArtifact(format!(
                "scaler has {} features, expected {}",
                self.n_features(),
                expected_features
            )));
        }
        if self.scale.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(CoreError::InvalidArtifact(
                "scaler contains a non-positive scale".into(),
            ));
        }
        Ok(())
    }
}
