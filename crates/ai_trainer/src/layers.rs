//! Dense, batch-normalization and dropout layers with explicit gradients,
//! plus the Adam optimizer.
//!
//! Every parameter is a 2-D array; bias-like vectors are stored as `[1, n]`
//! rows so they broadcast over a batch and share one optimizer code path.

use ndarray::{Array1, Array2, Axis, Zip};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Kernel `[inputs, outputs]` and bias `[1, outputs]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseWeights {
    pub kernel: Array2<f32>,
    pub bias: Array2<f32>,
}

impl DenseWeights {
    /// Glorot-uniform kernel, zero bias.
    pub fn glorot(inputs: usize, outputs: usize, rng: &mut StdRng) -> Self {
        let limit = (6.0 / (inputs + outputs) as f32).sqrt();
        Self {
            kernel: Array2::from_shape_fn((inputs, outputs), |_| rng.gen_range(-limit..limit)),
            bias: Array2::zeros((1, outputs)),
        }
    }

    pub fn zeros_like(&self) -> Self {
        Self {
            kernel: Array2::zeros(self.kernel.raw_dim()),
            bias: Array2::zeros(self.bias.raw_dim()),
        }
    }

    pub fn inputs(&self) -> usize {
        self.kernel.nrows()
    }

    pub fn outputs(&self) -> usize {
        self.kernel.ncols()
    }

    pub fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        x.dot(&self.kernel) + &self.bias
    }

    /// Gradients for kernel and bias given the layer input and `dz`;
    /// returns them with the gradient w.r.t. the input.
    pub fn backward(&self, input: &Array2<f32>, dz: &Array2<f32>) -> (DenseWeights, Array2<f32>) {
        let grads = DenseWeights {
            kernel: input.t().dot(dz),
            bias: dz.sum_axis(Axis(0)).insert_axis(Axis(0)),
        };
        let dx = dz.dot(&self.kernel.t());
        (grads, dx)
    }
}

/// Learned scale/shift plus running statistics, all `[1, channels]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchNormWeights {
    pub gamma: Array2<f32>,
    pub beta: Array2<f32>,
    pub moving_mean: Array2<f32>,
    pub moving_var: Array2<f32>,
}

/// Values kept from the training forward pass for the backward pass
#[derive(Debug, Clone)]
pub struct BatchNormCache {
    xhat: Array2<f32>,
    inv_std: Array1<f32>,
}

impl BatchNormWeights {
    pub fn new(channels: usize) -> Self {
        Self {
            gamma: Array2::ones((1, channels)),
            beta: Array2::zeros((1, channels)),
            moving_mean: Array2::zeros((1, channels)),
            moving_var: Array2::ones((1, channels)),
        }
    }

    pub fn zeros_like(&self) -> Self {
        let dim = self.gamma.raw_dim();
        Self {
            gamma: Array2::zeros(dim),
            beta: Array2::zeros(dim),
            moving_mean: Array2::zeros(dim),
            moving_var: Array2::zeros(dim),
        }
    }

    pub fn channels(&self) -> usize {
        self.gamma.ncols()
    }

    /// Normalize with batch statistics and update the running averages.
    pub fn forward_train(
        &mut self,
        x: &Array2<f32>,
        momentum: f32,
        epsilon: f32,
    ) -> (Array2<f32>, BatchNormCache) {
        let channels = x.ncols();
        let mean = x
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(channels));
        let centered = x - &mean;
        let var = centered
            .mapv(|v| v * v)
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(channels));
        let inv_std = var.mapv(|v| 1.0 / (v + epsilon).sqrt());
        let xhat = &centered * &inv_std;
        let y = &xhat * &self.gamma + &self.beta;

        let mean_row = mean.insert_axis(Axis(0));
        let var_row = var.insert_axis(Axis(0));
        self.moving_mean = &self.moving_mean * momentum + &mean_row * (1.0 - momentum);
        self.moving_var = &self.moving_var * momentum + &var_row * (1.0 - momentum);

        (y, BatchNormCache { xhat, inv_std })
    }

    /// Normalize with the running statistics.
    pub fn forward_infer(&self, x: &Array2<f32>, epsilon: f32) -> Array2<f32> {
        let inv_std = self.moving_var.mapv(|v| 1.0 / (v + epsilon).sqrt());
        (x - &self.moving_mean) * &inv_std * &self.gamma + &self.beta
    }

    /// Returns `(dgamma, dbeta)` as a zeroed-stat `BatchNormWeights`, and `dx`.
    pub fn backward(&self, cache: &BatchNormCache, dy: &Array2<f32>) -> (BatchNormWeights, Array2<f32>) {
        let n = dy.nrows() as f32;
        let dxhat = dy * &self.gamma;

        let mut grads = self.zeros_like();
        grads.gamma = (dy * &cache.xhat).sum_axis(Axis(0)).insert_axis(Axis(0));
        grads.beta = dy.sum_axis(Axis(0)).insert_axis(Axis(0));

        let sum_dxhat = dxhat.sum_axis(Axis(0));
        let sum_dxhat_xhat = (&dxhat * &cache.xhat).sum_axis(Axis(0));
        let dx = (&dxhat * n - &sum_dxhat - &cache.xhat * &sum_dxhat_xhat) * &cache.inv_std / n;

        (grads, dx)
    }
}

pub fn relu(z: &Array2<f32>) -> Array2<f32> {
    z.mapv(|v| v.max(0.0))
}

/// `da` masked by the sign of the pre-activation `z`.
pub fn relu_backward(z: &Array2<f32>, da: &Array2<f32>) -> Array2<f32> {
    let mut dz = da.clone();
    Zip::from(&mut dz).and(z).for_each(|d, &v| {
        if v <= 0.0 {
            *d = 0.0;
        }
    });
    dz
}

pub fn sigmoid(z: &Array2<f32>) -> Array2<f32> {
    z.mapv(|v| 1.0 / (1.0 + (-v).exp()))
}

/// Inverted dropout mask: kept units are scaled by `1 / (1 - rate)`.
pub fn dropout_mask(rows: usize, cols: usize, rate: f32, rng: &mut StdRng) -> Array2<f32> {
    let keep = 1.0 / (1.0 - rate);
    Array2::from_shape_fn((rows, cols), |_| {
        if rng.gen::<f32>() < rate {
            0.0
        } else {
            keep
        }
    })
}

/// Embedding table drawn from U(-0.05, 0.05).
pub fn uniform_embedding(rows: usize, dim: usize, rng: &mut StdRng) -> Array2<f32> {
    Array2::from_shape_fn((rows, dim), |_| rng.gen_range(-0.05..0.05))
}

/// Adam with bias-corrected step size
#[derive(Debug, Clone)]
pub struct Adam {
    pub learning_rate: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    step: i32,
    m: Vec<Array2<f32>>,
    v: Vec<Array2<f32>>,
}

impl Adam {
    pub fn new(learning_rate: f32) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            step: 0,
            m: Vec::new(),
            v: Vec::new(),
        }
    }

    pub fn iterations(&self) -> i32 {
        self.step
    }

    /// Apply one update. `params` and `grads` must be in the same order on
    /// every call.
    pub fn apply(&mut self, params: Vec<&mut Array2<f32>>, grads: Vec<&Array2<f32>>) {
        if self.m.len() != params.len() {
            self.m = params.iter().map(|p| Array2::zeros(p.raw_dim())).collect();
            self.v = params.iter().map(|p| Array2::zeros(p.raw_dim())).collect();
        }

        self.step += 1;
        let correction1 = 1.0 - self.beta1.powi(self.step);
        let correction2 = 1.0 - self.beta2.powi(self.step);
        let step_size = self.learning_rate * correction2.sqrt() / correction1;
        let (beta1, beta2, epsilon) = (self.beta1, self.beta2, self.epsilon);

        for ((param, grad), (m, v)) in params
            .into_iter()
            .zip(grads)
            .zip(self.m.iter_mut().zip(self.v.iter_mut()))
        {
            Zip::from(param)
                .and(grad)
                .and(m)
                .and(v)
                .for_each(|p, &g, m, v| {
                    *m = beta1 * *m + (1.0 - beta1) * g;
                    *v = beta2 * *v + (1.0 - beta2) * g * g;
                    *p -= step_size * *m / (v.sqrt() + epsilon);
                });
        }
    }
}
