use super::layer::Layer;
use super::param::Param;
use crate::error::{Error, Result};
use crate::math::Matrix;

/// Batch normalization over the feature axis with learnable scale (`gamma`)
/// and shift (`beta`).
///
/// Training normalises with the batch statistics and folds them into the
/// moving averages; evaluation and serving use the moving averages.
pub struct BatchNorm {
    pub gamma: Param,
    pub beta: Param,
    pub moving_mean: Param,
    pub moving_var: Param,
    eps: f32,
    momentum: f32,
    x_hat: Matrix,
    var: Vec<f32>,
}

impl BatchNorm {
    /// Defaults match the usual Keras/TF layer: `momentum = 0.99`, `eps = 1e-3`.
    pub fn new(dim: usize) -> Self {
        Self::with_params(dim, 1e-3, 0.99)
    }

    pub fn with_params(dim: usize, eps: f32, momentum: f32) -> Self {
        Self {
            gamma: Param::new(Matrix::from_vec(1, dim, vec![1.0; dim])),
            beta: Param::new(Matrix::zeros(1, dim)),
            moving_mean: Param::frozen(Matrix::zeros(1, dim)),
            moving_var: Param::frozen(Matrix::from_vec(1, dim, vec![1.0; dim])),
            eps,
            momentum,
            x_hat: Matrix::zeros(0, 0),
            var: vec![1.0; dim],
        }
    }

    fn dim(&self) -> usize {
        self.gamma.len()
    }
}

impl Layer for BatchNorm {
    fn name(&self) -> &'static str {
        "batch_norm"
    }

    fn output_dim(&self, input_dim: usize) -> Result<usize> {
        if input_dim != self.dim() {
            return Err(Error::Shape {
                context: "batch_norm input",
                expected: self.dim(),
                actual: input_dim,
            });
        }
        Ok(input_dim)
    }

    fn forward(&self, x: &Matrix) -> Matrix {
        let cols = x.cols;
        let mut out = Matrix::zeros(x.rows, cols);
        let mean = &self.moving_mean.value.data;
        let var = &self.moving_var.value.data;
        for r in 0..x.rows {
            for c in 0..cols {
                let idx = r * cols + c;
                let x_hat = (x.data[idx] - mean[c]) / (var[c] + self.eps).sqrt();
                out.data[idx] = self.gamma.value.data[c] * x_hat + self.beta.value.data[c];
            }
        }
        out
    }

    fn forward_train(&mut self, x: &Matrix) -> Matrix {
        let rows = x.rows;
        let cols = x.cols;
        let n = rows.max(1) as f32;
        let mut mean = vec![0.0; cols];
        self.var = vec![0.0; cols];
        for c in 0..cols {
            let mut sum = 0.0;
            for r in 0..rows {
                sum += x.data[r * cols + c];
            }
            let m = sum / n;
            mean[c] = m;
            let mut var_sum = 0.0;
            for r in 0..rows {
                let d = x.data[r * cols + c] - m;
                var_sum += d * d;
            }
            let v = var_sum / n;
            self.var[c] = v;
            let mm = &mut self.moving_mean.value.data[c];
            *mm = self.momentum * *mm + (1.0 - self.momentum) * m;
            let mv = &mut self.moving_var.value.data[c];
            *mv = self.momentum * *mv + (1.0 - self.momentum) * v;
        }
        self.x_hat = Matrix::zeros(rows, cols);
        let mut out = Matrix::zeros(rows, cols);
        for r in 0..rows {
            for c in 0..cols {
                let idx = r * cols + c;
                let x_hat = (x.data[idx] - mean[c]) / (self.var[c] + self.eps).sqrt();
                self.x_hat.data[idx] = x_hat;
                out.data[idx] = self.gamma.value.data[c] * x_hat + self.beta.value.data[c];
            }
        }
        out
    }

    fn backward(&mut self, grad_out: &Matrix) -> Matrix {
        let rows = grad_out.rows;
        let cols = grad_out.cols;
        let n = rows.max(1) as f32;
        let mut grad_input = Matrix::zeros(rows, cols);
        let mut d_gamma = vec![0.0; cols];
        let mut d_beta = vec![0.0; cols];
        for c in 0..cols {
            let gamma = self.gamma.value.data[c];
            let mut sum_dxhat = 0.0;
            let mut sum_dxhat_xhat = 0.0;
            for r in 0..rows {
                let idx = r * cols + c;
                let dy = grad_out.data[idx];
                d_beta[c] += dy;
                d_gamma[c] += dy * self.x_hat.data[idx];
                let dxhat = dy * gamma;
                sum_dxhat += dxhat;
                sum_dxhat_xhat += dxhat * self.x_hat.data[idx];
            }
            let inv_std = 1.0 / (self.var[c] + self.eps).sqrt();
            for r in 0..rows {
                let idx = r * cols + c;
                let dxhat = grad_out.data[idx] * gamma;
                grad_input.data[idx] =
                    (dxhat * n - sum_dxhat - self.x_hat.data[idx] * sum_dxhat_xhat) * inv_std / n;
            }
        }
        self.gamma.accumulate(&d_gamma);
        self.beta.accumulate(&d_beta);
        grad_input
    }

    fn params(&self) -> Vec<&Param> {
        vec![&self.gamma, &self.beta, &self.moving_mean, &self.moving_var]
    }

    fn params_mut(&mut self) -> Vec<&mut Param> {
        vec![
            &mut self.gamma,
            &mut self.beta,
            &mut self.moving_mean,
            &mut self.moving_var,
        ]
    }
}
