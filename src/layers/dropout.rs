use rand::rngs::StdRng;
use rand::Rng;

use super::layer::Layer;
use crate::error::Result;
use crate::math::Matrix;
use crate::rng::rng_from_env;

/// Dropout layer that randomly zeros elements during training.
///
/// Each element is dropped with probability `rate`; kept elements are scaled
/// by `1/(1 - rate)` so the expected activation is unchanged ("inverted"
/// dropout). Evaluation and serving pass the input through untouched.
pub struct Dropout {
    rate: f32,
    mask: Vec<f32>,
    rng: StdRng,
}

impl Dropout {
    pub fn new(rate: f32) -> Self {
        Self {
            rate: rate.clamp(0.0, 1.0),
            mask: Vec::new(),
            rng: rng_from_env(),
        }
    }
}

impl Layer for Dropout {
    fn name(&self) -> &'static str {
        "dropout"
    }

    fn output_dim(&self, input_dim: usize) -> Result<usize> {
        Ok(input_dim)
    }

    fn forward(&self, x: &Matrix) -> Matrix {
        x.clone()
    }

    fn forward_train(&mut self, x: &Matrix) -> Matrix {
        let p = self.rate;
        let scale = if p < 1.0 { 1.0 / (1.0 - p) } else { 0.0 };
        let mut out = Matrix::zeros(x.rows, x.cols);
        self.mask = vec![0.0; x.data.len()];
        for i in 0..x.data.len() {
            if p > 0.0 && self.rng.gen::<f32>() < p {
                continue;
            }
            self.mask[i] = scale;
            out.data[i] = x.data[i] * scale;
        }
        out
    }

    fn backward(&mut self, grad_out: &Matrix) -> Matrix {
        let mut grad = grad_out.clone();
        for (g, &m) in grad.data.iter_mut().zip(self.mask.iter()) {
            *g *= m;
        }
        grad
    }
}
