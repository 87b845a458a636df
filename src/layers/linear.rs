use rand::Rng;

use super::layer::Layer;
use super::param::Param;
use crate::error::{Error, Result};
use crate::math::Matrix;
use crate::rng::rng_from_env;

// Fully connected layer `y = x W + b`. The last input seen during training is
// kept so the backward pass can form the weight gradient.

pub struct Linear {
    pub w: Param,
    pub b: Param,
    last_x: Matrix,
}

/// Glorot/Xavier uniform initialisation for a `fan_in x fan_out` matrix.
pub(crate) fn glorot_uniform(fan_in: usize, fan_out: usize) -> Matrix {
    let limit = (6.0 / (fan_in + fan_out) as f32).sqrt();
    let mut rng = rng_from_env();
    let data = (0..fan_in * fan_out)
        .map(|_| rng.gen_range(-limit..limit))
        .collect();
    Matrix::from_vec(fan_in, fan_out, data)
}

impl Linear {
    pub fn new(in_dim: usize, out_dim: usize) -> Self {
        Self {
            w: Param::new(glorot_uniform(in_dim, out_dim)),
            b: Param::new(Matrix::zeros(1, out_dim)),
            last_x: Matrix::zeros(0, 0),
        }
    }

    pub fn in_dim(&self) -> usize {
        self.w.value.rows
    }

    pub fn out_dim(&self) -> usize {
        self.w.value.cols
    }
}

impl Layer for Linear {
    fn name(&self) -> &'static str {
        "dense"
    }

    fn output_dim(&self, input_dim: usize) -> Result<usize> {
        if input_dim != self.in_dim() {
            return Err(Error::Shape {
                context: "dense input",
                expected: self.in_dim(),
                actual: input_dim,
            });
        }
        Ok(self.out_dim())
    }

    fn forward(&self, x: &Matrix) -> Matrix {
        let mut out = Matrix::matmul(x, &self.w.value);
        out.add_row_vector(&self.b.value.data);
        out
    }

    fn forward_train(&mut self, x: &Matrix) -> Matrix {
        self.last_x = x.clone();
        self.forward(x)
    }

    fn backward(&mut self, grad_out: &Matrix) -> Matrix {
        let grad_w = Matrix::matmul(&self.last_x.transpose(), grad_out);
        self.w.accumulate(&grad_w.data);
        self.b.accumulate(&grad_out.sum_rows());
        Matrix::matmul(grad_out, &self.w.value.transpose())
    }

    fn params(&self) -> Vec<&Param> {
        vec![&self.w, &self.b]
    }

    fn params_mut(&mut self) -> Vec<&mut Param> {
        vec![&mut self.w, &mut self.b]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_adds_bias() {
        let mut l = Linear::new(2, 1);
        l.w.value = Matrix::from_vec(2, 1, vec![1.0, 2.0]);
        l.b.value = Matrix::from_vec(1, 1, vec![0.5]);
        let y = l.forward(&Matrix::from_vec(1, 2, vec![3.0, 4.0]));
        assert_eq!(y.data, vec![11.5]);
    }

    #[test]
    fn backward_gradients() {
        let mut l = Linear::new(2, 1);
        l.w.value = Matrix::from_vec(2, 1, vec![1.0, 2.0]);
        let x = Matrix::from_vec(2, 2, vec![1.0, 0.0, 0.0, 1.0]);
        l.forward_train(&x);
        let gx = l.backward(&Matrix::from_vec(2, 1, vec![1.0, 1.0]));
        assert_eq!(l.w.grad, vec![1.0, 1.0]);
        assert_eq!(l.b.grad, vec![2.0]);
        assert_eq!(gx.data, vec![1.0, 2.0, 1.0, 2.0]);
    }

    #[test]
    fn rejects_wrong_input_width() {
        let l = Linear::new(4, 2);
        assert!(matches!(l.output_dim(3), Err(Error::Shape { .. })));
    }
}
