use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::math::Matrix;

/// A parameter tensor together with its gradient and Adam moment estimates.
///
/// Non-trainable parameters (batch-norm moving statistics) are skipped by the
/// optimizer but still saved in checkpoints and exports.
#[derive(Clone, Debug)]
pub struct Param {
    pub value: Matrix,
    pub grad: Vec<f32>,
    m: Vec<f32>,
    v: Vec<f32>,
    pub trainable: bool,
}

/// Serialised form of a [`Param`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ParamState {
    pub rows: usize,
    pub cols: usize,
    pub value: Vec<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub m: Vec<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub v: Vec<f32>,
}

impl Param {
    pub fn new(value: Matrix) -> Self {
        let n = value.data.len();
        Self {
            value,
            grad: vec![0.0; n],
            m: vec![0.0; n],
            v: vec![0.0; n],
            trainable: true,
        }
    }

    /// A parameter the optimizer never touches.
    pub fn frozen(value: Matrix) -> Self {
        Self {
            trainable: false,
            ..Self::new(value)
        }
    }

    pub fn len(&self) -> usize {
        self.value.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.data.is_empty()
    }

    pub fn zero_grad(&mut self) {
        self.grad.fill(0.0);
    }

    /// Add `g` into the accumulated gradient.
    pub fn accumulate(&mut self, g: &[f32]) {
        for (a, b) in self.grad.iter_mut().zip(g) {
            *a += b;
        }
    }

    /// Bias-corrected Adam update. `t` is the 1-based optimizer step.
    pub fn adam_step(&mut self, lr: f32, beta1: f32, beta2: f32, eps: f32, t: u64) {
        let t = t.min(i32::MAX as u64) as i32;
        let c1 = 1.0 - beta1.powi(t);
        let c2 = 1.0 - beta2.powi(t);
        for i in 0..self.grad.len() {
            let g = self.grad[i];
            self.m[i] = beta1 * self.m[i] + (1.0 - beta1) * g;
            self.v[i] = beta2 * self.v[i] + (1.0 - beta2) * g * g;
            let m_hat = self.m[i] / c1;
            let v_hat = self.v[i] / c2;
            self.value.data[i] -= lr * m_hat / (v_hat.sqrt() + eps);
        }
    }

    /// Snapshot the parameter. Optimizer moments are only kept when
    /// `with_slots` is set (checkpoints keep them, exports do not).
    pub fn to_state(&self, with_slots: bool) -> ParamState {
        let keep = with_slots && self.trainable;
        ParamState {
            rows: self.value.rows,
            cols: self.value.cols,
            value: self.value.data.clone(),
            m: if keep { self.m.clone() } else { Vec::new() },
            v: if keep { self.v.clone() } else { Vec::new() },
        }
    }

    /// Restore from a snapshot. `index` is this parameter's position in its
    /// network and only feeds the error.
    pub fn load_state(&mut self, index: usize, state: &ParamState) -> Result<()> {
        if state.rows != self.value.rows || state.cols != self.value.cols {
            return Err(Error::ParamShape {
                index,
                expected: (self.value.rows, self.value.cols),
                found: (state.rows, state.cols),
            });
        }
        if state.value.len() != self.len() {
            return Err(Error::Shape {
                context: "parameter values",
                expected: self.len(),
                actual: state.value.len(),
            });
        }
        self.value.data.copy_from_slice(&state.value);
        let n = self.len();
        if state.m.len() == n && state.v.len() == n {
            self.m.copy_from_slice(&state.m);
            self.v.copy_from_slice(&state.v);
        } else {
            self.m.fill(0.0);
            self.v.fill(0.0);
        }
        self.zero_grad();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adam_moves_against_gradient() {
        let mut p = Param::new(Matrix::from_vec(1, 2, vec![1.0, -1.0]));
        p.grad = vec![0.5, -0.5];
        p.adam_step(0.1, 0.9, 0.999, 1e-8, 1);
        // first bias-corrected step has magnitude ~lr
        assert!((p.value.data[0] - 0.9).abs() < 1e-4);
        assert!((p.value.data[1] + 0.9).abs() < 1e-4);
    }

    #[test]
    fn state_round_trip_rejects_wrong_shape() {
        let p = Param::new(Matrix::from_vec(2, 1, vec![3.0, 4.0]));
        let mut q = Param::new(Matrix::zeros(2, 1));
        q.load_state(0, &p.to_state(true)).unwrap();
        assert_eq!(q.value.data, vec![3.0, 4.0]);

        let mut r = Param::new(Matrix::zeros(1, 2));
        let err = r.load_state(3, &p.to_state(false)).unwrap_err();
        assert!(matches!(
            err,
            Error::ParamShape {
                index: 3,
                expected: (1, 2),
                found: (2, 1)
            }
        ));

        let mut truncated = p.to_state(false);
        truncated.value.pop();
        assert!(matches!(
            q.load_state(0, &truncated),
            Err(Error::Shape { actual: 1, .. })
        ));
    }

    #[test]
    fn frozen_params_drop_slots() {
        let p = Param::frozen(Matrix::zeros(1, 3));
        let s = p.to_state(true);
        assert!(s.m.is_empty() && s.v.is_empty());
    }
}
