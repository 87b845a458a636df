use serde::{Deserialize, Serialize};

use crate::layers::Param;

/// Adam optimizer. Moment estimates live on each [`Param`]; the optimizer
/// itself only tracks the hyperparameters and the step counter.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Adam {
    pub lr: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub eps: f32,
    pub t: u64,
}

impl Adam {
    pub fn new(lr: f32, beta1: f32, beta2: f32, eps: f32) -> Self {
        Self {
            lr,
            beta1,
            beta2,
            eps,
            t: 0,
        }
    }

    /// Adam with the standard defaults `beta1 = 0.9`, `beta2 = 0.999`,
    /// `eps = 1e-8`.
    pub fn with_lr(lr: f32) -> Self {
        Self::new(lr, 0.9, 0.999, 1e-8)
    }

    /// Update every trainable parameter in place.
    pub fn step(&mut self, params: &mut [&mut Param]) {
        self.t += 1;
        for p in params.iter_mut().filter(|p| p.trainable) {
            p.adam_step(self.lr, self.beta1, self.beta2, self.eps, self.t);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Matrix;

    #[test]
    fn skips_frozen_params() {
        let mut opt = Adam::with_lr(0.1);
        let mut a = Param::new(Matrix::from_vec(1, 1, vec![1.0]));
        let mut b = Param::frozen(Matrix::from_vec(1, 1, vec![1.0]));
        a.grad = vec![1.0];
        b.grad = vec![1.0];
        opt.step(&mut [&mut a, &mut b]);
        assert_eq!(opt.t, 1);
        assert!(a.value.data[0] < 1.0);
        assert_eq!(b.value.data[0], 1.0);
    }

    #[test]
    fn minimises_quadratic() {
        let mut opt = Adam::with_lr(0.05);
        let mut p = Param::new(Matrix::from_vec(1, 1, vec![3.0]));
        for _ in 0..500 {
            let x = p.value.data[0];
            p.grad = vec![2.0 * x];
            opt.step(&mut [&mut p]);
        }
        assert!(p.value.data[0].abs() < 0.1);
    }
}
