use crate::error::{Error, Result};
use crate::layers::{Layer, Param, ParamState};
use crate::math::Matrix;

/// A container that applies layers in order.
///
/// The input width is fixed at construction and every layer is checked
/// against the width produced by its predecessor, so a built network can
/// always run a correctly shaped batch.
pub struct Sequential {
    layers: Vec<Box<dyn Layer>>,
    input_dim: usize,
    output_dim: usize,
}

impl Sequential {
    /// Create an empty network accepting `input_dim` features.
    pub fn new(input_dim: usize) -> Self {
        Self {
            layers: Vec::new(),
            input_dim,
            output_dim: input_dim,
        }
    }

    /// Append a layer, validating it against the current output width.
    pub fn add_layer(&mut self, layer: Box<dyn Layer>) -> Result<()> {
        self.output_dim = layer.output_dim(self.output_dim)?;
        self.layers.push(layer);
        Ok(())
    }

    /// Builder-style [`Sequential::add_layer`].
    pub fn with<L: Layer + 'static>(mut self, layer: L) -> Result<Self> {
        self.add_layer(Box::new(layer))?;
        Ok(self)
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    /// Layer names in order, for logging.
    pub fn layer_names(&self) -> Vec<&'static str> {
        self.layers.iter().map(|l| l.name()).collect()
    }

    fn check_input(&self, x: &Matrix) -> Result<()> {
        if x.cols != self.input_dim {
            return Err(Error::Shape {
                context: "network input",
                expected: self.input_dim,
                actual: x.cols,
            });
        }
        Ok(())
    }

    /// Forward pass used during evaluation and serving.
    pub fn forward(&self, x: &Matrix) -> Result<Matrix> {
        self.check_input(x)?;
        let mut out = x.clone();
        for layer in &self.layers {
            out = layer.forward(&out);
        }
        Ok(out)
    }

    /// Forward pass used during training.
    pub fn forward_train(&mut self, x: &Matrix) -> Result<Matrix> {
        self.check_input(x)?;
        let mut out = x.clone();
        for layer in self.layers.iter_mut() {
            out = layer.forward_train(&out);
        }
        Ok(out)
    }

    /// Backward pass returning gradient with respect to the input.
    pub fn backward(&mut self, grad_out: &Matrix) -> Matrix {
        let mut grad = grad_out.clone();
        for layer in self.layers.iter_mut().rev() {
            grad = layer.backward(&grad);
        }
        grad
    }

    /// Zero any accumulated gradients in all layers.
    pub fn zero_grad(&mut self) {
        for layer in self.layers.iter_mut() {
            layer.zero_grad();
        }
    }

    pub fn params(&self) -> Vec<&Param> {
        self.layers.iter().flat_map(|l| l.params()).collect()
    }

    pub fn params_mut(&mut self) -> Vec<&mut Param> {
        self.layers.iter_mut().flat_map(|l| l.params_mut()).collect()
    }

    /// Number of trainable scalars.
    pub fn num_trainable(&self) -> usize {
        self.params()
            .iter()
            .filter(|p| p.trainable)
            .map(|p| p.len())
            .sum()
    }

    /// Snapshot every parameter in layer order.
    pub fn state(&self, with_slots: bool) -> Vec<ParamState> {
        self.params().iter().map(|p| p.to_state(with_slots)).collect()
    }

    /// Restore a snapshot produced by [`Sequential::state`] on a network of
    /// the same architecture.
    pub fn load_state(&mut self, states: &[ParamState]) -> Result<()> {
        let mut params = self.params_mut();
        if params.len() != states.len() {
            return Err(Error::Shape {
                context: "parameter tensors",
                expected: params.len(),
                actual: states.len(),
            });
        }
        for (i, (p, s)) in params.iter_mut().zip(states).enumerate() {
            p.load_state(i, s)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{BatchNorm, Linear, ReLU};
    use crate::math::softmax_cross_entropy;

    #[test]
    fn rejects_mismatched_layers() {
        let net = Sequential::new(4).with(Linear::new(4, 3)).unwrap();
        assert!(net.with(Linear::new(2, 1)).is_err());
    }

    #[test]
    fn rejects_wrong_batch_width() {
        let net = Sequential::new(4).with(Linear::new(4, 3)).unwrap();
        assert!(net.forward(&Matrix::zeros(2, 5)).is_err());
    }

    #[test]
    fn state_round_trip() {
        let a = Sequential::new(3)
            .with(Linear::new(3, 2))
            .and_then(|n| n.with(ReLU::new()))
            .unwrap();
        let mut b = Sequential::new(3).with(Linear::new(3, 2)).unwrap();
        b.load_state(&a.state(true)).unwrap();
        let x = Matrix::from_vec(1, 3, vec![1.0, -1.0, 0.5]);
        let ya = a.forward(&x).unwrap();
        let yb = b.forward(&x).unwrap();
        for (p, q) in ya.data.iter().zip(&yb.data) {
            assert!((p.max(0.0) - q.max(0.0)).abs() < 1e-6);
        }
    }

    #[test]
    fn load_state_names_the_mismatched_parameter() {
        let a = Sequential::new(3).with(Linear::new(3, 2)).unwrap();
        let mut wide = Sequential::new(3).with(Linear::new(3, 4)).unwrap();
        assert!(matches!(
            wide.load_state(&a.state(false)),
            Err(Error::ParamShape {
                index: 0,
                expected: (3, 4),
                found: (3, 2)
            })
        ));
        assert!(matches!(
            wide.load_state(&a.state(false)[..1]),
            Err(Error::Shape {
                context: "parameter tensors",
                expected: 2,
                actual: 1
            })
        ));
    }

    fn pattern(n: usize, mul: usize, modulo: usize, shift: f32, scale: f32) -> Vec<f32> {
        (0..n)
            .map(|i| ((i * mul % modulo) as f32 - shift) / scale)
            .collect()
    }

    fn training_loss(net: &mut Sequential, x: &Matrix, targets: &[usize]) -> f32 {
        softmax_cross_entropy(&net.forward_train(x).unwrap(), targets).0
    }

    #[test]
    fn parameter_gradients_match_finite_difference() {
        let mut net = Sequential::new(4)
            .with(Linear::new(4, 5))
            .and_then(|n| n.with(BatchNorm::with_params(5, 1e-3, 0.99)))
            .and_then(|n| n.with(ReLU::new()))
            .and_then(|n| n.with(Linear::new(5, 3)))
            .unwrap();
        // dense weights, dense bias, gamma, beta, moving stats, dense weights, dense bias
        {
            let mut params = net.params_mut();
            params[0].value.data = pattern(20, 5, 9, 4.0, 6.0);
            params[1].value.data = vec![-0.1, 0.0, 0.1, -0.1, 0.0];
            params[6].value.data = pattern(15, 3, 7, 3.0, 4.0);
        }
        let x = Matrix::from_vec(6, 4, pattern(24, 7, 11, 5.0, 4.0));
        let targets = [0, 1, 2, 0, 1, 2];

        net.zero_grad();
        let logits = net.forward_train(&x).unwrap();
        let (_, grad, _) = softmax_cross_entropy(&logits, &targets);
        net.backward(&grad);
        let analytic: Vec<(bool, Vec<f32>)> = net
            .params()
            .iter()
            .map(|p| (p.trainable, p.grad.clone()))
            .collect();

        let eps = 1e-2;
        for (pi, (trainable, grads)) in analytic.iter().enumerate() {
            if !trainable {
                continue;
            }
            for (k, &g) in grads.iter().enumerate() {
                net.params_mut()[pi].value.data[k] += eps;
                let lp = training_loss(&mut net, &x, &targets);
                net.params_mut()[pi].value.data[k] -= 2.0 * eps;
                let lm = training_loss(&mut net, &x, &targets);
                net.params_mut()[pi].value.data[k] += eps;
                let numeric = (lp - lm) / (2.0 * eps);
                assert!(
                    (numeric - g).abs() < 5e-3,
                    "param {pi}[{k}]: numeric {numeric}, analytic {g}"
                );
            }
        }
    }
}
