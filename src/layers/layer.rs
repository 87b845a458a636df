use super::param::Param;
use crate::error::Result;
use crate::math::Matrix;

/// Common interface for network layers.
///
/// Inputs are `(batch, features)` matrices; image layers interpret each row
/// as channel-major `C x H x W` data.
pub trait Layer {
    /// Short layer name used in logs and exports.
    fn name(&self) -> &'static str;

    /// Feature count produced for an input of `input_dim` features, or a
    /// shape error when the layer cannot accept that input.
    fn output_dim(&self, input_dim: usize) -> Result<usize>;

    /// Forward pass used during evaluation and serving. Deterministic:
    /// dropout is disabled and batch-norm uses its moving statistics.
    fn forward(&self, x: &Matrix) -> Matrix;

    /// Forward pass used during training, caching whatever the backward
    /// pass needs.
    fn forward_train(&mut self, x: &Matrix) -> Matrix;

    /// Backward pass accumulating parameter gradients and returning the
    /// gradient with respect to the layer input.
    fn backward(&mut self, grad_out: &Matrix) -> Matrix;

    fn params(&self) -> Vec<&Param> {
        Vec::new()
    }

    fn params_mut(&mut self) -> Vec<&mut Param> {
        Vec::new()
    }

    /// Zero any accumulated gradients.
    fn zero_grad(&mut self) {
        for p in self.params_mut() {
            p.zero_grad();
        }
    }
}
