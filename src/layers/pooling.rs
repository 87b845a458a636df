use super::layer::Layer;
use crate::error::{Error, Result};
use crate::math::Matrix;

/// 2D max pooling forward pass over a single `rows x cols` feature map.
///
/// Returns the pooled values and, for each pooling window, the index of the
/// maximum element within `input`. The indices drive the backward pass.
pub fn max_pool2d(
    input: &[f32],
    rows: usize,
    cols: usize,
    kernel: usize,
    stride: usize,
) -> (Vec<f32>, Vec<usize>) {
    let out_rows = (rows - kernel) / stride + 1;
    let out_cols = (cols - kernel) / stride + 1;
    let mut out = vec![0.0; out_rows * out_cols];
    let mut indices = vec![0usize; out_rows * out_cols];
    let mut idx = 0;
    for r in 0..out_rows {
        for c in 0..out_cols {
            let mut best = f32::NEG_INFINITY;
            let mut best_idx = 0usize;
            for kr in 0..kernel {
                for kc in 0..kernel {
                    let i = (r * stride + kr) * cols + c * stride + kc;
                    if input[i] > best {
                        best = input[i];
                        best_idx = i;
                    }
                }
            }
            out[idx] = best;
            indices[idx] = best_idx;
            idx += 1;
        }
    }
    (out, indices)
}

/// Max pooling layer with "valid" padding applied to every channel of every
/// image in the batch.
pub struct MaxPool2d {
    channels: usize,
    in_h: usize,
    in_w: usize,
    kernel: usize,
    stride: usize,
    // per sample: argmax positions relative to the input row
    indices: Vec<Vec<usize>>,
    input_cols: usize,
}

impl MaxPool2d {
    pub fn new(channels: usize, in_h: usize, in_w: usize, kernel: usize, stride: usize) -> Self {
        Self {
            channels,
            in_h,
            in_w,
            kernel: kernel.max(1),
            stride: stride.max(1),
            indices: Vec::new(),
            input_cols: 0,
        }
    }

    /// Output spatial size `(height, width)`.
    pub fn out_hw(&self) -> (usize, usize) {
        if self.in_h < self.kernel || self.in_w < self.kernel {
            return (0, 0);
        }
        (
            (self.in_h - self.kernel) / self.stride + 1,
            (self.in_w - self.kernel) / self.stride + 1,
        )
    }

    fn pool(&self, x: &Matrix) -> (Matrix, Vec<Vec<usize>>) {
        let (oh, ow) = self.out_hw();
        let plane = self.in_h * self.in_w;
        let out_plane = oh * ow;
        let mut out = Matrix::zeros(x.rows, self.channels * out_plane);
        let mut all_indices = Vec::with_capacity(x.rows);
        for b in 0..x.rows {
            let row = x.row(b);
            let mut sample_idx = Vec::with_capacity(self.channels * out_plane);
            for ch in 0..self.channels {
                let map = &row[ch * plane..(ch + 1) * plane];
                let (vals, idx) = max_pool2d(map, self.in_h, self.in_w, self.kernel, self.stride);
                let start = b * out.cols + ch * out_plane;
                out.data[start..start + out_plane].copy_from_slice(&vals);
                sample_idx.extend(idx.into_iter().map(|i| ch * plane + i));
            }
            all_indices.push(sample_idx);
        }
        (out, all_indices)
    }
}

impl Layer for MaxPool2d {
    fn name(&self) -> &'static str {
        "max_pool2d"
    }

    fn output_dim(&self, input_dim: usize) -> Result<usize> {
        let expected = self.channels * self.in_h * self.in_w;
        if input_dim != expected {
            return Err(Error::Shape {
                context: "max_pool2d input",
                expected,
                actual: input_dim,
            });
        }
        let (oh, ow) = self.out_hw();
        if oh == 0 || ow == 0 {
            return Err(Error::Shape {
                context: "max_pool2d window",
                expected: self.kernel,
                actual: self.in_h.min(self.in_w),
            });
        }
        Ok(self.channels * oh * ow)
    }

    fn forward(&self, x: &Matrix) -> Matrix {
        self.pool(x).0
    }

    fn forward_train(&mut self, x: &Matrix) -> Matrix {
        let (out, indices) = self.pool(x);
        self.indices = indices;
        self.input_cols = x.cols;
        out
    }

    fn backward(&mut self, grad_out: &Matrix) -> Matrix {
        let mut grad_input = Matrix::zeros(grad_out.rows, self.input_cols);
        for (b, idx) in self.indices.iter().enumerate() {
            let g = grad_out.row(b);
            let dst = &mut grad_input.data[b * self.input_cols..(b + 1) * self.input_cols];
            for (i, &src) in idx.iter().enumerate() {
                dst[src] += g[i];
            }
        }
        grad_input
    }
}
