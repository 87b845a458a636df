use super::layer::Layer;
use super::linear::glorot_uniform;
use super::param::Param;
use crate::error::{Error, Result};
use crate::math::Matrix;

/// 2D convolution with "same" padding using im2col and a weight matrix.
///
/// Each input row holds one image laid out as `in_channels x height x width`.
/// The output uses the same channel-major layout with `out_channels` maps of
/// `ceil(height / stride) x ceil(width / stride)`. When the total padding is
/// odd the extra row/column goes to the bottom/right.
pub struct Conv2d {
    pub w: Param,
    pub b: Param,
    in_channels: usize,
    out_channels: usize,
    in_h: usize,
    in_w: usize,
    kernel_size: usize,
    stride: usize,
    pad_top: usize,
    pad_left: usize,
    out_h: usize,
    out_w: usize,
    // im2col buffer from the last training forward pass
    last_cols: Matrix,
    last_batch: usize,
}

fn same_padding(input: usize, kernel: usize, stride: usize) -> (usize, usize) {
    let out = input.div_ceil(stride);
    let total = ((out - 1) * stride + kernel).saturating_sub(input);
    (out, total / 2)
}

impl Conv2d {
    pub fn new(
        in_channels: usize,
        in_h: usize,
        in_w: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
    ) -> Self {
        let kernel_size = kernel_size.max(1);
        let stride = stride.max(1);
        let (out_h, pad_top) = same_padding(in_h, kernel_size, stride);
        let (out_w, pad_left) = same_padding(in_w, kernel_size, stride);
        let fan_in = in_channels * kernel_size * kernel_size;
        Self {
            w: Param::new(glorot_uniform(fan_in, out_channels)),
            b: Param::new(Matrix::zeros(1, out_channels)),
            in_channels,
            out_channels,
            in_h,
            in_w,
            kernel_size,
            stride,
            pad_top,
            pad_left,
            out_h,
            out_w,
            last_cols: Matrix::zeros(0, 0),
            last_batch: 0,
        }
    }

    /// Output spatial size `(height, width)`.
    pub fn out_hw(&self) -> (usize, usize) {
        (self.out_h, self.out_w)
    }

    /// Input pixel index for output position `(oh, ow)` and kernel tap
    /// `(kh, kw)`, or `None` when the tap falls in the zero padding.
    fn source(&self, oh: usize, ow: usize, kh: usize, kw: usize) -> Option<(usize, usize)> {
        let ih = (oh * self.stride + kh) as isize - self.pad_top as isize;
        let iw = (ow * self.stride + kw) as isize - self.pad_left as isize;
        if ih >= 0 && ih < self.in_h as isize && iw >= 0 && iw < self.in_w as isize {
            Some((ih as usize, iw as usize))
        } else {
            None
        }
    }

    fn im2col(&self, x: &Matrix) -> Matrix {
        let k = self.kernel_size;
        let plane = self.in_h * self.in_w;
        let mut cols = Matrix::zeros(x.rows * self.out_h * self.out_w, self.in_channels * k * k);
        let mut row = 0;
        for b in 0..x.rows {
            let img = x.row(b);
            for oh in 0..self.out_h {
                for ow in 0..self.out_w {
                    let dst = &mut cols.data[row * cols.cols..(row + 1) * cols.cols];
                    let mut col_idx = 0;
                    for ic in 0..self.in_channels {
                        for kh in 0..k {
                            for kw in 0..k {
                                if let Some((ih, iw)) = self.source(oh, ow, kh, kw) {
                                    dst[col_idx] = img[ic * plane + ih * self.in_w + iw];
                                }
                                col_idx += 1;
                            }
                        }
                    }
                    row += 1;
                }
            }
        }
        cols
    }

    fn col2im(&self, cols: &Matrix, batch: usize) -> Matrix {
        let k = self.kernel_size;
        let plane = self.in_h * self.in_w;
        let mut img = Matrix::zeros(batch, self.in_channels * plane);
        let mut row = 0;
        for b in 0..batch {
            for oh in 0..self.out_h {
                for ow in 0..self.out_w {
                    let src = cols.row(row);
                    let dst = &mut img.data[b * img.cols..(b + 1) * img.cols];
                    let mut col_idx = 0;
                    for ic in 0..self.in_channels {
                        for kh in 0..k {
                            for kw in 0..k {
                                if let Some((ih, iw)) = self.source(oh, ow, kh, kw) {
                                    dst[ic * plane + ih * self.in_w + iw] += src[col_idx];
                                }
                                col_idx += 1;
                            }
                        }
                    }
                    row += 1;
                }
            }
        }
        img
    }

    /// `(batch * out_h * out_w, out_channels)` -> `(batch, out_channels * out_h * out_w)`
    fn reshape_output(&self, out_cols: &Matrix, batch: usize) -> Matrix {
        let plane = self.out_h * self.out_w;
        let mut out = Matrix::zeros(batch, self.out_channels * plane);
        for b in 0..batch {
            for p in 0..plane {
                let src = out_cols.row(b * plane + p);
                for (oc, &val) in src.iter().enumerate() {
                    out.data[b * out.cols + oc * plane + p] = val;
                }
            }
        }
        out
    }

    /// Inverse of [`Self::reshape_output`] for gradients.
    fn reshape_grad(&self, grad_out: &Matrix) -> Matrix {
        let plane = self.out_h * self.out_w;
        let batch = grad_out.rows;
        let mut grad_cols = Matrix::zeros(batch * plane, self.out_channels);
        for b in 0..batch {
            let src = grad_out.row(b);
            for p in 0..plane {
                let dst = &mut grad_cols.data[(b * plane + p) * self.out_channels
                    ..(b * plane + p + 1) * self.out_channels];
                for (oc, d) in dst.iter_mut().enumerate() {
                    *d = src[oc * plane + p];
                }
            }
        }
        grad_cols
    }

    fn convolve(&self, cols: &Matrix, batch: usize) -> Matrix {
        let mut out_cols = Matrix::matmul(cols, &self.w.value);
        out_cols.add_row_vector(&self.b.value.data);
        self.reshape_output(&out_cols, batch)
    }
}

impl Layer for Conv2d {
    fn name(&self) -> &'static str {
        "conv2d"
    }

    fn output_dim(&self, input_dim: usize) -> Result<usize> {
        let expected = self.in_channels * self.in_h * self.in_w;
        if input_dim != expected {
            return Err(Error::Shape {
                context: "conv2d input",
                expected,
                actual: input_dim,
            });
        }
        Ok(self.out_channels * self.out_h * self.out_w)
    }

    fn forward(&self, x: &Matrix) -> Matrix {
        let cols = self.im2col(x);
        self.convolve(&cols, x.rows)
    }

    fn forward_train(&mut self, x: &Matrix) -> Matrix {
        let cols = self.im2col(x);
        let out = self.convolve(&cols, x.rows);
        self.last_cols = cols;
        self.last_batch = x.rows;
        out
    }

    fn backward(&mut self, grad_out: &Matrix) -> Matrix {
        let grad_cols = self.reshape_grad(grad_out);
        let grad_w = Matrix::matmul(&self.last_cols.transpose(), &grad_cols);
        self.w.accumulate(&grad_w.data);
        self.b.accumulate(&grad_cols.sum_rows());
        let grad_in_cols = Matrix::matmul(&grad_cols, &self.w.value.transpose());
        self.col2im(&grad_in_cols, self.last_batch)
    }

    fn params(&self) -> Vec<&Param> {
        vec![&self.w, &self.b]
    }

    fn params_mut(&mut self) -> Vec<&mut Param> {
        vec![&mut self.w, &mut self.b]
    }
}
