use std::sync::atomic::{AtomicUsize, Ordering};

static MATRIX_OPS: AtomicUsize = AtomicUsize::new(0);

pub fn reset_matrix_ops() {
    MATRIX_OPS.store(0, Ordering::SeqCst);
}

pub fn matrix_ops_count() -> usize {
    MATRIX_OPS.load(Ordering::SeqCst)
}

pub(crate) fn inc_ops() {
    MATRIX_OPS.fetch_add(1, Ordering::SeqCst);
}

/// Dense row-major matrix. Batches are stored one sample per row.
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f32>,
}

impl Matrix {
    pub fn zeros(r: usize, c: usize) -> Self {
        Matrix {
            rows: r,
            cols: c,
            data: vec![0.0; r * c],
        }
    }

    pub fn from_vec(r: usize, c: usize, v: Vec<f32>) -> Self {
        assert_eq!(v.len(), r * c);
        Matrix {
            rows: r,
            cols: c,
            data: v,
        }
    }

    pub fn get(&self, r: usize, c: usize) -> f32 {
        self.data[r * self.cols + c]
    }

    pub fn set(&mut self, r: usize, c: usize, v: f32) {
        self.data[r * self.cols + c] = v;
    }

    /// Borrow a single row.
    pub fn row(&self, r: usize) -> &[f32] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    /// Copy rows `start..end` into a new matrix.
    pub fn slice_rows(&self, start: usize, end: usize) -> Matrix {
        let end = end.min(self.rows);
        let start = start.min(end);
        Matrix::from_vec(
            end - start,
            self.cols,
            self.data[start * self.cols..end * self.cols].to_vec(),
        )
    }

    /// Gather the given rows, in order, into a new matrix.
    pub fn select_rows(&self, indices: &[usize]) -> Matrix {
        let mut data = Vec::with_capacity(indices.len() * self.cols);
        for &i in indices {
            data.extend_from_slice(self.row(i));
        }
        Matrix::from_vec(indices.len(), self.cols, data)
    }

    /// Stack matrices with the same column count vertically.
    pub fn vstack(parts: &[Matrix]) -> Matrix {
        let cols = parts.first().map_or(0, |m| m.cols);
        let mut data = Vec::with_capacity(parts.iter().map(|m| m.data.len()).sum());
        let mut rows = 0;
        for m in parts {
            assert_eq!(m.cols, cols);
            data.extend_from_slice(&m.data);
            rows += m.rows;
        }
        Matrix::from_vec(rows, cols, data)
    }

    pub fn matmul(a: &Matrix, b: &Matrix) -> Matrix {
        inc_ops();
        assert_eq!(a.cols, b.rows);
        let mut out = vec![0.0; a.rows * b.cols];
        for i in 0..a.rows {
            let a_row = &a.data[i * a.cols..(i + 1) * a.cols];
            let out_row = &mut out[i * b.cols..(i + 1) * b.cols];
            for (k, &a_val) in a_row.iter().enumerate() {
                if a_val == 0.0 {
                    continue;
                }
                let b_row = &b.data[k * b.cols..(k + 1) * b.cols];
                for (o, &b_val) in out_row.iter_mut().zip(b_row) {
                    *o += a_val * b_val;
                }
            }
        }
        Matrix::from_vec(a.rows, b.cols, out)
    }

    /// Add `bias[c]` to every element of column `c`.
    pub fn add_row_vector(&mut self, bias: &[f32]) {
        assert_eq!(bias.len(), self.cols);
        for row in self.data.chunks_mut(self.cols) {
            for (v, b) in row.iter_mut().zip(bias) {
                *v += b;
            }
        }
    }

    /// Column-wise sum, the gradient of a broadcast bias add.
    pub fn sum_rows(&self) -> Vec<f32> {
        let mut out = vec![0.0; self.cols];
        for row in self.data.chunks(self.cols) {
            for (o, v) in out.iter_mut().zip(row) {
                *o += v;
            }
        }
        out
    }

    pub fn transpose(&self) -> Matrix {
        inc_ops();
        let mut v = vec![0.0; self.rows * self.cols];
        for i in 0..self.rows {
            for j in 0..self.cols {
                v[j * self.rows + i] = self.get(i, j);
            }
        }
        Matrix::from_vec(self.cols, self.rows, v)
    }

    pub fn softmax(&self) -> Matrix {
        inc_ops();
        let mut v = vec![0.0; self.data.len()];
        for r in 0..self.rows {
            let row_start = r * self.cols;
            let row_slice = &self.data[row_start..row_start + self.cols];
            // subtract the row max so exp() cannot overflow
            let max = row_slice.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
            let mut sum = 0.0;
            for c in 0..self.cols {
                let e = (row_slice[c] - max).exp();
                v[row_start + c] = e;
                sum += e;
            }
            for c in 0..self.cols {
                v[row_start + c] /= sum;
            }
        }
        Matrix::from_vec(self.rows, self.cols, v)
    }

    /// Index of the largest value in each row.
    pub fn argmax_rows(&self) -> Vec<usize> {
        (0..self.rows).map(|r| argmax(self.row(r))).collect()
    }
}

/// Index of the first maximum element. Returns 0 for an empty slice.
pub fn argmax(v: &[f32]) -> usize {
    let mut best = 0usize;
    let mut best_val = f32::NEG_INFINITY;
    for (i, &x) in v.iter().enumerate() {
        if x > best_val {
            best_val = x;
            best = i;
        }
    }
    best
}

/// One-hot encode `labels` into a `labels.len() x depth` matrix.
pub fn one_hot(labels: &[u8], depth: usize) -> Matrix {
    let mut m = Matrix::zeros(labels.len(), depth);
    for (r, &l) in labels.iter().enumerate() {
        let l = l as usize;
        if l < depth {
            m.set(r, l, 1.0);
        }
    }
    m
}

/// Compute a numerically stable softmax followed by cross-entropy loss.
///
/// Returns the mean loss over the batch, the gradient with respect to the
/// logits (already divided by the batch size) and the softmax probabilities.
/// Each row of `logits` is scored against the matching entry of `targets`.
pub fn softmax_cross_entropy(logits: &Matrix, targets: &[usize]) -> (f32, Matrix, Matrix) {
    assert_eq!(logits.rows, targets.len());
    let probs = logits.softmax();
    let mut grad = probs.clone();
    let mut loss = 0.0f32;

    for (row, &tgt) in targets.iter().enumerate() {
        let p = probs.get(row, tgt);
        loss += -(p + 1e-9).ln();
        grad.set(row, tgt, grad.get(row, tgt) - 1.0);
    }

    let cnt = targets.len() as f32;
    if cnt > 0.0 {
        loss /= cnt;
        for v in grad.data.iter_mut() {
            *v /= cnt;
        }
    }

    (loss, grad, probs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matmul_small() {
        let a = Matrix::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        let b = Matrix::from_vec(2, 1, vec![5.0, 6.0]);
        assert_eq!(Matrix::matmul(&a, &b).data, vec![17.0, 39.0]);
    }

    #[test]
    fn softmax_rows_sum_to_one() {
        let m = Matrix::from_vec(2, 3, vec![1.0, 2.0, 3.0, 1000.0, 1000.0, 1000.0]);
        let s = m.softmax();
        for r in 0..2 {
            let sum: f32 = s.row(r).iter().sum();
            assert!((sum - 1.0).abs() < 1e-6);
        }
        assert!((s.get(1, 0) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn one_hot_marks_label_column() {
        let m = one_hot(&[2, 0], 3);
        assert_eq!(m.data, vec![0.0, 0.0, 1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn bias_helpers() {
        let mut m = Matrix::zeros(2, 2);
        m.add_row_vector(&[1.0, 2.0]);
        assert_eq!(m.data, vec![1.0, 2.0, 1.0, 2.0]);
        assert_eq!(m.sum_rows(), vec![2.0, 4.0]);
    }

    #[test]
    fn select_and_slice_rows() {
        let m = Matrix::from_vec(3, 1, vec![0.0, 1.0, 2.0]);
        assert_eq!(m.select_rows(&[2, 0]).data, vec![2.0, 0.0]);
        assert_eq!(m.slice_rows(1, 10).data, vec![1.0, 2.0]);
    }
}
