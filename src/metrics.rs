/// Fraction of predictions equal to their label. Empty input scores 0.
pub fn accuracy(pred: &[u8], labels: &[u8]) -> f32 {
    let len = pred.len().min(labels.len());
    if len == 0 {
        return 0.0;
    }
    let correct = pred
        .iter()
        .zip(labels.iter())
        .filter(|(p, l)| p == l)
        .count();
    correct as f32 / len as f32
}

/// Streaming mean, used to aggregate a metric across evaluation batches.
#[derive(Clone, Debug, Default)]
pub struct Mean {
    total: f64,
    count: u64,
}

impl Mean {
    pub fn update(&mut self, value: f32, weight: usize) {
        self.total += value as f64 * weight as f64;
        self.count += weight as u64;
    }

    pub fn result(&self) -> f32 {
        if self.count == 0 {
            0.0
        } else {
            (self.total / self.count as f64) as f32
        }
    }
}
