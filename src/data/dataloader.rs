use std::sync::Arc;

use rand::rngs::StdRng;
use rand::Rng;

use super::{Batch, ImageSet, MnistData};
use crate::hparams::HParams;
use crate::rng::rng_from_env;

/// A re-invocable source of batches. Each call starts a fresh pass, the way
/// the driver restarts input at every train or evaluate call.
pub type InputFn = Box<dyn Fn() -> Box<dyn Iterator<Item = Batch>>>;

/// Random dequeue from a bounded buffer of example indices.
///
/// The buffer holds at most `capacity` indices, fed cyclically from the
/// source, and always keeps at least `min_after_dequeue` indices behind after
/// a dequeue so consecutive batches are well mixed.
pub struct ShuffleQueue {
    buffer: Vec<usize>,
    capacity: usize,
    min_after_dequeue: usize,
    source_len: usize,
    cursor: usize,
    rng: StdRng,
}

impl ShuffleQueue {
    /// Queue sized for `batch_size`: capacity `50 * batch_size`,
    /// `min_after_dequeue = 20 * batch_size`.
    pub fn new(source_len: usize, batch_size: usize, rng: StdRng) -> Self {
        let batch_size = batch_size.max(1);
        let min_after_dequeue = 20 * batch_size;
        Self {
            buffer: Vec::new(),
            capacity: (50 * batch_size).max(min_after_dequeue + batch_size),
            min_after_dequeue,
            source_len,
            cursor: 0,
            rng,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn min_after_dequeue(&self) -> usize {
        self.min_after_dequeue
    }

    /// Indices currently buffered.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    fn fill(&mut self, target: usize) {
        while self.buffer.len() < target {
            self.buffer.push(self.cursor);
            self.cursor = (self.cursor + 1) % self.source_len;
        }
    }

    /// Remove `n` random indices. Returns `None` for an empty source.
    pub fn dequeue_many(&mut self, n: usize) -> Option<Vec<usize>> {
        if self.source_len == 0 {
            return None;
        }
        let needed = self.min_after_dequeue + n;
        if self.buffer.len() < needed {
            self.fill(self.capacity.max(needed));
        }
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let i = self.rng.gen_range(0..self.buffer.len());
            out.push(self.buffer.swap_remove(i));
        }
        Some(out)
    }
}

/// Endless shuffled training batches.
pub struct TrainInput {
    data: Arc<ImageSet>,
    queue: ShuffleQueue,
    batch_size: usize,
}

impl TrainInput {
    pub fn new(data: Arc<ImageSet>, batch_size: usize, rng: StdRng) -> Self {
        let queue = ShuffleQueue::new(data.len(), batch_size, rng);
        Self {
            data,
            queue,
            batch_size: batch_size.max(1),
        }
    }
}

impl Iterator for TrainInput {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        let indices = self.queue.dequeue_many(self.batch_size)?;
        Some(self.data.batch(&indices))
    }
}

/// A single batch holding the whole evaluation set.
pub struct EvalInput {
    data: Option<Arc<ImageSet>>,
}

impl EvalInput {
    pub fn new(data: Arc<ImageSet>) -> Self {
        Self { data: Some(data) }
    }
}

impl Iterator for EvalInput {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        self.data.take().map(|d| d.to_batch())
    }
}

/// Training input: shuffled batches of `train_batch_size` from the train
/// split, repeated indefinitely.
pub fn make_train_input_fn(data: &MnistData, hparams: &HParams) -> InputFn {
    let train = Arc::clone(&data.train);
    let batch_size = hparams.train_batch_size;
    Box::new(move || -> Box<dyn Iterator<Item = Batch>> {
        Box::new(TrainInput::new(Arc::clone(&train), batch_size, rng_from_env()))
    })
}

/// Evaluation input: the full test split as one batch.
pub fn make_eval_input_fn(data: &MnistData) -> InputFn {
    let test = Arc::clone(&data.test);
    Box::new(move || -> Box<dyn Iterator<Item = Batch>> {
        Box::new(EvalInput::new(Arc::clone(&test)))
    })
}
