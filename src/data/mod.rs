//! MNIST loading and the batch types fed to the classifier.

pub mod dataloader;

pub use dataloader::{make_eval_input_fn, make_train_input_fn, EvalInput, InputFn, ShuffleQueue, TrainInput};

use std::path::Path;
use std::sync::Arc;

use log::info;
use mnist::MnistBuilder;

use crate::error::{Error, Result};
use crate::math::Matrix;
use crate::models::{HEIGHT, NCHANNELS, WIDTH};

pub const IMAGE_SIZE: usize = HEIGHT * WIDTH * NCHANNELS;

pub const TRAIN_SIZE: usize = 55_000;
pub const VALIDATION_SIZE: usize = 5_000;
pub const TEST_SIZE: usize = 10_000;

const IDX_FILES: [&str; 4] = [
    "train-images-idx3-ubyte",
    "train-labels-idx1-ubyte",
    "t10k-images-idx3-ubyte",
    "t10k-labels-idx1-ubyte",
];

/// Model inputs. The image is flattened to `IMAGE_SIZE` columns per row.
#[derive(Clone, Debug)]
pub struct Features {
    pub image: Matrix,
}

#[derive(Clone, Debug)]
pub struct Batch {
    pub features: Features,
    pub labels: Vec<u8>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Images with one label per row, pixels scaled to `[0, 1]`.
#[derive(Clone, Debug)]
pub struct ImageSet {
    pub images: Matrix,
    pub labels: Vec<u8>,
}

impl ImageSet {
    pub fn new(images: Matrix, labels: Vec<u8>) -> Result<Self> {
        if images.rows != labels.len() {
            return Err(Error::Shape {
                context: "labels per image",
                expected: images.rows,
                actual: labels.len(),
            });
        }
        if images.cols != IMAGE_SIZE {
            return Err(Error::Shape {
                context: "image features",
                expected: IMAGE_SIZE,
                actual: images.cols,
            });
        }
        Ok(Self { images, labels })
    }

    /// Build from raw IDX bytes: `IMAGE_SIZE` pixels per label.
    pub fn from_bytes(pixels: &[u8], labels: &[u8]) -> Result<Self> {
        if pixels.len() != labels.len() * IMAGE_SIZE {
            return Err(Error::Shape {
                context: "pixel bytes",
                expected: labels.len() * IMAGE_SIZE,
                actual: pixels.len(),
            });
        }
        let data = pixels.iter().map(|&p| p as f32 / 255.0).collect();
        Self::new(Matrix::from_vec(labels.len(), IMAGE_SIZE, data), labels.to_vec())
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Gather the given rows into a batch.
    pub fn batch(&self, indices: &[usize]) -> Batch {
        Batch {
            features: Features {
                image: self.images.select_rows(indices),
            },
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
        }
    }

    /// Split into the first `n` rows and the rest.
    pub fn split_front(mut self, n: usize) -> Result<(ImageSet, ImageSet)> {
        if n > self.len() {
            return Err(Error::Shape {
                context: "rows to split off",
                expected: self.len(),
                actual: n,
            });
        }
        let cols = self.images.cols;
        let rest_rows = self.len() - n;
        let rest_pixels = self.images.data.split_off(n * cols);
        let rest_labels = self.labels.split_off(n);
        let front = ImageSet::new(Matrix::from_vec(n, cols, self.images.data), self.labels)?;
        let rest = ImageSet::new(Matrix::from_vec(rest_rows, cols, rest_pixels), rest_labels)?;
        Ok((front, rest))
    }

    /// The whole set as one batch.
    pub fn to_batch(&self) -> Batch {
        Batch {
            features: Features {
                image: self.images.clone(),
            },
            labels: self.labels.clone(),
        }
    }
}

/// The three MNIST splits. Shared with the input functions through `Arc`.
#[derive(Clone, Debug)]
pub struct MnistData {
    pub train: Arc<ImageSet>,
    pub validation: Arc<ImageSet>,
    pub test: Arc<ImageSet>,
}

impl MnistData {
    pub fn new(train: ImageSet, validation: ImageSet, test: ImageSet) -> Self {
        Self {
            train: Arc::new(train),
            validation: Arc::new(validation),
            test: Arc::new(test),
        }
    }
}

/// Read the four IDX files from `data_dir`.
///
/// The first `VALIDATION_SIZE` rows of the training file are the validation
/// split and the remaining `TRAIN_SIZE` rows are trained on.
///
/// When `download` is set, missing files are fetched into `data_dir` first;
/// otherwise a missing file is reported as [`Error::MissingData`].
pub fn load_mnist(data_dir: &Path, download: bool) -> Result<MnistData> {
    if !download {
        for name in IDX_FILES {
            let path = data_dir.join(name);
            if !path.is_file() {
                return Err(Error::MissingData { path });
            }
        }
    } else {
        std::fs::create_dir_all(data_dir)?;
    }

    let base = format!("{}/", data_dir.to_string_lossy().trim_end_matches('/'));
    let mut builder = MnistBuilder::new();
    builder
        .base_path(&base)
        .label_format_digit()
        .training_set_length((VALIDATION_SIZE + TRAIN_SIZE) as u32)
        .test_set_length(TEST_SIZE as u32);
    if download {
        info!("Downloading MNIST into {}", data_dir.display());
        builder.download_and_extract();
    }
    let mnist = builder.finalize();

    let full_train = ImageSet::from_bytes(&mnist.trn_img, &mnist.trn_lbl)?;
    let (validation, train) = full_train.split_front(VALIDATION_SIZE)?;
    let data = MnistData::new(
        train,
        validation,
        ImageSet::from_bytes(&mnist.tst_img, &mnist.tst_lbl)?,
    );
    info!(
        "Loaded MNIST: {} train, {} validation, {} test",
        data.train.len(),
        data.validation.len(),
        data.test.len()
    );
    Ok(data)
}
