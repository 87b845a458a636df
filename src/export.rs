//! Serving exports: `<base>/<unix-seconds>/saved_model.json` holding the
//! hyperparameters needed to rebuild the network, its weights (without
//! optimizer slots) and the serving signature.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::info;
use serde::{Deserialize, Serialize};

use crate::classifier::{self, Predictions, EXPORT_OUTPUTS, SIGNATURE_NAME};
use crate::data::Features;
use crate::error::{Error, Result};
use crate::hparams::HParams;
use crate::layers::ParamState;
use crate::math::Matrix;
use crate::models::{self, Sequential, HEIGHT, NCHANNELS, WIDTH};

pub const SAVED_MODEL_FILE: &str = "saved_model.json";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Signature {
    pub name: String,
    pub input_name: String,
    /// `[-1, HEIGHT, WIDTH, NCHANNELS]`; `-1` is the batch dimension.
    pub input_shape: Vec<i64>,
    pub outputs: Vec<String>,
}

impl Signature {
    pub fn classes() -> Self {
        Self {
            name: SIGNATURE_NAME.to_string(),
            input_name: "image".to_string(),
            input_shape: vec![-1, HEIGHT as i64, WIDTH as i64, NCHANNELS as i64],
            outputs: EXPORT_OUTPUTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SavedModel {
    pub global_step: u64,
    pub hparams: HParams,
    pub signature: Signature,
    pub params: Vec<ParamState>,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Write `model` under a fresh timestamped directory in `export_dir_base`.
pub fn write_saved_model(export_dir_base: &Path, model: &SavedModel) -> Result<PathBuf> {
    fs::create_dir_all(export_dir_base)?;
    let mut ts = unix_now();
    while export_dir_base.join(ts.to_string()).exists() {
        ts += 1;
    }
    let dir = export_dir_base.join(ts.to_string());
    fs::create_dir_all(&dir)?;
    fs::write(dir.join(SAVED_MODEL_FILE), serde_json::to_string(model)?)?;
    info!("Exported model to {}", dir.display());
    Ok(dir)
}

/// The newest timestamped export under `export_dir_base`.
pub fn latest_export(export_dir_base: &Path) -> Result<Option<PathBuf>> {
    let mut best: Option<(u64, PathBuf)> = None;
    for entry in fs::read_dir(export_dir_base)? {
        let path = entry?.path();
        let Some(ts) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.parse::<u64>().ok())
        else {
            continue;
        };
        if path.join(SAVED_MODEL_FILE).is_file() && best.as_ref().map_or(true, |(b, _)| ts > *b) {
            best = Some((ts, path));
        }
    }
    Ok(best.map(|(_, p)| p))
}

/// Validate a `[N, HEIGHT, WIDTH, NCHANNELS]` float tensor and flatten it
/// into model features.
pub fn serving_input(values: Vec<f32>, shape: &[usize]) -> Result<Features> {
    let expected = [HEIGHT, WIDTH, NCHANNELS];
    if shape.len() != 4 {
        return Err(Error::Shape {
            context: "serving input rank",
            expected: 4,
            actual: shape.len(),
        });
    }
    for (&want, &got) in expected.iter().zip(&shape[1..]) {
        if want != got {
            return Err(Error::Shape {
                context: "serving input dimension",
                expected: want,
                actual: got,
            });
        }
    }
    let n = shape[0];
    let cols = HEIGHT * WIDTH * NCHANNELS;
    if values.len() != n * cols {
        return Err(Error::Shape {
            context: "serving input values",
            expected: n * cols,
            actual: values.len(),
        });
    }
    Ok(Features {
        image: Matrix::from_vec(n, cols, values),
    })
}

/// An exported network ready for inference.
pub struct ServingModel {
    pub hparams: HParams,
    pub global_step: u64,
    pub signature: Signature,
    net: Sequential,
    chunk_size: usize,
}

impl ServingModel {
    /// Load from an export directory (the one holding `saved_model.json`) or
    /// from an export base, in which case the newest export is used.
    pub fn load(dir: &Path) -> Result<Self> {
        let dir = if dir.join(SAVED_MODEL_FILE).is_file() {
            dir.to_path_buf()
        } else {
            latest_export(dir)?.ok_or_else(|| Error::Checkpoint {
                path: dir.to_path_buf(),
                reason: "no export found".to_string(),
            })?
        };
        let path = dir.join(SAVED_MODEL_FILE);
        let saved: SavedModel = serde_json::from_str(&fs::read_to_string(&path)?)?;
        let (mut net, _) = models::build(&saved.hparams)?;
        net.load_state(&saved.params)?;
        info!(
            "Loaded {} model exported at step {}",
            saved.hparams.model, saved.global_step
        );
        Ok(Self {
            hparams: saved.hparams,
            global_step: saved.global_step,
            signature: saved.signature,
            net,
            chunk_size: 1000,
        })
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn predict(&self, features: &Features) -> Result<Predictions> {
        predict_chunked(&self.net, &features.image, self.chunk_size)
    }
}

/// Run inference `chunk_size` rows at a time.
pub(crate) fn predict_chunked(
    net: &Sequential,
    images: &Matrix,
    chunk_size: usize,
) -> Result<Predictions> {
    let chunk_size = chunk_size.max(1);
    let mut parts = Vec::with_capacity(images.rows.div_ceil(chunk_size));
    let mut start = 0;
    while start < images.rows {
        let end = (start + chunk_size).min(images.rows);
        let features = Features {
            image: images.slice_rows(start, end),
        };
        parts.push(classifier::predict(net, &features)?);
        start = end;
    }
    if parts.is_empty() {
        return Ok(Predictions {
            probabilities: Matrix::zeros(0, net.output_dim()),
            classes: Vec::new(),
        });
    }
    Ok(Predictions::concat(parts))
}
