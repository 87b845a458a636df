//! The flat hyperparameter record handed to model constructors and the
//! helpers that derive run settings from it.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Examples seen by the default schedule: 10 000 steps at a batch of 512.
pub const DEFAULT_EXAMPLE_BUDGET: u64 = 10_000 * 512;

/// Tunable settings for one training run.
///
/// Deliberately carries neither the output directory nor the service-only
/// `job-dir` argument.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HParams {
    pub train_batch_size: usize,
    pub learning_rate: f32,
    pub train_steps: u64,
    pub model: String,
    /// Kernel size of the first CNN layer.
    pub ksize1: usize,
    /// Kernel size of the second CNN layer.
    pub ksize2: usize,
    /// Filters in the first CNN layer.
    pub nfil1: usize,
    /// Filters in the second CNN layer.
    pub nfil2: usize,
    /// Dropout probability.
    pub dprob: f32,
    pub batch_norm: bool,
}

impl Default for HParams {
    fn default() -> Self {
        Self {
            train_batch_size: 100,
            learning_rate: 0.01,
            train_steps: 0,
            model: "linear".to_string(),
            ksize1: 5,
            ksize2: 5,
            nfil1: 10,
            nfil2: 20,
            dprob: 0.25,
            batch_norm: false,
        }
    }
}

impl HParams {
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Step count derived from the batch size when `requested` is less than 1:
/// enough steps to cover [`DEFAULT_EXAMPLE_BUDGET`] examples. `None` when
/// `requested` is already a usable step count.
pub fn derived_train_steps(requested: i64, train_batch_size: usize) -> Option<u64> {
    (requested < 1).then(|| DEFAULT_EXAMPLE_BUDGET / train_batch_size.max(1) as u64)
}

/// Extract the hyperparameter-tuning trial id from a `TF_CONFIG` value.
///
/// Blank input, a missing `task` object or an empty `trial` all mean "no
/// trial". Input that is not JSON at all is an error.
pub fn trial_id(tf_config: Option<&str>) -> Result<Option<String>> {
    let Some(raw) = tf_config.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    let cfg: Value = serde_json::from_str(raw).map_err(Error::TfConfig)?;
    let trial = match cfg.get("task").and_then(|t| t.get("trial")) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };
    Ok(Some(trial).filter(|t| !t.is_empty()))
}

/// `output_dir` joined with the trial id when one is configured, so
/// concurrent tuning trials write to separate directories.
pub fn output_dir_for_trial(output_dir: &Path, tf_config: Option<&str>) -> Result<PathBuf> {
    Ok(match trial_id(tf_config)? {
        Some(trial) => output_dir.join(trial),
        None => output_dir.to_path_buf(),
    })
}
