use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Checkpoint, evaluation and logging cadence for a training run.
///
/// Loaded from a TOML or JSON file; absent fields keep their defaults and the
/// two frequencies left as `None` are derived from the step count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Steps between checkpoints. Derived when unset.
    pub save_checkpoints_steps: Option<u64>,
    /// Newest checkpoints kept on disk.
    pub keep_checkpoint_max: usize,
    /// Minimum training steps between evaluations. Derived when unset.
    pub min_eval_frequency: Option<u64>,
    /// Batches drawn from the evaluation input per evaluation.
    pub eval_steps: u64,
    /// Rows pushed through the network at once during evaluation/serving.
    pub eval_chunk_size: usize,
    /// Steps between training metric log lines.
    pub log_every_steps: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            save_checkpoints_steps: None,
            keep_checkpoint_max: 5,
            min_eval_frequency: None,
            eval_steps: 1,
            eval_chunk_size: 1000,
            log_every_steps: 100,
        }
    }
}

/// `max(1, min(100, train_steps / 100))`
pub fn default_save_checkpoints_steps(train_steps: u64) -> u64 {
    (train_steps / 100).clamp(1, 100)
}

/// `max(1, min(2000, train_steps / 5))`
pub fn default_min_eval_frequency(train_steps: u64) -> u64 {
    (train_steps / 5).clamp(1, 2000)
}

impl RunConfig {
    /// Load configuration from the given path. Supports TOML or JSON based on
    /// the file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        if path.extension().is_some_and(|e| e == "json") {
            Ok(serde_json::from_str(&content)?)
        } else {
            Ok(toml::from_str(&content)?)
        }
    }

    /// Fill the derived frequencies for a run of `train_steps` steps.
    pub fn resolved(mut self, train_steps: u64) -> Self {
        let save = self
            .save_checkpoints_steps
            .unwrap_or_else(|| default_save_checkpoints_steps(train_steps));
        let eval = self
            .min_eval_frequency
            .unwrap_or_else(|| default_min_eval_frequency(train_steps));
        self.save_checkpoints_steps = Some(save.max(1));
        self.min_eval_frequency = Some(eval.max(1));
        self.eval_chunk_size = self.eval_chunk_size.max(1);
        self.log_every_steps = self.log_every_steps.max(1);
        self
    }

    pub fn checkpoint_every(&self) -> u64 {
        self.save_checkpoints_steps.unwrap_or(1).max(1)
    }

    pub fn eval_every(&self) -> u64 {
        self.min_eval_frequency.unwrap_or(1).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn derived_frequencies() {
        assert_eq!(default_save_checkpoints_steps(51_200), 100);
        assert_eq!(default_save_checkpoints_steps(5_000), 50);
        assert_eq!(default_save_checkpoints_steps(50), 1);
        assert_eq!(default_min_eval_frequency(51_200), 2000);
        assert_eq!(default_min_eval_frequency(500), 100);
        assert_eq!(default_min_eval_frequency(3), 1);
    }

    #[test]
    fn resolved_keeps_explicit_values() {
        let cfg = RunConfig {
            save_checkpoints_steps: Some(7),
            ..RunConfig::default()
        }
        .resolved(51_200);
        assert_eq!(cfg.checkpoint_every(), 7);
        assert_eq!(cfg.eval_every(), 2000);
    }

    #[test]
    fn partial_toml_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let toml_path = dir.path().join("run.toml");
        let mut f = fs::File::create(&toml_path).unwrap();
        writeln!(f, "keep_checkpoint_max = 2\nsave_checkpoints_steps = 10").unwrap();
        let cfg = RunConfig::from_path(&toml_path).unwrap();
        assert_eq!(cfg.keep_checkpoint_max, 2);
        assert_eq!(cfg.save_checkpoints_steps, Some(10));
        assert_eq!(cfg.eval_steps, 1);

        let json_path = dir.path().join("run.json");
        fs::write(&json_path, r#"{"eval_chunk_size": 250}"#).unwrap();
        let cfg = RunConfig::from_path(&json_path).unwrap();
        assert_eq!(cfg.eval_chunk_size, 250);
        assert_eq!(cfg.keep_checkpoint_max, 5);
    }
}
