//! A managed training loop around one network: restores from and saves
//! checkpoints in its model directory, evaluates and exports.

use std::fs;
use std::path::{Path, PathBuf};

use indicatif::ProgressBar;
use log::{debug, info, warn};
use serde::Serialize;

use crate::checkpoint::{self, Checkpoint};
use crate::classifier::{image_classifier, Mode, Predictions};
use crate::config::RunConfig;
use crate::data::{Features, InputFn};
use crate::error::{Error, Result};
use crate::export::{self, SavedModel, Signature};
use crate::hparams::HParams;
use crate::logging::{Logger, MetricRecord};
use crate::math::{self, Matrix};
use crate::metrics::Mean;
use crate::models::{self, Sequential};
use crate::optim::Adam;

pub const HPARAMS_FILE: &str = "hparams.json";

/// Result of one evaluation pass.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct EvalMetrics {
    pub loss: f32,
    pub accuracy: f32,
    pub global_step: u64,
}

pub struct Estimator {
    model_dir: PathBuf,
    config: RunConfig,
    hparams: HParams,
    net: Sequential,
    optimizer: Adam,
    global_step: u64,
    last_saved: Option<u64>,
    logger: Logger,
}

impl Estimator {
    /// Build the network named by `hparams.model` and restore the latest
    /// checkpoint in `model_dir` when there is one.
    pub fn new(model_dir: &Path, config: RunConfig, hparams: HParams) -> Result<Self> {
        fs::create_dir_all(model_dir)?;
        let (net, nclasses) = models::build(&hparams)?;
        info!(
            "Built {} model: {} classes, {} trainable parameters, layers {:?}",
            hparams.model,
            nclasses,
            net.num_trainable(),
            net.layer_names()
        );
        let mut estimator = Self {
            model_dir: model_dir.to_path_buf(),
            logger: Logger::new(model_dir)?,
            optimizer: Adam::with_lr(hparams.learning_rate),
            config,
            hparams,
            net,
            global_step: 0,
            last_saved: None,
        };
        estimator.restore()?;
        estimator.hparams.save(&model_dir.join(HPARAMS_FILE))?;
        Ok(estimator)
    }

    fn restore(&mut self) -> Result<()> {
        let Some(path) = checkpoint::latest(&self.model_dir)? else {
            return Ok(());
        };
        let ckpt = checkpoint::load(&path)?;
        if ckpt.model != self.hparams.model {
            return Err(Error::Checkpoint {
                path,
                reason: format!(
                    "written by model `{}`, cannot restore into `{}`",
                    ckpt.model, self.hparams.model
                ),
            });
        }
        self.net.load_state(&ckpt.params)?;
        self.optimizer = ckpt.optimizer;
        self.optimizer.lr = self.hparams.learning_rate;
        self.global_step = ckpt.global_step;
        self.last_saved = Some(ckpt.global_step);
        info!(
            "Restored {} at global step {}",
            path.display(),
            self.global_step
        );
        Ok(())
    }

    fn save_checkpoint(&mut self) -> Result<()> {
        let ckpt = Checkpoint {
            global_step: self.global_step,
            model: self.hparams.model.clone(),
            optimizer: self.optimizer.clone(),
            params: self.net.state(true),
        };
        checkpoint::save(&self.model_dir, &ckpt, self.config.keep_checkpoint_max)?;
        self.last_saved = Some(self.global_step);
        Ok(())
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    pub fn hparams(&self) -> &HParams {
        &self.hparams
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn global_step(&self) -> u64 {
        self.global_step
    }

    pub fn network(&self) -> &Sequential {
        &self.net
    }

    /// Train until the global step reaches `max_steps` or the input runs
    /// out. Returns the global step reached.
    pub fn train(&mut self, input_fn: &InputFn, max_steps: u64) -> Result<u64> {
        if self.global_step >= max_steps {
            info!(
                "Skipping training: global step {} already at or past {}",
                self.global_step, max_steps
            );
            return Ok(self.global_step);
        }
        let save_every = self.config.checkpoint_every();
        let log_every = self.config.log_every_steps.max(1);
        let mut input = input_fn();
        let mut loss = Mean::default();
        let mut acc = Mean::default();

        math::reset_matrix_ops();
        let pb = ProgressBar::new(max_steps - self.global_step);
        while self.global_step < max_steps {
            let Some(batch) = input.next() else {
                warn!("Training input exhausted at step {}", self.global_step);
                break;
            };
            let spec = image_classifier(
                &mut self.net,
                &mut self.optimizer,
                &batch.features,
                Some(&batch.labels),
                Mode::Train,
            )?;
            self.global_step += 1;
            loss.update(spec.loss.unwrap_or(0.0), 1);
            acc.update(spec.eval_metric_ops.map_or(0.0, |m| m.accuracy), 1);

            if self.global_step % log_every == 0 {
                let record = MetricRecord {
                    step: self.global_step,
                    loss: loss.result(),
                    accuracy: acc.result(),
                    lr: self.optimizer.lr,
                    kind: "train",
                };
                debug!(
                    "step {} loss {:.4} accuracy {:.4}",
                    record.step, record.loss, record.accuracy
                );
                pb.set_message(format!("loss {:.4}", record.loss));
                self.logger.log(&record);
                loss = Mean::default();
                acc = Mean::default();
            }
            if self.global_step % save_every == 0 {
                self.save_checkpoint()?;
            }
            pb.inc(1);
        }
        if self.last_saved != Some(self.global_step) {
            self.save_checkpoint()?;
        }
        pb.finish_with_message("training done");
        debug!("Total matrix ops: {}", math::matrix_ops_count());
        Ok(self.global_step)
    }

    /// Evaluate on up to `steps` batches (all batches when `None`).
    /// Rows are fed through the network `eval_chunk_size` at a time and the
    /// metrics are averaged over examples.
    pub fn evaluate(&mut self, input_fn: &InputFn, steps: Option<u64>) -> Result<EvalMetrics> {
        let chunk = self.config.eval_chunk_size.max(1);
        let mut loss = Mean::default();
        let mut acc = Mean::default();
        let mut input = input_fn();
        let mut taken = 0u64;
        while steps.map_or(true, |s| taken < s) {
            let Some(batch) = input.next() else {
                break;
            };
            taken += 1;
            let mut start = 0;
            while start < batch.len() {
                let end = (start + chunk).min(batch.len());
                let features = Features {
                    image: batch.features.image.slice_rows(start, end),
                };
                let spec = image_classifier(
                    &mut self.net,
                    &mut self.optimizer,
                    &features,
                    Some(&batch.labels[start..end]),
                    Mode::Eval,
                )?;
                let n = end - start;
                loss.update(spec.loss.unwrap_or(0.0), n);
                acc.update(spec.eval_metric_ops.map_or(0.0, |m| m.accuracy), n);
                start = end;
            }
        }
        let metrics = EvalMetrics {
            loss: loss.result(),
            accuracy: acc.result(),
            global_step: self.global_step,
        };
        info!(
            "Saving dict for global step {}: accuracy = {:.4}, global_step = {}, loss = {:.4}",
            metrics.global_step, metrics.accuracy, metrics.global_step, metrics.loss
        );
        self.logger.log(&MetricRecord {
            step: metrics.global_step,
            loss: metrics.loss,
            accuracy: metrics.accuracy,
            lr: self.optimizer.lr,
            kind: "eval",
        });
        Ok(metrics)
    }

    pub fn predict(&self, images: &Matrix) -> Result<Predictions> {
        export::predict_chunked(&self.net, images, self.config.eval_chunk_size)
    }

    /// Write a serving export under `export_dir_base/<timestamp>/`.
    pub fn export_savedmodel(&self, export_dir_base: &Path) -> Result<PathBuf> {
        let saved = SavedModel {
            global_step: self.global_step,
            hparams: self.hparams.clone(),
            signature: Signature::classes(),
            params: self.net.state(false),
        };
        export::write_saved_model(export_dir_base, &saved)
    }
}
