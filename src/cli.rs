//! Command-line flags for the trainer and their conversion into a run.

use std::path::PathBuf;

use clap::Parser;
use log::info;

use crate::config::RunConfig;
use crate::error::Result;
use crate::hparams::{derived_train_steps, output_dir_for_trial, HParams};
use crate::models::model_help;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Train an MNIST digit classifier")]
pub struct Cli {
    /// Batch size for training steps
    #[arg(long = "train_batch_size", default_value_t = 100, value_parser = clap::value_parser!(u64).range(1..))]
    pub train_batch_size: u64,

    /// Initial learning rate for training
    #[arg(long = "learning_rate", default_value_t = 0.01)]
    pub learning_rate: f32,

    /// Steps to run the training job for. A number less than 1 derives it from the batch size
    #[arg(long = "train_steps", default_value_t = 0, allow_negative_numbers = true)]
    pub train_steps: i64,

    /// GCS location to write checkpoints and export models
    #[arg(long = "output_dir")]
    pub output_dir: PathBuf,

    #[arg(long, default_value = "linear", help = model_help())]
    pub model: String,

    /// Accepted for compatibility with training services; ignored
    #[arg(long = "job-dir", alias = "job_dir", default_value = "junk")]
    pub job_dir: String,

    /// Kernel size of first layer for CNN
    #[arg(long, default_value_t = 5)]
    pub ksize1: usize,

    /// Kernel size of second layer for CNN
    #[arg(long, default_value_t = 5)]
    pub ksize2: usize,

    /// Number of filters in first layer for CNN
    #[arg(long, default_value_t = 10)]
    pub nfil1: usize,

    /// Number of filters in second layer for CNN
    #[arg(long, default_value_t = 20)]
    pub nfil2: usize,

    /// Dropout probability for CNN
    #[arg(long, default_value_t = 0.25)]
    pub dprob: f32,

    /// If specified, use batch normalization
    #[arg(long = "batch_norm")]
    pub batch_norm: bool,

    /// Directory holding the MNIST IDX files
    #[arg(long = "data_dir", default_value = "mnist/data")]
    pub data_dir: PathBuf,

    /// Download MNIST into --data_dir when files are missing
    #[arg(long)]
    pub download: bool,

    /// TOML or JSON file overriding checkpoint/eval cadence
    #[arg(long = "run_config")]
    pub run_config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Everything the trainer binary needs after argument processing.
#[derive(Clone, Debug)]
pub struct TrainingRun {
    pub output_dir: PathBuf,
    pub data_dir: PathBuf,
    pub download: bool,
    pub run_config: RunConfig,
    pub hparams: HParams,
}

impl Cli {
    /// Resolve the output directory against `TF_CONFIG`, derive the step
    /// count and strip the service-only arguments from the hyperparameters.
    pub fn into_run(self, tf_config: Option<&str>) -> Result<TrainingRun> {
        let output_dir = output_dir_for_trial(&self.output_dir, tf_config)?;
        let batch = self.train_batch_size as usize;
        let train_steps = match derived_train_steps(self.train_steps, batch) {
            Some(steps) => {
                info!("Training for {} steps", steps);
                steps
            }
            None => self.train_steps as u64,
        };

        let run_config = match &self.run_config {
            Some(path) => RunConfig::from_path(path)?,
            None => RunConfig::default(),
        };
        let hparams = HParams {
            train_batch_size: batch,
            learning_rate: self.learning_rate,
            train_steps,
            model: self.model,
            ksize1: self.ksize1,
            ksize2: self.ksize2,
            nfil1: self.nfil1,
            nfil2: self.nfil2,
            dprob: self.dprob,
            batch_norm: self.batch_norm,
        };
        Ok(TrainingRun {
            output_dir,
            data_dir: self.data_dir,
            download: self.download,
            run_config,
            hparams,
        })
    }
}

/// Initialise `env_logger`; `RUST_LOG` wins over the verbosity flag.
pub fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}
