//! Ties an [`Estimator`] to its train and eval inputs and runs the
//! train → evaluate → export lifecycle.

use std::path::{Path, PathBuf};

use log::info;

use crate::config::RunConfig;
use crate::data::{load_mnist, make_eval_input_fn, make_train_input_fn, InputFn, MnistData};
use crate::error::Result;
use crate::estimator::{EvalMetrics, Estimator};
use crate::hparams::HParams;

/// Where and under which name final exports are written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportStrategy {
    pub name: String,
}

impl ExportStrategy {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Export into `<output_dir>/export/<name>/`.
    pub fn export(&self, estimator: &Estimator, output_dir: &Path) -> Result<PathBuf> {
        let base = output_dir.join("export").join(&self.name);
        estimator.export_savedmodel(&base)
    }
}

pub struct Experiment {
    pub estimator: Estimator,
    pub train_input_fn: InputFn,
    pub eval_input_fn: InputFn,
    pub train_steps: u64,
    pub eval_steps: Option<u64>,
    pub min_eval_frequency: u64,
    pub export_strategies: Vec<ExportStrategy>,
}

/// Outcome of [`Experiment::train_and_evaluate`].
#[derive(Clone, Debug)]
pub struct RunSummary {
    pub metrics: EvalMetrics,
    pub exports: Vec<PathBuf>,
}

impl Experiment {
    /// Train in chunks of `min_eval_frequency` steps, evaluating after each
    /// chunk, then export with every strategy.
    pub fn train_and_evaluate(&mut self) -> Result<RunSummary> {
        let freq = self.min_eval_frequency.max(1);
        let mut metrics = None;
        while self.estimator.global_step() < self.train_steps {
            let before = self.estimator.global_step();
            let target = (before + freq).min(self.train_steps);
            let reached = self.estimator.train(&self.train_input_fn, target)?;
            metrics = Some(self.estimator.evaluate(&self.eval_input_fn, self.eval_steps)?);
            if reached < target {
                break;
            }
        }
        let metrics = match metrics {
            Some(m) => m,
            None => self.estimator.evaluate(&self.eval_input_fn, self.eval_steps)?,
        };

        let output_dir = self.estimator.model_dir().to_path_buf();
        let exports = self
            .export_strategies
            .iter()
            .map(|s| s.export(&self.estimator, &output_dir))
            .collect::<Result<Vec<_>>>()?;
        Ok(RunSummary { metrics, exports })
    }
}

/// Assemble the experiment for `output_dir` from already loaded data.
pub fn experiment_from_data(
    output_dir: &Path,
    data: &MnistData,
    config: RunConfig,
    hparams: HParams,
) -> Result<Experiment> {
    let config = config.resolved(hparams.train_steps);
    let train_input_fn = make_train_input_fn(data, &hparams);
    let eval_input_fn = make_eval_input_fn(data);
    let train_steps = hparams.train_steps;
    let eval_steps = Some(config.eval_steps);
    let min_eval_frequency = config.eval_every();
    info!(
        "Checkpoint every {} steps, evaluate every {} steps",
        config.checkpoint_every(),
        min_eval_frequency
    );
    let estimator = Estimator::new(output_dir, config, hparams)?;
    Ok(Experiment {
        estimator,
        train_input_fn,
        eval_input_fn,
        train_steps,
        eval_steps,
        min_eval_frequency,
        export_strategies: vec![ExportStrategy::new("Servo")],
    })
}

/// An experiment factory that loads MNIST from `data_dir` when invoked.
pub fn make_experiment_fn(
    data_dir: PathBuf,
    download: bool,
    config: RunConfig,
    hparams: HParams,
) -> impl FnOnce(&Path) -> Result<Experiment> {
    move |output_dir| {
        let data = load_mnist(&data_dir, download)?;
        experiment_from_data(output_dir, &data, config, hparams)
    }
}

pub mod learn_runner {
    use std::path::Path;

    use super::{Experiment, RunSummary};
    use crate::error::Result;

    /// Build the experiment for `output_dir` and run it to completion.
    pub fn run<F>(experiment_fn: F, output_dir: &Path) -> Result<RunSummary>
    where
        F: FnOnce(&Path) -> Result<Experiment>,
    {
        let mut experiment = experiment_fn(output_dir)?;
        experiment.train_and_evaluate()
    }
}
