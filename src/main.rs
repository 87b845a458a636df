use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use mnistmodel::cli::{init_logging, Cli};
use mnistmodel::experiment::{learn_runner, make_experiment_fn};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let tf_config = std::env::var("TF_CONFIG").ok();
    let run = cli
        .into_run(tf_config.as_deref())
        .context("failed to resolve run arguments")?;
    info!("Writing to {}", run.output_dir.display());

    let experiment_fn = make_experiment_fn(run.data_dir, run.download, run.run_config, run.hparams);
    let summary = learn_runner::run(experiment_fn, &run.output_dir)
        .with_context(|| format!("training run in {} failed", run.output_dir.display()))?;

    info!(
        "Finished at step {}: accuracy {:.4}, loss {:.4}",
        summary.metrics.global_step, summary.metrics.accuracy, summary.metrics.loss
    );
    for dir in &summary.exports {
        info!("Export: {}", dir.display());
    }
    Ok(())
}
