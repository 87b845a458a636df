use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use serde_json::json;

use mnistmodel::cli::init_logging;
use mnistmodel::data::{load_mnist, Features};
use mnistmodel::export::ServingModel;
use mnistmodel::metrics::accuracy;

/// Classify MNIST test images with an exported model.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Export directory, or an export base holding timestamped exports
    #[arg(long = "export_dir")]
    export_dir: PathBuf,

    /// Directory holding the MNIST IDX files
    #[arg(long = "data_dir", default_value = "mnist/data")]
    data_dir: PathBuf,

    /// Download MNIST into --data_dir when files are missing
    #[arg(long)]
    download: bool,

    /// Number of test images to classify
    #[arg(long, default_value_t = 10)]
    count: usize,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let model = ServingModel::load(&args.export_dir)
        .with_context(|| format!("loading export from {}", args.export_dir.display()))?;
    let data = load_mnist(&args.data_dir, args.download).context("loading MNIST")?;

    let n = args.count.min(data.test.len());
    let features = Features {
        image: data.test.images.slice_rows(0, n),
    };
    let labels = &data.test.labels[..n];
    let preds = model.predict(&features)?;

    for (i, (&class, &label)) in preds.classes.iter().zip(labels).enumerate() {
        let line = json!({
            "index": i,
            "class": class,
            "label": label,
            "probabilities": preds.probabilities.row(i),
        });
        println!("{line}");
    }
    info!(
        "Accuracy on {} images: {:.4}",
        n,
        accuracy(&preds.classes, labels)
    );
    Ok(())
}
