//! Image model variants and the name → constructor registry.

pub mod cnn;
pub mod dense;
pub mod sequential;

pub use cnn::cnn_model;
pub use dense::{dnn_dropout_model, dnn_model, linear_model};
pub use sequential::Sequential;

use crate::error::{Error, Result};
use crate::hparams::HParams;

pub const HEIGHT: usize = 28;
pub const WIDTH: usize = 28;
pub const NCHANNELS: usize = 1;
pub const NCLASSES: usize = 10;

/// Builds a network mapping `HEIGHT * WIDTH * NCHANNELS` features to
/// `NCLASSES` logits.
pub type ModelFn = fn(&HParams) -> Result<Sequential>;

/// Every model selectable with `--model`.
pub const MODELS: &[(&str, ModelFn)] = &[
    ("linear", linear_model),
    ("dnn", dnn_model),
    ("dnn_dropout", dnn_dropout_model),
    ("cnn", cnn_model),
];

pub fn model_names() -> Vec<&'static str> {
    MODELS.iter().map(|(name, _)| *name).collect()
}

/// Help text for the `--model` flag.
pub fn model_help() -> String {
    format!("Type of model. Supported types are {:?}", model_names())
}

/// Resolve a model name. Unknown names are an error; there is no fallback.
pub fn lookup(name: &str) -> Result<ModelFn> {
    MODELS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, f)| *f)
        .ok_or_else(|| Error::UnknownModel {
            name: name.to_string(),
            available: model_names(),
        })
}

/// Look up `hparams.model` and build it, returning the network and its
/// class count.
pub fn build(hparams: &HParams) -> Result<(Sequential, usize)> {
    let model_fn = lookup(&hparams.model)?;
    let net = model_fn(hparams)?;
    let nclasses = net.output_dim();
    Ok((net, nclasses))
}
