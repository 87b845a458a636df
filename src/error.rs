use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the training runtime.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown model `{name}`; supported models are {available:?}")]
    UnknownModel {
        name: String,
        available: Vec<&'static str>,
    },

    #[error("MNIST file {path} not found (pass --download to fetch it)")]
    MissingData { path: PathBuf },

    #[error("TF_CONFIG is not valid JSON: {0}")]
    TfConfig(#[source] serde_json::Error),

    #[error("shape mismatch in {context}: expected {expected}, got {actual}")]
    Shape {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("parameter {index}: expected shape {expected:?}, found {found:?}")]
    ParamShape {
        index: usize,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("checkpoint {path}: {reason}")]
    Checkpoint { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
