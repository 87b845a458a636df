pub mod checkpoint;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod estimator;
pub mod experiment;
pub mod export;
pub mod hparams;
pub mod layers;
pub mod logging;
pub mod math;
pub mod metrics;
pub mod models;
pub mod optim;
pub mod rng;

pub use error::{Error, Result};
