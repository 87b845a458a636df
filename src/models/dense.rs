use super::{Sequential, HEIGHT, NCHANNELS, NCLASSES, WIDTH};
use crate::error::Result;
use crate::hparams::HParams;
use crate::layers::{Dropout, Linear, ReLU};

const INPUT_DIM: usize = HEIGHT * WIDTH * NCHANNELS;
const HIDDEN: [usize; 3] = [300, 100, 30];

/// Multinomial logistic regression on the flattened image.
pub fn linear_model(_hparams: &HParams) -> Result<Sequential> {
    Sequential::new(INPUT_DIM).with(Linear::new(INPUT_DIM, NCLASSES))
}

fn hidden_stack() -> Result<Sequential> {
    let mut net = Sequential::new(INPUT_DIM);
    let mut width = INPUT_DIM;
    for h in HIDDEN {
        net = net.with(Linear::new(width, h))?.with(ReLU::new())?;
        width = h;
    }
    Ok(net)
}

/// Three ReLU hidden layers (300, 100, 30) followed by the logits layer.
pub fn dnn_model(_hparams: &HParams) -> Result<Sequential> {
    hidden_stack()?.with(Linear::new(HIDDEN[2], NCLASSES))
}

/// [`dnn_model`] with dropout (`dprob`) after the last hidden layer.
pub fn dnn_dropout_model(hparams: &HParams) -> Result<Sequential> {
    hidden_stack()?
        .with(Dropout::new(hparams.dprob))?
        .with(Linear::new(HIDDEN[2], NCLASSES))
}
