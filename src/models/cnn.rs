use super::{Sequential, HEIGHT, NCHANNELS, NCLASSES, WIDTH};
use crate::error::Result;
use crate::hparams::HParams;
use crate::layers::{BatchNorm, Conv2d, Dropout, Linear, MaxPool2d, ReLU};

const DENSE_UNITS: usize = 300;

/// Two convolution blocks followed by a dense head.
///
/// ```text
/// conv(ksize1, nfil1, same) relu -> maxpool 2/2      28x28 -> 14x14
/// conv(ksize2, nfil2, same) relu -> maxpool 2/2      14x14 -> 7x7
/// dense 300 [batch_norm] relu -> dropout(dprob) -> dense 10 [batch_norm]
/// ```
pub fn cnn_model(hparams: &HParams) -> Result<Sequential> {
    let c1 = Conv2d::new(NCHANNELS, HEIGHT, WIDTH, hparams.nfil1, hparams.ksize1, 1);
    let (h1, w1) = c1.out_hw();
    let p1 = MaxPool2d::new(hparams.nfil1, h1, w1, 2, 2);
    let (h2, w2) = p1.out_hw();
    let c2 = Conv2d::new(hparams.nfil1, h2, w2, hparams.nfil2, hparams.ksize2, 1);
    let (h3, w3) = c2.out_hw();
    let p2 = MaxPool2d::new(hparams.nfil2, h3, w3, 2, 2);
    let (h4, w4) = p2.out_hw();
    let flat = hparams.nfil2 * h4 * w4;

    let mut net = Sequential::new(HEIGHT * WIDTH * NCHANNELS)
        .with(c1)?
        .with(ReLU::new())?
        .with(p1)?
        .with(c2)?
        .with(ReLU::new())?
        .with(p2)?
        .with(Linear::new(flat, DENSE_UNITS))?;
    if hparams.batch_norm {
        net = net.with(BatchNorm::new(DENSE_UNITS))?;
    }
    net = net
        .with(ReLU::new())?
        .with(Dropout::new(hparams.dprob))?
        .with(Linear::new(DENSE_UNITS, NCLASSES))?;
    if hparams.batch_norm {
        net = net.with(BatchNorm::new(NCLASSES))?;
    }
    Ok(net)
}
