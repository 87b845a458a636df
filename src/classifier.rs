//! Turns network logits into predictions, loss, metrics and the training
//! update for one batch.

use crate::data::Features;
use crate::error::{Error, Result};
use crate::math::{softmax_cross_entropy, Matrix};
use crate::metrics::accuracy;
use crate::models::Sequential;
use crate::optim::Adam;

/// Name of the serving signature written to exports.
pub const SIGNATURE_NAME: &str = "classes";
/// Output tensors offered by the serving signature.
pub const EXPORT_OUTPUTS: [&str; 2] = ["probabilities", "classes"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Train,
    Eval,
    Predict,
}

/// Per-row class probabilities and the most likely class.
#[derive(Clone, Debug, PartialEq)]
pub struct Predictions {
    pub probabilities: Matrix,
    pub classes: Vec<u8>,
}

impl Predictions {
    fn from_logits(logits: &Matrix) -> Self {
        Self::from_probabilities(logits.softmax())
    }

    fn from_probabilities(probabilities: Matrix) -> Self {
        let classes = probabilities
            .argmax_rows()
            .into_iter()
            .map(|c| c as u8)
            .collect();
        Self {
            probabilities,
            classes,
        }
    }

    /// Join chunked predictions back into one.
    pub fn concat(parts: Vec<Predictions>) -> Self {
        let probs: Vec<Matrix> = parts.iter().map(|p| p.probabilities.clone()).collect();
        Self {
            probabilities: Matrix::vstack(&probs),
            classes: parts.into_iter().flat_map(|p| p.classes).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EvalMetricOps {
    pub accuracy: f32,
}

/// Everything the driver needs from one batch in a given mode.
#[derive(Clone, Debug)]
pub struct EstimatorSpec {
    pub mode: Mode,
    pub predictions: Predictions,
    /// Mean softmax cross-entropy. Absent in predict mode.
    pub loss: Option<f32>,
    /// Whether an optimizer step was applied.
    pub train_op: bool,
    pub eval_metric_ops: Option<EvalMetricOps>,
}

fn check_labels(labels: Option<&[u8]>, rows: usize, nclasses: usize) -> Result<Vec<usize>> {
    let labels = labels.unwrap_or(&[]);
    if labels.len() != rows {
        return Err(Error::Shape {
            context: "labels per image",
            expected: rows,
            actual: labels.len(),
        });
    }
    labels
        .iter()
        .map(|&l| {
            let l = l as usize;
            if l < nclasses {
                Ok(l)
            } else {
                Err(Error::Shape {
                    context: "label value",
                    expected: nclasses,
                    actual: l,
                })
            }
        })
        .collect()
}

/// Inference only.
pub fn predict(net: &Sequential, features: &Features) -> Result<Predictions> {
    let logits = net.forward(&features.image)?;
    Ok(Predictions::from_logits(&logits))
}

/// Loss and accuracy without touching the weights.
pub fn evaluate(net: &Sequential, features: &Features, labels: &[u8]) -> Result<EstimatorSpec> {
    let targets = check_labels(Some(labels), features.image.rows, net.output_dim())?;
    let logits = net.forward(&features.image)?;
    let (loss, _grad, probs) = softmax_cross_entropy(&logits, &targets);
    let predictions = Predictions::from_probabilities(probs);
    let acc = accuracy(&predictions.classes, labels);
    Ok(EstimatorSpec {
        mode: Mode::Eval,
        predictions,
        loss: Some(loss),
        train_op: false,
        eval_metric_ops: Some(EvalMetricOps { accuracy: acc }),
    })
}

/// Assemble the [`EstimatorSpec`] for one batch.
///
/// In `Train` mode this runs the training forward pass (dropout active,
/// batch statistics updated), backpropagates the mean cross-entropy and
/// applies one Adam step.
pub fn image_classifier(
    net: &mut Sequential,
    optimizer: &mut Adam,
    features: &Features,
    labels: Option<&[u8]>,
    mode: Mode,
) -> Result<EstimatorSpec> {
    match mode {
        Mode::Predict => Ok(EstimatorSpec {
            mode,
            predictions: predict(net, features)?,
            loss: None,
            train_op: false,
            eval_metric_ops: None,
        }),
        Mode::Eval => evaluate(net, features, labels.unwrap_or(&[])),
        Mode::Train => {
            let targets = check_labels(labels, features.image.rows, net.output_dim())?;
            net.zero_grad();
            let logits = net.forward_train(&features.image)?;
            let (loss, grad, probs) = softmax_cross_entropy(&logits, &targets);
            net.backward(&grad);
            optimizer.step(&mut net.params_mut());

            let predictions = Predictions::from_probabilities(probs);
            let acc = accuracy(&predictions.classes, labels.unwrap_or(&[]));
            Ok(EstimatorSpec {
                mode,
                predictions,
                loss: Some(loss),
                train_op: true,
                eval_metric_ops: Some(EvalMetricOps { accuracy: acc }),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::Linear;

    fn tiny_net() -> Sequential {
        Sequential::new(2).with(Linear::new(2, 3)).unwrap()
    }

    fn features() -> Features {
        Features {
            image: Matrix::from_vec(4, 2, vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0, -1.0, 0.0]),
        }
    }

    #[test]
    fn predict_mode_has_no_loss() {
        let mut net = tiny_net();
        let mut opt = Adam::with_lr(0.1);
        let spec = image_classifier(&mut net, &mut opt, &features(), None, Mode::Predict).unwrap();
        assert!(spec.loss.is_none());
        assert!(spec.eval_metric_ops.is_none());
        assert!(!spec.train_op);
        assert_eq!(spec.predictions.len(), 4);
        assert_eq!(opt.t, 0);
        for r in 0..4 {
            let sum: f32 = spec.predictions.probabilities.row(r).iter().sum();
            assert!((sum - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn train_mode_reduces_loss() {
        let mut net = tiny_net();
        let mut opt = Adam::with_lr(0.1);
        let labels = [0u8, 1, 2, 0];
        let first = evaluate(&net, &features(), &labels).unwrap().loss.unwrap();
        for _ in 0..300 {
            let spec =
                image_classifier(&mut net, &mut opt, &features(), Some(&labels), Mode::Train).unwrap();
            assert!(spec.train_op);
        }
        let last = evaluate(&net, &features(), &labels).unwrap();
        assert!(last.loss.unwrap() < first);
        assert!(last.eval_metric_ops.unwrap().accuracy >= 0.75);
        assert_eq!(opt.t, 300);
    }

    #[test]
    fn rejects_bad_labels() {
        let mut net = tiny_net();
        let mut opt = Adam::with_lr(0.1);
        let f = features();
        assert!(image_classifier(&mut net, &mut opt, &f, None, Mode::Train).is_err());
        assert!(evaluate(&net, &f, &[0, 1, 5, 0]).is_err());
        assert_eq!(opt.t, 0);
    }

    #[test]
    fn concat_keeps_row_order() {
        let net = tiny_net();
        let f = features();
        let whole = predict(&net, &f).unwrap();
        let parts = vec![
            predict(&net, &Features { image: f.image.slice_rows(0, 3) }).unwrap(),
            predict(&net, &Features { image: f.image.slice_rows(3, 4) }).unwrap(),
        ];
        assert_eq!(Predictions::concat(parts), whole);
    }
}
