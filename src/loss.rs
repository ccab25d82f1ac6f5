//! Loss functions
//!
//! A loss reduces a batch of predictions and targets to a single [`Value`] which can be
//! backpropagated through the model.

use thiserror::Error;

use crate::{nn::log_softmax, tensor::Tensor, values::Value};

/// Errors raised while computing a loss
#[derive(Debug, Error)]
pub enum LossError {
    #[error("Cannot compute a loss over an empty batch")]
    EmptyBatch,
    #[error("Predictions hold {pred} values but targets hold {target}")]
    SizeMismatch { pred: usize, target: usize },
    #[error("Predictions have {pred} samples but targets have {target}")]
    SampleCountMismatch { pred: usize, target: usize },
    #[error("Target class {class} is not one of the {n_classes} predicted classes")]
    ClassOutOfRange { class: f32, n_classes: usize },
}

/// Common interface for losses, analogous to `torch.nn.modules.loss._Loss`
pub trait Loss {
    fn call(&self, y_pred: &Tensor, y_true: &Tensor) -> Result<Value, LossError>;
}

/// Mean Squared Error, averaged over every element of the batch
#[derive(Debug, Default, Clone, Copy)]
pub struct MSELoss;

impl Loss for MSELoss {
    fn call(&self, y_pred: &Tensor, y_true: &Tensor) -> Result<Value, LossError> {
        let (pred, target) = (y_pred.values(), y_true.values());
        if pred.len() != target.len() {
            return Err(LossError::SizeMismatch {
                pred: pred.len(),
                target: target.len(),
            });
        }
        if pred.is_empty() {
            return Err(LossError::EmptyBatch);
        }
        let two = Value::new(2.0);
        let loss = pred
            .iter()
            .zip(target.iter())
            .map(|(a, b)| (a - b).pow(&two))
            .sum::<Value>();
        Ok(loss / Value::new(pred.len() as f32))
    }
}

/// Cross entropy between logits of shape `[N, C]` and targets, averaged over samples.
///
/// Targets are either class indices (shape `[N]` or `[N, 1]`) or a distribution over the
/// `C` classes per sample (e.g. one hot encoded labels, shape `[N, C]`).
#[derive(Debug, Default, Clone, Copy)]
pub struct CrossEntropyLoss;

impl Loss for CrossEntropyLoss {
    fn call(&self, y_pred: &Tensor, y_true: &Tensor) -> Result<Value, LossError> {
        if y_pred.len() != y_true.len() {
            return Err(LossError::SampleCountMismatch {
                pred: y_pred.len(),
                target: y_true.len(),
            });
        }
        if y_pred.is_empty() {
            return Err(LossError::EmptyBatch);
        }
        let n_classes = y_pred.sample_len();
        let target_width = y_true.sample_len();
        if target_width != 1 && target_width != n_classes {
            return Err(LossError::SizeMismatch {
                pred: y_pred.values().len(),
                target: y_true.values().len(),
            });
        }

        let mut per_sample = Vec::with_capacity(y_pred.len());
        for (logits, target) in y_pred.samples().zip(y_true.samples()) {
            let log_probs = log_softmax(logits);
            let nll = if target_width == 1 && n_classes != 1 {
                let class = target[0].data();
                if class < 0.0 || class.fract() != 0.0 || class as usize >= n_classes {
                    return Err(LossError::ClassOutOfRange { class, n_classes });
                }
                -&log_probs[class as usize]
            } else {
                -&log_probs
                    .iter()
                    .zip(target.iter())
                    .map(|(lp, t)| lp * t)
                    .sum::<Value>()
            };
            per_sample.push(nll);
        }
        let n = per_sample.len() as f32;
        Ok(per_sample.into_iter().sum::<Value>() / Value::new(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_eq_float;

    #[test]
    fn test_mse_loss() {
        let y_pred = Tensor::new(vec![2.0, 3.0], &[2, 1]).unwrap();
        let y_true = Tensor::new(vec![1.0, 5.0], &[2, 1]).unwrap();
        let loss = MSELoss.call(&y_pred, &y_true).unwrap();
        assert_eq!(loss.data(), 2.5);

        loss.backward();
        // dloss / dy_pred = 1/N * 2 * (y_pred - y_true)
        assert_eq!(y_pred.values()[0].grad(), 1.0);
        assert_eq!(y_pred.values()[1].grad(), -2.0);
        assert_eq!(y_true.values()[0].grad(), -1.0);
        assert_eq!(y_true.values()[1].grad(), 2.0);
    }

    #[test]
    fn test_mse_size_mismatch() {
        let y_pred = Tensor::new(vec![2.0, 3.0], &[2]).unwrap();
        let y_true = Tensor::new(vec![1.0], &[1]).unwrap();
        assert!(matches!(
            MSELoss.call(&y_pred, &y_true),
            Err(LossError::SizeMismatch { pred: 2, target: 1 })
        ));
    }

    #[test]
    fn test_cross_entropy_with_class_indices() {
        let logits = Tensor::new(vec![1.0, 2.0, 0.0, 0.0], &[2, 2]).unwrap();
        let targets = Tensor::new(vec![1.0, 0.0], &[2]).unwrap();
        let loss = CrossEntropyLoss.call(&logits, &targets).unwrap();
        let expected = (-(0.7310585f32.ln()) - 0.5f32.ln()) / 2.0;
        assert_eq_float!(loss.data(), expected);

        loss.backward();
        // d loss / d logit = (softmax - onehot) / N
        assert_eq_float!(logits.values()[0].grad(), 0.2689414 / 2.0);
        assert_eq_float!(logits.values()[1].grad(), (0.7310585 - 1.0) / 2.0);
    }

    #[test]
    fn test_cross_entropy_one_hot_matches_indices() {
        let logits = Tensor::new(vec![0.5, -1.0, 2.0, 0.3, 0.3, 0.1], &[2, 3]).unwrap();
        let indices = Tensor::new(vec![2.0, 0.0], &[2, 1]).unwrap();
        let one_hot = Tensor::new(vec![0.0, 0.0, 1.0, 1.0, 0.0, 0.0], &[2, 3]).unwrap();
        let a = CrossEntropyLoss.call(&logits, &indices).unwrap();
        let b = CrossEntropyLoss.call(&logits, &one_hot).unwrap();
        assert_eq_float!(a.data(), b.data());
    }

    #[test]
    fn test_cross_entropy_errors() {
        let logits = Tensor::new(vec![1.0, 2.0], &[1, 2]).unwrap();
        let bad_class = Tensor::new(vec![2.0], &[1]).unwrap();
        assert!(matches!(
            CrossEntropyLoss.call(&logits, &bad_class),
            Err(LossError::ClassOutOfRange { n_classes: 2, .. })
        ));
        let too_many = Tensor::new(vec![0.0, 1.0], &[2]).unwrap();
        assert!(matches!(
            CrossEntropyLoss.call(&logits, &too_many),
            Err(LossError::SampleCountMismatch { pred: 1, target: 2 })
        ));
        let empty = Tensor::zeros(&[0, 2]).unwrap();
        let no_targets = Tensor::zeros(&[0]).unwrap();
        assert!(matches!(
            CrossEntropyLoss.call(&empty, &no_targets),
            Err(LossError::EmptyBatch)
        ));
    }
}
