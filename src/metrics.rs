//! Metrics reported during training
//!
//! A metric scores predictions against targets. Unlike a [`crate::loss::Loss`] it only
//! reads values and is never backpropagated.

use crate::tensor::{Tensor, TensorError};

/// A named scoring function `metric(y_true, y_pred)`
pub trait Metric {
    /// Key the metric is logged under, before any `train_`/`val_` prefix
    fn name(&self) -> &str;
    fn compute(&self, y_true: &Tensor, y_pred: &Tensor) -> Result<f32, TensorError>;
}

/// Fraction of samples whose predicted class matches the target class.
///
/// Predicted classes are the argmax of each prediction. Targets are class indices
/// (one value per sample) or one hot rows, in which case their argmax is used.
#[derive(Debug, Default, Clone, Copy)]
pub struct Accuracy;

impl Metric for Accuracy {
    fn name(&self) -> &str {
        "accuracy"
    }

    fn compute(&self, y_true: &Tensor, y_pred: &Tensor) -> Result<f32, TensorError> {
        y_true.check_same_len(y_pred)?;
        if y_true.is_empty() {
            return Ok(0.0);
        }
        let predicted = y_pred.argmax();
        let correct = if y_true.sample_len() == 1 {
            y_true
                .samples()
                .zip(predicted.iter())
                .filter(|(t, p)| t[0].data() as usize == **p && t[0].data() >= 0.0)
                .count()
        } else {
            y_true
                .argmax()
                .iter()
                .zip(predicted.iter())
                .filter(|(t, p)| t == p)
                .count()
        };
        Ok(correct as f32 / y_true.len() as f32)
    }
}

/// Mean of the squared element-wise differences
#[derive(Debug, Default, Clone, Copy)]
pub struct MeanSquaredError;

impl Metric for MeanSquaredError {
    fn name(&self) -> &str {
        "mse"
    }

    fn compute(&self, y_true: &Tensor, y_pred: &Tensor) -> Result<f32, TensorError> {
        if y_true.sample_shape() != y_pred.sample_shape() {
            return Err(TensorError::SampleShapeMismatch {
                expected: y_true.sample_shape().to_vec(),
                got: y_pred.sample_shape().to_vec(),
            });
        }
        y_true.check_same_len(y_pred)?;
        let (t, p) = (y_true.to_vec(), y_pred.to_vec());
        if t.is_empty() {
            return Ok(0.0);
        }
        let sum = t.iter().zip(p.iter()).map(|(a, b)| (a - b).powi(2)).sum::<f32>();
        Ok(sum / t.len() as f32)
    }
}

/// A metric backed by a closure
pub struct FnMetric<F> {
    name: String,
    f: F,
}

/// Wraps `f(y_true, y_pred)` as a metric logged under `name`
pub fn metric_fn<F>(name: impl Into<String>, f: F) -> FnMetric<F>
where
    F: Fn(&Tensor, &Tensor) -> f32,
{
    FnMetric {
        name: name.into(),
        f,
    }
}

impl<F> Metric for FnMetric<F>
where
    F: Fn(&Tensor, &Tensor) -> f32,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn compute(&self, y_true: &Tensor, y_pred: &Tensor) -> Result<f32, TensorError> {
        Ok((self.f)(y_true, y_pred))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_eq_float;

    #[test]
    fn test_accuracy_with_class_indices() {
        let y_true = Tensor::new(vec![1.0, 0.0, 2.0, 1.0], &[4]).unwrap();
        let y_pred = Tensor::from_rows(&[
            vec![0.1, 0.8, 0.1],
            vec![0.9, 0.05, 0.05],
            vec![0.3, 0.4, 0.3],
            vec![0.2, 0.7, 0.1],
        ])
        .unwrap();
        assert_eq_float!(Accuracy.compute(&y_true, &y_pred).unwrap(), 0.75);
    }

    #[test]
    fn test_accuracy_with_one_hot() {
        let y_true = Tensor::from_rows(&[vec![0.0, 1.0], vec![1.0, 0.0]]).unwrap();
        let y_pred = Tensor::from_rows(&[vec![-1.0, 3.0], vec![-1.0, 3.0]]).unwrap();
        assert_eq_float!(Accuracy.compute(&y_true, &y_pred).unwrap(), 0.5);
    }

    #[test]
    fn test_accuracy_length_mismatch() {
        let y_true = Tensor::new(vec![1.0], &[1]).unwrap();
        let y_pred = Tensor::zeros(&[2, 2]).unwrap();
        assert!(matches!(
            Accuracy.compute(&y_true, &y_pred),
            Err(TensorError::SampleCountMismatch { left: 1, right: 2 })
        ));
    }

    #[test]
    fn test_mse() {
        let y_true = Tensor::new(vec![1.0, 5.0], &[2, 1]).unwrap();
        let y_pred = Tensor::new(vec![2.0, 3.0], &[2, 1]).unwrap();
        assert_eq_float!(MeanSquaredError.compute(&y_true, &y_pred).unwrap(), 2.5);
    }

    #[test]
    fn test_fn_metric() {
        let max_pred = metric_fn("max_pred", |_: &Tensor, p: &Tensor| {
            p.to_vec().into_iter().fold(f32::NEG_INFINITY, f32::max)
        });
        let y = Tensor::new(vec![0.5, 2.0], &[2]).unwrap();
        assert_eq!(max_pred.name(), "max_pred");
        assert_eq!(max_pred.compute(&y, &y).unwrap(), 2.0);
    }
}
