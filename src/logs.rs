//! Per-epoch training logs

use std::fmt::{self, Display};

use crate::{
    metrics::Metric,
    tensor::{Tensor, TensorError},
};

/// Metric values recorded during one epoch, in the order they were first set
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Log {
    epoch: usize,
    entries: Vec<(String, f32)>,
}

impl Log {
    pub fn new(epoch: usize) -> Self {
        Self {
            epoch,
            entries: Vec::new(),
        }
    }

    /// Zero-based epoch number this log belongs to
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Sets `name` to `value`, overwriting in place if it is already present
    pub fn set(&mut self, name: impl Into<String>, value: f32) {
        let name = name.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some((_, v)) => *v = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<f32> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Renders `name: value` pairs separated by four spaces
    pub fn to_message(&self, precision: usize) -> String {
        self.entries
            .iter()
            .map(|(k, v)| format!("{}: {:.*}", k, precision, v))
            .collect::<Vec<_>>()
            .join("    ")
    }
}

impl Display for Log {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_message(4))
    }
}

/// Evaluates every metric on `(y_true, y_pred)` and stores the result under
/// `prefix` followed by the metric's name
pub fn add_metrics(
    log: &mut Log,
    metrics: &[Box<dyn Metric + '_>],
    y_true: &Tensor,
    y_pred: &Tensor,
    prefix: &str,
) -> Result<(), TensorError> {
    for metric in metrics {
        let value = metric.compute(y_true, y_pred)?;
        log.set(format!("{}{}", prefix, metric.name()), value);
    }
    Ok(())
}
