//! Components to build a neural network

use std::sync::atomic::{self, AtomicUsize};

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use thiserror::Error;

use crate::{
    tensor::{Tensor, TensorError},
    values::Value,
};

/// Errors for the neural network
#[derive(Debug, Error)]
pub enum NNError {
    #[error("Input size mismatch, expected {expected} features per sample but got {got}")]
    InputSizeMismatch { expected: usize, got: usize },
    #[error(transparent)]
    Tensor(#[from] TensorError),
}

/// Represents the torch.nn.Module. NNs should implement this trait.
/// <https://github.com/pytorch/pytorch/blob/v2.6.0/torch/nn/modules/module.py#L402>
///
/// `forward` receives a whole batch: the leading axis of `inputs` indexes samples and
/// the leading axis of the output must match it.
pub trait Module {
    fn zero_grad(&mut self) {
        for p in self.parameters().iter_mut() {
            p.zero_grad();
        }
    }

    fn parameters(&self) -> Vec<Value>;
    fn forward(&self, inputs: &Tensor) -> Result<Tensor, NNError>;

    /// Switches between training and evaluation behavior, ignored by default
    fn set_training(&mut self, _training: bool) {}

    fn train(&mut self) {
        self.set_training(true);
    }

    fn eval(&mut self) {
        self.set_training(false);
    }
}

fn sample_normal<R: Rng + ?Sized>(rng: &mut R) -> f32 {
    StandardNormal.sample(rng)
}

/// A single neuron in a layer of a NN
pub struct Neuron {
    /// weights of the neuron
    pub weights: Vec<Value>,
    /// bias of the neuron
    pub bias: Value,
}

impl Neuron {
    fn new<R: Rng + ?Sized>(n_inputs: usize, rng: &mut R) -> Self {
        // He initialization keeps the output variance close to the input variance
        let std = (2.0 / n_inputs as f32).sqrt();
        let weights = (0..n_inputs)
            .map(|_| Value::new(sample_normal(&mut *rng) * std))
            .collect();
        Self {
            weights,
            bias: Value::new(sample_normal(rng) * std),
        }
    }

    /// A neuron with fixed weights and bias
    pub fn from_weights(weights: &[f32], bias: f32) -> Self {
        Self {
            weights: weights.iter().map(|&w| Value::new(w)).collect(),
            bias: Value::new(bias),
        }
    }

    pub fn parameters(&self) -> Vec<Value> {
        self.weights
            .iter()
            .chain(std::iter::once(&self.bias))
            .cloned()
            .collect()
    }

    pub fn forward(&self, inputs: &[Value]) -> Result<Value, NNError> {
        if inputs.len() != self.weights.len() {
            return Err(NNError::InputSizeMismatch {
                expected: self.weights.len(),
                got: inputs.len(),
            });
        }
        let output = self
            .weights
            .iter()
            .zip(inputs.iter())
            .map(|(w, i)| w * i)
            .sum::<Value>();
        Ok(&output + &self.bias)
    }
}

/// A fully connected layer, mapping `[N, n_inputs]` to `[N, n_outputs]`
pub struct Layer {
    neurons: Vec<Neuron>,
    n_inputs: usize,
    n_output_nans: AtomicUsize,
}

impl Layer {
    /// Creates a new layer with the given number of inputs and outputs
    pub fn new(n_inputs: usize, n_outputs: usize) -> Self {
        Self::with_rng(n_inputs, n_outputs, &mut rand::rng())
    }

    /// Same as [`Layer::new`] but draws the initial weights from `rng`
    pub fn with_rng<R: Rng + ?Sized>(n_inputs: usize, n_outputs: usize, rng: &mut R) -> Self {
        let neurons = (0..n_outputs)
            .map(|_| Neuron::new(n_inputs, &mut *rng))
            .collect();
        Self::from_neurons(n_inputs, neurons)
    }

    /// Builds a layer from explicit neurons, each of which must take `n_inputs` inputs
    pub fn from_neurons(n_inputs: usize, neurons: Vec<Neuron>) -> Self {
        Self {
            neurons,
            n_inputs,
            n_output_nans: AtomicUsize::new(0),
        }
    }

    pub fn n_outputs(&self) -> usize {
        self.neurons.len()
    }

    /// Number of NaN outputs produced by the last forward pass
    pub fn n_output_nans(&self) -> usize {
        self.n_output_nans.load(atomic::Ordering::Relaxed)
    }
}

impl Module for Layer {
    fn parameters(&self) -> Vec<Value> {
        self.neurons.iter().flat_map(|n| n.parameters()).collect()
    }

    fn forward(&self, inputs: &Tensor) -> Result<Tensor, NNError> {
        if inputs.sample_len() != self.n_inputs {
            return Err(NNError::InputSizeMismatch {
                expected: self.n_inputs,
                got: inputs.sample_len(),
            });
        }
        let rows = inputs
            .samples()
            .map(|sample| {
                self.neurons
                    .iter()
                    .map(|n| n.forward(sample))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;
        let outputs = if rows.is_empty() {
            Tensor::zeros(&[0, self.n_outputs()])?
        } else {
            Tensor::stack(rows)?
        };
        let n_output_nans = outputs.values().iter().filter(|v| v.data().is_nan()).count();
        self.n_output_nans
            .store(n_output_nans, atomic::Ordering::Relaxed);
        if n_output_nans > 0 {
            log::debug!("n_output_nans: {}", n_output_nans);
        }
        Ok(outputs)
    }
}

/// Applies ReLU element-wise, works for any shape
#[derive(Default)]
pub struct ReLU {
    n_dead_neurons: AtomicUsize,
}

impl ReLU {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forward(&self, inputs: &Tensor) -> Tensor {
        let n_dead_neurons = inputs.values().iter().filter(|v| v.data() <= 0.0).count();
        self.n_dead_neurons
            .store(n_dead_neurons, atomic::Ordering::Relaxed);
        inputs.map(Value::relu)
    }

    /// Returns the number of non-positive inputs seen in the last forward pass (used for debugging)
    pub fn n_dead_neurons(&self) -> usize {
        self.n_dead_neurons.load(atomic::Ordering::Relaxed)
    }
}

/// Log of the softmax of a single sample.
///
/// The maximum is subtracted as a constant first so `exp` cannot overflow.
pub fn log_softmax(inputs: &[Value]) -> Vec<Value> {
    let max = Value::new(
        inputs
            .iter()
            .map(Value::data)
            .fold(f32::NEG_INFINITY, f32::max),
    );
    let shifted = inputs.iter().map(|v| v - &max).collect::<Vec<_>>();
    let log_sum_exp = shifted.iter().map(Value::exp).sum::<Value>().ln();
    shifted.iter().map(|v| v - &log_sum_exp).collect()
}

/// Applies softmax over each sample of an `[N, C]` tensor
#[derive(Default)]
pub struct Softmax {}

impl Softmax {
    pub fn new() -> Self {
        Self {}
    }

    pub fn forward(&self, inputs: &Tensor) -> Result<Tensor, NNError> {
        let mut shape = inputs.shape().to_vec();
        if shape.len() == 1 {
            shape.push(1);
        }
        let values = inputs
            .samples()
            .flat_map(|sample| {
                let exp_sum = sample.iter().map(Value::exp).sum::<Value>();
                sample
                    .iter()
                    .map(|v| v.exp() / exp_sum.clone())
                    .collect::<Vec<_>>()
            })
            .collect();
        Ok(Tensor::from_values(values, shape)?)
    }
}
