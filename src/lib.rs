//! Keras-style `fit` / `predict` training loops for rudimentary neural networks
//! built with a PyTorch-like API.
//!
//! Any [`nn::Module`] gets [`fit::FitModule::fit`] and [`fit::FitModule::predict`]:
//! epoch iteration, batching, shuffling, validation bookkeeping, optimizer stepping and
//! per-epoch metric logs around the model's forward pass.

pub mod backprop_fns;
pub mod dataloader;
pub mod datasets;
pub mod fit;
pub mod logs;
pub mod loss;
pub mod metrics;
pub mod nn;
pub mod optim;
pub mod progress;
pub mod tensor;
pub mod values;
