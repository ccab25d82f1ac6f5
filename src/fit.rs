//! Keras-style `fit` and `predict` for any [`Module`]
//!
//! ```no_run
//! use fit_rs::{
//!     fit::{FitArgs, FitModule},
//!     loss::CrossEntropyLoss,
//!     metrics::Accuracy,
//!     nn::Layer,
//!     optim::SGD,
//!     tensor::Tensor,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let x = Tensor::from_rows(&[vec![0.0, 1.0], vec![1.0, 0.0]])?;
//! let y = Tensor::new(vec![1.0, 0.0], &[2])?;
//! let mut model = Layer::new(2, 2);
//! let logs = model.fit(
//!     &x,
//!     &y,
//!     &CrossEntropyLoss,
//!     SGD::factory(0.01, 0.9),
//!     FitArgs::default().epochs(10).metric(Accuracy),
//! )?;
//! println!("{}", logs[logs.len() - 1]);
//! let probs = model.predict(&x, 32)?;
//! # Ok(())
//! # }
//! ```

use std::borrow::Cow;

use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;
use thiserror::Error;

use crate::{
    dataloader::{DataLoader, DataLoaderError, make_batches, validation_split_index},
    logs::{Log, add_metrics},
    loss::{CrossEntropyLoss, Loss, LossError},
    metrics::Metric,
    nn::{Module, NNError},
    optim::{DEFAULT_LR, DEFAULT_MOMENTUM, Optim, SGD},
    progress::ProgressBar,
    tensor::{Tensor, TensorError},
    values::{Value, no_grad},
};

/// Decimal places used when rendering logs
const LOG_PRECISION: usize = 4;

/// Errors raised by [`FitModule::fit`] and [`FitModule::predict`]. Failures of the
/// collaborators are passed through unchanged.
#[derive(Debug, Error)]
pub enum FitError {
    #[error(transparent)]
    Tensor(#[from] TensorError),
    #[error(transparent)]
    Model(#[from] NNError),
    #[error(transparent)]
    Loss(#[from] LossError),
    #[error(transparent)]
    DataLoader(#[from] DataLoaderError),
    #[error("Forward pass returned {got} samples for a batch of {expected}")]
    OutputLengthMismatch { expected: usize, got: usize },
}

/// Training options for [`FitModule::fit`]
pub struct FitArgs<'a> {
    /// Number of samples per gradient update
    pub batch_size: usize,
    /// Epoch to stop before. Together with `initial_epoch` this numbers the epochs
    /// `initial_epoch..epochs`.
    pub epochs: usize,
    /// Show a progress bar per epoch
    pub verbose: bool,
    /// Fraction of trailing samples held out for validation, only used when strictly
    /// between 0 and 1 and no `validation_data` is given
    pub validation_split: f64,
    /// `(x_val, y_val)` evaluated at the end of every epoch, never trained on. `val_loss`
    /// is always recorded for a non-empty validation set, with or without metrics.
    pub validation_data: Option<(&'a Tensor, &'a Tensor)>,
    /// Reshuffle the training samples before every epoch
    pub shuffle: bool,
    /// Epoch at which to start, useful to resume a previous run
    pub initial_epoch: usize,
    /// Seed for the shuffle order
    pub seed: Option<u64>,
    /// Evaluated on the training (and validation) data at the end of every epoch
    pub metrics: Vec<Box<dyn Metric + 'a>>,
}

impl Default for FitArgs<'_> {
    fn default() -> Self {
        Self {
            batch_size: 32,
            epochs: 1,
            verbose: true,
            validation_split: 0.0,
            validation_data: None,
            shuffle: true,
            initial_epoch: 0,
            seed: None,
            metrics: Vec::new(),
        }
    }
}

impl<'a> FitArgs<'a> {
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn validation_split(mut self, fraction: f64) -> Self {
        self.validation_split = fraction;
        self
    }

    pub fn validation_data(mut self, x: &'a Tensor, y: &'a Tensor) -> Self {
        self.validation_data = Some((x, y));
        self
    }

    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn initial_epoch(mut self, initial_epoch: usize) -> Self {
        self.initial_epoch = initial_epoch;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Same as [`FitArgs::seed`], `None` leaves training unseeded
    pub fn seed_opt(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn metric(mut self, metric: impl Metric + 'a) -> Self {
        self.metrics.push(Box::new(metric));
        self
    }
}

type Pair<'a> = (Cow<'a, Tensor>, Cow<'a, Tensor>);

/// Separates the training data from the validation data, if any
fn split_validation<'a>(
    x: &'a Tensor,
    y: &'a Tensor,
    validation_split: f64,
    validation_data: Option<(&'a Tensor, &'a Tensor)>,
) -> Result<(Pair<'a>, Option<Pair<'a>>), FitError> {
    if x.len() != y.len() {
        return Err(DataLoaderError::LabelLengthMismatch {
            label_len: y.len(),
            data_len: x.len(),
        }
        .into());
    }
    let split = validation_split_index(x.len(), validation_split);
    if let Some((val_x, val_y)) = validation_data {
        if split.is_some() {
            log::warn!("validation_data was supplied, ignoring validation_split");
        }
        val_x.check_same_len(val_y)?;
        return Ok((
            (Cow::Borrowed(x), Cow::Borrowed(y)),
            Some((Cow::Borrowed(val_x), Cow::Borrowed(val_y))),
        ));
    }
    match split {
        Some(split) => {
            let (x, val_x) = x.split_at(split)?;
            let (y, val_y) = y.split_at(split)?;
            log::debug!(
                "holding out {} of {} samples for validation",
                val_x.len(),
                x.len() + val_x.len()
            );
            Ok((
                (Cow::Owned(x), Cow::Owned(y)),
                Some((Cow::Owned(val_x), Cow::Owned(val_y))),
            ))
        }
        None => Ok(((Cow::Borrowed(x), Cow::Borrowed(y)), None)),
    }
}

/// Adds `fit` and `predict` to every [`Module`]
pub trait FitModule: Module {
    /// Trains the model similar to Keras' `Model.fit`.
    ///
    /// `optimizer` is called once with the model parameters. Every batch runs
    /// `zero_grad`, forward, `loss`, backward and `step`; the log key `train_loss` holds
    /// the sum of the batch losses so far divided by the number of samples seen. Afterwards
    /// a non-empty validation set is scored into `val_loss`, and each metric is recorded
    /// as `train_<name>` and `val_<name>`.
    ///
    /// Returns one [`Log`] per epoch run.
    fn fit<L, O, F>(
        &mut self,
        x: &Tensor,
        y: &Tensor,
        loss: &L,
        optimizer: F,
        args: FitArgs<'_>,
    ) -> Result<Vec<Log>, FitError>
    where
        L: Loss + ?Sized,
        O: Optim,
        F: FnOnce(Vec<Value>) -> O,
    {
        let FitArgs {
            batch_size,
            epochs,
            verbose,
            validation_split,
            validation_data,
            shuffle,
            initial_epoch,
            seed,
            metrics,
        } = args;

        let mut rng = match seed {
            Some(seed) => Pcg64Mcg::seed_from_u64(seed),
            None => Pcg64Mcg::from_rng(&mut rand::rng()),
        };
        let ((train_x, train_y), validation) =
            split_validation(x, y, validation_split, validation_data)?;

        let mut optim = optimizer(self.parameters());
        let mut loader = DataLoader::new(&train_x, &train_y, batch_size, shuffle)?;
        let n_batches = loader.n_batches();
        log::debug!(
            "training on {} samples in {} batches per epoch",
            loader.n_samples(),
            n_batches
        );

        let mut logs = Vec::with_capacity(epochs.saturating_sub(initial_epoch));
        for epoch in initial_epoch..epochs {
            self.train();
            let pb = ProgressBar::new(n_batches, verbose);
            pb.epoch_header(epoch, epochs);

            let mut log = Log::new(epoch);
            let mut n_run = 0;
            let mut epoch_loss = 0.0;
            for batch in loader.epoch(&mut rng) {
                let batch = batch?;
                optim.zero_grad();
                let y_pred = self.forward(&batch.x)?;
                let batch_loss = loss.call(&y_pred, &batch.y)?;
                batch_loss.backward();
                optim.step();

                n_run += batch.len();
                epoch_loss += batch_loss.data();
                log.set("train_loss", epoch_loss / n_run as f32);
                pb.bar(batch.index, log.to_message(LOG_PRECISION));
            }

            if !metrics.is_empty() && !train_x.is_empty() {
                let y_train_pred = self.predict(&train_x, batch_size)?;
                add_metrics(&mut log, &metrics, &train_y, &y_train_pred, "train_")?;
            }
            let non_empty_val = validation.as_ref().filter(|(val_x, _)| !val_x.is_empty());
            if let Some((val_x, val_y)) = non_empty_val {
                let y_val_pred = self.predict(val_x, batch_size)?;
                {
                    let _guard = no_grad();
                    log.set("val_loss", loss.call(&y_val_pred, val_y)?.data());
                }
                add_metrics(&mut log, &metrics, val_y, &y_val_pred, "val_")?;
            }

            log::info!("epoch {} / {}: {}", epoch + 1, epochs, log);
            pb.close(log.to_message(LOG_PRECISION));
            logs.push(log);
        }
        Ok(logs)
    }

    /// [`FitModule::fit`] with cross entropy loss and SGD (lr 0.001, momentum 0.9)
    fn fit_with_defaults(
        &mut self,
        x: &Tensor,
        y: &Tensor,
        args: FitArgs<'_>,
    ) -> Result<Vec<Log>, FitError> {
        self.fit(
            x,
            y,
            &CrossEntropyLoss,
            SGD::factory(DEFAULT_LR, DEFAULT_MOMENTUM),
            args,
        )
    }

    /// Generates output predictions for the input samples, in batches and without
    /// recording gradients.
    ///
    /// The output has one sample per input sample; the sample shape is taken from the
    /// first batch's output. An empty input gives an empty tensor of shape `[0]`.
    fn predict(&mut self, x: &Tensor, batch_size: usize) -> Result<Tensor, FitError> {
        if batch_size == 0 {
            return Err(DataLoaderError::ZeroBatchSize.into());
        }
        self.eval();
        let _guard = no_grad();

        let n = x.len();
        let mut y_pred: Option<Tensor> = None;
        for range in make_batches(n, batch_size) {
            let batch = x.narrow(range.clone())?;
            let out = self.forward(&batch)?;
            if out.len() != range.len() {
                return Err(FitError::OutputLengthMismatch {
                    expected: range.len(),
                    got: out.len(),
                });
            }
            let mut y = match y_pred.take() {
                Some(y) => y,
                None => {
                    let mut shape = vec![n];
                    shape.extend_from_slice(out.sample_shape());
                    Tensor::zeros(&shape)?
                }
            };
            y.write_samples(range.start, &out)?;
            y_pred = Some(y);
        }
        match y_pred {
            Some(y) => Ok(y),
            None => Ok(Tensor::zeros(&[0])?),
        }
    }
}

impl<M: Module + ?Sized> FitModule for M {}
