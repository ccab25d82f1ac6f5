//! Trains a small multilayer perceptron for 2-D binary classification with
//! [`FitModule::fit`](fit_rs::fit::FitModule::fit)
//!
//! # Usage
//! Runnable via
//! ```sh
//! cargo run -- -h
//! RUST_LOG=info cargo run -- --dataset moon --epochs 20 --validation-split 0.2
//! ```
//!
//! Supports a few classic datasets out of the box and allows custom learning rate,
//! momentum, batch size, etc.

use std::{error::Error, fs, process::ExitCode};

use fit_rs::{
    datasets::{Dataset, load_dataset, plot_data, plot_decision_boundary},
    fit::{FitArgs, FitModule},
    loss::CrossEntropyLoss,
    metrics::Accuracy,
    nn::{Layer, Module, NNError, ReLU},
    optim::{DEFAULT_LR, DEFAULT_MOMENTUM, SGD},
    tensor::Tensor,
    values::Value,
};

use clap::Parser;
use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;

#[derive(Parser)]
struct Args {
    #[clap(short, long, default_value_t = Dataset::XOR)]
    dataset: Dataset,
    #[clap(short, long, default_value_t = 200)]
    class_size: usize,
    #[clap(short, long, default_value_t = 32)]
    batch_size: usize,
    #[clap(short, long, default_value_t = 10)]
    epochs: usize,
    #[clap(short, long, default_value_t = DEFAULT_LR)]
    lr: f32,
    #[clap(short, long, default_value_t = DEFAULT_MOMENTUM)]
    momentum: f32,
    #[clap(short, long, default_value_t = 0.0)]
    validation_split: f64,
    /// Seeds dataset generation, weight initialization and shuffling
    #[clap(short, long)]
    seed: Option<u64>,
    // Larger hidden layers may need a lower learning rate to keep the logits finite
    #[clap(long, default_value_t = 10)]
    hidden_units: usize,
    /// Hide the per-epoch progress bar
    #[clap(short, long, default_value_t = false)]
    quiet: bool,
    /// Save plots of the dataset and the final decision boundary
    #[clap(long, default_value_t = false)]
    plot: bool,
    #[clap(short, long, default_value_t = format!("output"))]
    output_dir: String,
}

// A NN with one hidden layer, output is one logit per class
struct Model {
    l1: Layer,
    l1_relu: ReLU,
    l2: Layer,
}

impl Model {
    fn new(n_classes: usize, hidden_size: usize, rng: &mut Pcg64Mcg) -> Self {
        Self {
            l1: Layer::with_rng(2, hidden_size, &mut *rng),
            l1_relu: ReLU::new(),
            l2: Layer::with_rng(hidden_size, n_classes, rng),
        }
    }
}

impl Module for Model {
    fn forward(&self, inputs: &Tensor) -> Result<Tensor, NNError> {
        let l1_out = self.l1.forward(inputs)?;
        let l1_relu_out = self.l1_relu.forward(&l1_out);
        log::debug!("n_dead_neurons: {}", self.l1_relu.n_dead_neurons());
        self.l2.forward(&l1_relu_out)
    }

    fn parameters(&self) -> Vec<Value> {
        self.l1
            .parameters()
            .into_iter()
            .chain(self.l2.parameters())
            .collect()
    }
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let mut rng = match args.seed {
        Some(seed) => Pcg64Mcg::seed_from_u64(seed),
        None => Pcg64Mcg::from_rng(&mut rand::rng()),
    };
    let (x, y) = load_dataset(args.dataset, args.class_size, &mut rng)?;
    let n_classes = 2;
    log::info!(
        "dataset {}: {} samples, {} classes",
        args.dataset,
        x.len(),
        n_classes
    );

    if args.plot {
        fs::create_dir_all(&args.output_dir)?;
        plot_data(
            &x,
            &y,
            &format!("{}/dataset_{}.png", args.output_dir, args.dataset),
            args.dataset,
        )?;
    }

    let mut model = Model::new(n_classes, args.hidden_units, &mut rng);
    let fit_args = FitArgs::default()
        .batch_size(args.batch_size)
        .epochs(args.epochs)
        .verbose(!args.quiet)
        .validation_split(args.validation_split)
        .seed_opt(args.seed)
        .metric(Accuracy);

    let logs = model.fit(
        &x,
        &y,
        &CrossEntropyLoss,
        SGD::factory(args.lr, args.momentum),
        fit_args,
    )?;
    if let Some(last) = logs.last() {
        println!("final epoch {}: {}", last.epoch() + 1, last);
    }

    if args.plot {
        plot_decision_boundary(
            &mut model,
            &format!(
                "{}/decision_boundary_{}.png",
                args.output_dir, args.dataset
            ),
            args.dataset,
            &x,
            &y,
        )?;
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{}", err);
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}
