//! Generates 2-D binary classification datasets and plots them with a model's decision
//! boundary
//!
//! Samples are `[N, 2]` tensors of coordinates, labels are `[N]` tensors of class
//! indices. By convention class 0 is plotted in red and class 1 in blue.

use std::{
    error::Error,
    f32::consts::PI,
    fmt::{self, Display},
};

use clap::ValueEnum;
use plotters::{
    chart::ChartBuilder,
    prelude::{BitMapBackend, Circle, IntoDrawingArea, Rectangle},
    style::{BLUE, Color, RED, RGBColor, WHITE},
};
use rand::Rng;

use crate::{
    fit::FitModule,
    nn::Module,
    tensor::{Tensor, TensorError},
};

const GRID_MIN: f32 = -6.0;
const GRID_MAX: f32 = 6.0;
const GRID_STEP: f32 = 0.2;

/// Toggles between dataset types
#[derive(Debug, ValueEnum, Clone, Copy, PartialEq, Eq)]
pub enum Dataset {
    Line,
    Circle,
    XOR,
    Moon,
}

impl Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dataset::Line => write!(f, "line"),
            Dataset::Circle => write!(f, "circle"),
            Dataset::XOR => write!(f, "xor"),
            Dataset::Moon => write!(f, "moon"),
        }
    }
}

/// Loads a dataset based on the dataset type. `class_size` is the number of samples
/// per class for circle and moon, and the total number of samples for line and xor.
pub fn load_dataset<R: Rng + ?Sized>(
    dataset: Dataset,
    class_size: usize,
    rng: &mut R,
) -> Result<(Tensor, Tensor), TensorError> {
    let (points, classes) = match dataset {
        Dataset::Line => gen_linear_data(class_size, rng),
        Dataset::Circle => gen_circle_data(class_size, rng),
        Dataset::XOR => gen_xor_data(class_size, rng),
        Dataset::Moon => gen_moon_data(class_size, rng),
    };
    let n = classes.len();
    Ok((Tensor::from_rows(&points)?, Tensor::new(classes, &[n])?))
}

type Points = (Vec<Vec<f32>>, Vec<f32>);

/// Points on either side of the line `y = x`
fn gen_linear_data<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Points {
    (0..n)
        .map(|_| {
            let x: f32 = rng.random_range(-5.0..5.0);
            let y: f32 = rng.random_range(-5.0..5.0);
            (vec![x, y], if x > y { 0.0 } else { 1.0 })
        })
        .unzip()
}

/// Two noisy concentric rings
fn gen_circle_data<R: Rng + ?Sized>(class_size: usize, rng: &mut R) -> Points {
    [(3.0f32, 0.0), (5.0, 1.0)]
        .into_iter()
        .flat_map(|(radius, class)| (0..class_size).map(move |_| (radius, class)))
        .collect::<Vec<_>>()
        .into_iter()
        .map(|(radius, class)| {
            let angle = rng.random_range(0.0..2.0 * PI);
            let r = radius + radius * rng.random_range(-0.25f32..0.25);
            (vec![r * angle.cos(), r * angle.sin()], class)
        })
        .unzip()
}

/// Class 0 in the first and third quadrants, class 1 elsewhere
fn gen_xor_data<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Points {
    (0..n)
        .map(|_| {
            let x: f32 = rng.random_range(-5.0..5.0);
            let y: f32 = rng.random_range(-5.0..5.0);
            let class = if x * y > 0.0 { 0.0 } else { 1.0 };
            (vec![x, y], class)
        })
        .unzip()
}

/// Two interleaving partial circles
fn gen_moon_data<R: Rng + ?Sized>(class_size: usize, rng: &mut R) -> Points {
    let radius = 3.0;
    let mut points = Vec::with_capacity(2 * class_size);
    let mut classes = Vec::with_capacity(2 * class_size);
    for class in [0.0, 1.0] {
        for _ in 0..class_size {
            let theta: f32 = rng.random_range(-PI / 4.0..PI * 5.0 / 4.0);
            let (x, y) = if class == 0.0 {
                (radius * theta.cos(), radius * theta.sin())
            } else {
                (radius * theta.cos() + 2.0, -radius * theta.sin() - 0.2)
            };
            let noise_x: f32 = rng.random_range(-0.1..0.1);
            let noise_y: f32 = rng.random_range(-0.1..0.1);
            points.push(vec![x + noise_x, y + noise_y]);
            classes.push(class);
        }
    }
    (points, classes)
}

/// Plots the data points and labels for a given dataset
pub fn plot_data(
    x: &Tensor,
    y: &Tensor,
    file_name: &str,
    dataset: Dataset,
) -> Result<(), Box<dyn Error>> {
    let root_area = BitMapBackend::new(file_name, (640, 480)).into_drawing_area();
    root_area.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root_area)
        .caption(format!("Dataset: {}", dataset), ("sans-serif", 50))
        .margin(20)
        .x_label_area_size(30)
        .y_label_area_size(30)
        .build_cartesian_2d(GRID_MIN..GRID_MAX, GRID_MIN..GRID_MAX)?;

    chart.configure_mesh().draw()?;
    chart.draw_series(labelled_points(x, y))?;

    root_area.present()?;
    log::info!("Data plot has been saved to '{}'.", file_name);

    Ok(())
}

/// Plots the decision boundary of `model` by predicting the class of every cell of a
/// grid, then overlays the data points
pub fn plot_decision_boundary<M: Module + ?Sized>(
    model: &mut M,
    file_name: &str,
    dataset: Dataset,
    x: &Tensor,
    y: &Tensor,
) -> Result<(), Box<dyn Error>> {
    let n_steps = ((GRID_MAX - GRID_MIN) / GRID_STEP).round() as usize;
    let grid = (0..n_steps)
        .flat_map(|xi| {
            (0..n_steps).map(move |yi| {
                vec![
                    GRID_MIN + xi as f32 * GRID_STEP,
                    GRID_MIN + yi as f32 * GRID_STEP,
                ]
            })
        })
        .collect::<Vec<_>>();
    let predicted = model.predict(&Tensor::from_rows(&grid)?, 256)?.argmax();

    let root_area = BitMapBackend::new(file_name, (640, 480)).into_drawing_area();
    root_area.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root_area)
        .caption(
            format!("Decision Boundary for {}", dataset),
            ("sans-serif", 50),
        )
        .margin(20)
        .x_label_area_size(30)
        .y_label_area_size(30)
        .build_cartesian_2d(GRID_MIN..GRID_MAX, GRID_MIN..GRID_MAX)?;

    chart.configure_mesh().draw()?;

    let red_bg = RGBColor(255, 200, 200);
    let blue_bg = RGBColor(200, 200, 255);
    let half = GRID_STEP / 2.0;
    chart.draw_series(grid.iter().zip(predicted).map(|(point, class)| {
        let color = if class == 0 { red_bg } else { blue_bg };
        Rectangle::new(
            [
                (point[0] - half, point[1] - half),
                (point[0] + half, point[1] + half),
            ],
            color.filled(),
        )
    }))?;

    chart.draw_series(labelled_points(x, y))?;

    root_area.present()?;
    log::info!("Decision boundary plot saved to '{}'.", file_name);
    Ok(())
}

fn labelled_points<'a>(
    x: &'a Tensor,
    y: &'a Tensor,
) -> impl Iterator<Item = Circle<(f32, f32), i32>> + 'a {
    x.samples().zip(y.samples()).map(|(point, label)| {
        let color = if get_class(label[0].data()) == 0 {
            RED
        } else {
            BLUE
        };
        Circle::new((point[0].data(), point[1].data()), 3, color.filled())
    })
}

/// Class index stored in a label value
pub fn get_class(label: f32) -> usize {
    label.max(0.0).round() as usize
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_pcg::Pcg64Mcg;

    use super::*;

    #[test]
    fn test_dataset_shapes() {
        let mut rng = Pcg64Mcg::seed_from_u64(0);
        for (dataset, expected) in [
            (Dataset::Line, 10),
            (Dataset::XOR, 10),
            (Dataset::Circle, 20),
            (Dataset::Moon, 20),
        ] {
            let (x, y) = load_dataset(dataset, 10, &mut rng).unwrap();
            assert_eq!(x.shape(), &[expected, 2]);
            assert_eq!(y.shape(), &[expected]);
            assert!(y.to_vec().iter().all(|&c| c == 0.0 || c == 1.0));
        }
    }

    #[test]
    fn test_xor_labels() {
        let mut rng = Pcg64Mcg::seed_from_u64(3);
        let (x, y) = load_dataset(Dataset::XOR, 50, &mut rng).unwrap();
        for (point, label) in x.samples().zip(y.samples()) {
            let same_sign = point[0].data() * point[1].data() > 0.0;
            assert_eq!(get_class(label[0].data()), if same_sign { 0 } else { 1 });
        }
    }

    #[test]
    fn test_seeded_datasets_match() {
        let a = load_dataset(Dataset::Moon, 5, &mut Pcg64Mcg::seed_from_u64(9)).unwrap();
        let b = load_dataset(Dataset::Moon, 5, &mut Pcg64Mcg::seed_from_u64(9)).unwrap();
        assert_eq!(a.0.to_vec(), b.0.to_vec());
    }
}
