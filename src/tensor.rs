//! Shaped collections of values
//!
//! The leading axis of every tensor indexes samples, so a tensor of shape `[N, d1, d2]`
//! holds `N` samples of shape `[d1, d2]` stored contiguously in row-major order.

use std::{collections::HashSet, ops::Range};

use thiserror::Error;

use crate::values::Value;

/// Errors for tensor construction and sample-axis operations
#[derive(Debug, Error)]
pub enum TensorError {
    #[error("Tensors need at least one (sample) dimension")]
    NoSampleAxis,
    #[error("Shape {shape:?} holds {expected} elements, received {got}")]
    ElementCountMismatch {
        shape: Vec<usize>,
        expected: usize,
        got: usize,
    },
    #[error("All rows must have the same length. Received different sizes: {row_lens:?}")]
    RaggedRows { row_lens: HashSet<usize> },
    #[error("Sample index {index} is out of bounds for {len} samples")]
    IndexOutOfBounds { index: usize, len: usize },
    #[error("Sample shape mismatch, expected {expected:?} but got {got:?}")]
    SampleShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    #[error("Tensors hold a different number of samples: {left} vs {right}")]
    SampleCountMismatch { left: usize, right: usize },
}

/// A row-major tensor of [`Value`]s whose first dimension is the sample axis
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    values: Vec<Value>,
    shape: Vec<usize>,
}

impl Tensor {
    /// Creates a tensor of fresh leaf values
    pub fn new(data: Vec<f32>, shape: &[usize]) -> Result<Self, TensorError> {
        Self::from_values(data.into_iter().map(Value::new).collect(), shape.to_vec())
    }

    pub fn from_values(values: Vec<Value>, shape: Vec<usize>) -> Result<Self, TensorError> {
        if shape.is_empty() {
            return Err(TensorError::NoSampleAxis);
        }
        let expected = shape.iter().product::<usize>();
        if values.len() != expected {
            return Err(TensorError::ElementCountMismatch {
                shape,
                expected,
                got: values.len(),
            });
        }
        Ok(Self { values, shape })
    }

    /// Builds an `[N, d]` tensor from `N` rows of equal length
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self, TensorError> {
        let row_lens = rows.iter().map(|r| r.len()).collect::<HashSet<_>>();
        if row_lens.len() > 1 {
            return Err(TensorError::RaggedRows { row_lens });
        }
        let width = rows.first().map_or(0, |r| r.len());
        let data = rows.iter().flatten().copied().collect();
        Self::new(data, &[rows.len(), width])
    }

    /// Stacks rows of already-computed values into an `[N, d]` tensor, keeping the graph
    pub fn stack(rows: Vec<Vec<Value>>) -> Result<Self, TensorError> {
        let row_lens = rows.iter().map(|r| r.len()).collect::<HashSet<_>>();
        if row_lens.len() > 1 {
            return Err(TensorError::RaggedRows { row_lens });
        }
        let width = rows.first().map_or(0, |r| r.len());
        let n = rows.len();
        Self::from_values(rows.into_iter().flatten().collect(), vec![n, width])
    }

    pub fn zeros(shape: &[usize]) -> Result<Self, TensorError> {
        Self::new(vec![0.0; shape.iter().product()], shape)
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Shape of a single sample (everything after the leading axis)
    pub fn sample_shape(&self) -> &[usize] {
        &self.shape[1..]
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.shape[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of values in a single sample
    pub fn sample_len(&self) -> usize {
        self.sample_shape().iter().product()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// The values of sample `index`
    ///
    /// # Panics
    /// If `index >= self.len()`
    pub fn sample(&self, index: usize) -> &[Value] {
        let width = self.sample_len();
        &self.values[index * width..(index + 1) * width]
    }

    pub fn samples(&self) -> impl Iterator<Item = &[Value]> {
        (0..self.len()).map(|i| self.sample(i))
    }

    /// Gathers the given samples, in order, into a new tensor sharing the same values
    pub fn index_select(&self, indices: &[usize]) -> Result<Self, TensorError> {
        let len = self.len();
        if let Some(&index) = indices.iter().find(|&&i| i >= len) {
            return Err(TensorError::IndexOutOfBounds { index, len });
        }
        let values = indices
            .iter()
            .flat_map(|&i| self.sample(i).iter().cloned())
            .collect();
        let mut shape = self.shape.clone();
        shape[0] = indices.len();
        Self::from_values(values, shape)
    }

    /// The contiguous samples `range.start..range.end`
    pub fn narrow(&self, range: Range<usize>) -> Result<Self, TensorError> {
        if range.end > self.len() || range.start > range.end {
            return Err(TensorError::IndexOutOfBounds {
                index: range.end.max(range.start),
                len: self.len(),
            });
        }
        let width = self.sample_len();
        let mut shape = self.shape.clone();
        shape[0] = range.len();
        Self::from_values(
            self.values[range.start * width..range.end * width].to_vec(),
            shape,
        )
    }

    /// Splits into the first `mid` samples and the rest
    pub fn split_at(&self, mid: usize) -> Result<(Self, Self), TensorError> {
        Ok((self.narrow(0..mid)?, self.narrow(mid..self.len())?))
    }

    /// Overwrites samples `start..start + src.len()` with detached copies of `src`
    pub fn write_samples(&mut self, start: usize, src: &Tensor) -> Result<(), TensorError> {
        if src.sample_shape() != self.sample_shape() {
            return Err(TensorError::SampleShapeMismatch {
                expected: self.sample_shape().to_vec(),
                got: src.sample_shape().to_vec(),
            });
        }
        let end = start + src.len();
        if end > self.len() {
            return Err(TensorError::IndexOutOfBounds {
                index: end,
                len: self.len(),
            });
        }
        let width = self.sample_len();
        for (dst, v) in self.values[start * width..end * width]
            .iter_mut()
            .zip(src.values.iter())
        {
            *dst = v.detach();
        }
        Ok(())
    }

    /// Applies `f` to every value, keeping the shape
    pub fn map(&self, f: impl FnMut(&Value) -> Value) -> Self {
        Self {
            values: self.values.iter().map(f).collect(),
            shape: self.shape.clone(),
        }
    }

    /// A copy of this tensor cut off from the computation graph
    pub fn detach(&self) -> Self {
        Self {
            values: self.values.iter().map(Value::detach).collect(),
            shape: self.shape.clone(),
        }
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.values.iter().map(Value::data).collect()
    }

    /// Index of the largest value in each sample
    pub fn argmax(&self) -> Vec<usize> {
        self.samples()
            .map(|s| {
                s.iter()
                    .enumerate()
                    .fold((0, f32::NEG_INFINITY), |(best, max), (i, v)| {
                        if v.data() > max { (i, v.data()) } else { (best, max) }
                    })
                    .0
            })
            .collect()
    }

    /// Fails unless `other` holds the same number of samples
    pub fn check_same_len(&self, other: &Tensor) -> Result<(), TensorError> {
        if self.len() != other.len() {
            return Err(TensorError::SampleCountMismatch {
                left: self.len(),
                right: other.len(),
            });
        }
        Ok(())
    }
}
