//! Batch partitioning and the mini-batch data loader

use std::ops::Range;

use rand::{Rng, seq::SliceRandom};
use thiserror::Error;

use crate::tensor::{Tensor, TensorError};

/// Errors for the dataloader
#[derive(Debug, Error)]
pub enum DataLoaderError {
    #[error("Labels must have the same length as the data")]
    LabelLengthMismatch { label_len: usize, data_len: usize },
    #[error("Batch size must be at least 1")]
    ZeroBatchSize,
    #[error(transparent)]
    Tensor(#[from] TensorError),
}

/// Splits `size` samples into consecutive half-open ranges of at most `batch_size`
/// samples. Only the final range can be shorter.
///
/// Returns no ranges when `batch_size` is 0.
pub fn make_batches(size: usize, batch_size: usize) -> Vec<Range<usize>> {
    if batch_size == 0 {
        return Vec::new();
    }
    (0..size.div_ceil(batch_size))
        .map(|i| i * batch_size..size.min((i + 1) * batch_size))
        .collect()
}

/// Number of leading samples kept for training when holding out a `fraction` of
/// `n_samples` for validation. `None` unless `fraction` lies strictly between 0 and 1.
pub fn validation_split_index(n_samples: usize, fraction: f64) -> Option<usize> {
    if fraction > 0.0 && fraction < 1.0 {
        Some((n_samples as f64 * (1.0 - fraction)) as usize)
    } else {
        None
    }
}

/// A mini batch drawn from the loader
#[derive(Debug, Clone)]
pub struct Batch {
    /// Position of the batch within the epoch
    pub index: usize,
    /// Slice of the epoch's sample order the batch was drawn from
    pub range: Range<usize>,
    pub x: Tensor,
    pub y: Tensor,
}

impl Batch {
    /// Number of samples in the batch
    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

/// Data loader, returns batches of data and labels optionally shuffled
/// Takes inspiration from the PyTorch DataLoader
/// <https://pytorch.org/docs/stable/data.html#torch.utils.data.DataLoader>
///
/// The sample order persists across epochs, so every shuffle permutes the previous order.
pub struct DataLoader<'a> {
    x: &'a Tensor,
    y: &'a Tensor,
    batch_size: usize,
    shuffle: bool,
    indices: Vec<usize>,
}

impl<'a> DataLoader<'a> {
    pub fn new(
        x: &'a Tensor,
        y: &'a Tensor,
        batch_size: usize,
        shuffle: bool,
    ) -> Result<Self, DataLoaderError> {
        if x.len() != y.len() {
            return Err(DataLoaderError::LabelLengthMismatch {
                label_len: y.len(),
                data_len: x.len(),
            });
        }
        if batch_size == 0 {
            return Err(DataLoaderError::ZeroBatchSize);
        }
        Ok(Self {
            x,
            y,
            batch_size,
            shuffle,
            indices: (0..x.len()).collect(),
        })
    }

    /// Number of batches per epoch
    pub fn n_batches(&self) -> usize {
        self.x.len().div_ceil(self.batch_size)
    }

    pub fn n_samples(&self) -> usize {
        self.x.len()
    }

    /// The current sample order
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Starts a new epoch, reshuffling with `rng` if shuffling is enabled
    pub fn epoch<R: Rng + ?Sized>(&mut self, rng: &mut R) -> DataLoaderIterator<'_> {
        if self.shuffle {
            self.indices.shuffle(rng);
        }
        DataLoaderIterator {
            x: self.x,
            y: self.y,
            indices: &self.indices,
            batches: make_batches(self.indices.len(), self.batch_size)
                .into_iter()
                .enumerate(),
        }
    }
}

/// An iterator which returns mini batches of data and labels until the end of the dataset
pub struct DataLoaderIterator<'a> {
    x: &'a Tensor,
    y: &'a Tensor,
    indices: &'a [usize],
    batches: std::iter::Enumerate<std::vec::IntoIter<Range<usize>>>,
}

impl Iterator for DataLoaderIterator<'_> {
    type Item = Result<Batch, TensorError>;

    fn next(&mut self) -> Option<Self::Item> {
        let (index, range) = self.batches.next()?;
        let batch_indices = &self.indices[range.clone()];
        let batch = self.x.index_select(batch_indices).and_then(|x| {
            Ok(Batch {
                index,
                range,
                x,
                y: self.y.index_select(batch_indices)?,
            })
        });
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.batches.size_hint()
    }
}

impl ExactSizeIterator for DataLoaderIterator<'_> {}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_pcg::Pcg64Mcg;

    use super::*;

    #[test]
    fn test_make_batches() {
        assert_eq!(make_batches(10, 3), vec![0..3, 3..6, 6..9, 9..10]);
        assert_eq!(make_batches(4, 2), vec![0..2, 2..4]);
        assert_eq!(make_batches(0, 5), Vec::<Range<usize>>::new());
        assert_eq!(make_batches(3, 0), Vec::<Range<usize>>::new());
    }

    #[test]
    fn test_make_batches_covers_all_samples() {
        for n in 0..40 {
            for b in 1..12 {
                let batches = make_batches(n, b);
                assert_eq!(batches.len(), n.div_ceil(b));
                let mut next = 0;
                for range in &batches {
                    assert_eq!(range.start, next);
                    assert!(range.start < range.end);
                    assert!(range.len() <= b);
                    next = range.end;
                }
                assert_eq!(next, n);
            }
        }
    }

    #[test]
    fn test_validation_split_index() {
        assert_eq!(validation_split_index(10, 0.2), Some(8));
        assert_eq!(validation_split_index(10, 0.0), None);
        assert_eq!(validation_split_index(10, 1.0), None);
        assert_eq!(validation_split_index(10, -0.5), None);
        assert_eq!(validation_split_index(3, 0.5), Some(1));
    }

    #[test]
    fn test_dataloader() {
        let x = Tensor::from_rows(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0], vec![7.0, 8.0, 9.0]])
            .unwrap();
        let y = Tensor::new(vec![0.0, 1.0, 0.0], &[3]).unwrap();
        let mut loader = DataLoader::new(&x, &y, 2, false).unwrap();
        assert_eq!(loader.n_batches(), 2);

        let mut iter = loader.epoch(&mut rand::rng());
        assert_eq!(iter.len(), 2);
        let first = iter.next().unwrap().unwrap();
        assert_eq!(first.index, 0);
        assert_eq!(first.x.to_vec(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(first.y.to_vec(), vec![0.0, 1.0]);
        let last = iter.next().unwrap().unwrap();
        assert_eq!(last.len(), 1);
        assert_eq!(last.x.shape(), &[1, 3]);
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_dataloader_shuffle_keeps_pairs() {
        let x = Tensor::new((0..10).map(|v| v as f32).collect(), &[10, 1]).unwrap();
        let y = Tensor::new((0..10).map(|v| v as f32 * 10.0).collect(), &[10]).unwrap();
        let mut loader = DataLoader::new(&x, &y, 3, true).unwrap();
        let mut rng = Pcg64Mcg::seed_from_u64(42);

        let mut seen = Vec::new();
        for batch in loader.epoch(&mut rng) {
            let batch = batch.unwrap();
            for (a, b) in batch.x.to_vec().into_iter().zip(batch.y.to_vec()) {
                assert_eq!(a * 10.0, b);
                seen.push(a as usize);
            }
        }
        seen.sort();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_dataloader_seeded_order_is_reproducible() {
        let x = Tensor::zeros(&[20, 2]).unwrap();
        let y = Tensor::zeros(&[20]).unwrap();
        let orders = |seed| {
            let mut loader = DataLoader::new(&x, &y, 4, true).unwrap();
            let mut rng = Pcg64Mcg::seed_from_u64(seed);
            (0..3)
                .map(|_| {
                    let _ = loader.epoch(&mut rng);
                    loader.indices().to_vec()
                })
                .collect::<Vec<_>>()
        };
        let a = orders(7);
        assert_eq!(a, orders(7));
        assert_ne!(a[0], a[1]);
        assert_ne!(a[0], (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_dataloader_errors() {
        let x = Tensor::zeros(&[2, 3]).unwrap();
        let y = Tensor::zeros(&[3]).unwrap();
        let loader = DataLoader::new(&x, &y, 2, false);
        assert!(matches!(
            loader,
            Err(DataLoaderError::LabelLengthMismatch {
                label_len: 3,
                data_len: 2,
            })
        ));

        let y = Tensor::zeros(&[2]).unwrap();
        assert!(matches!(
            DataLoader::new(&x, &y, 0, false),
            Err(DataLoaderError::ZeroBatchSize)
        ));
    }
}
