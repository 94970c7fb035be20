use ndarray::{Array4, Axis};
use rand::{Rng, seq::SliceRandom};

use super::Dataset;
use crate::{Result, TrainErr};

/// A batch of images with their labels.
#[derive(Clone, Debug)]
pub struct Batch {
    pub images: Array4<f32>,
    pub labels: Vec<usize>,
}

impl Batch {
    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Iterates a subset of a dataset, in the order of its indices, yielding batches.
pub struct DataLoader<'a, D: ?Sized> {
    dataset: &'a D,
    indices: Vec<usize>,
    batch_size: usize,
    cursor: usize,
}

impl<'a, D: Dataset + ?Sized> DataLoader<'a, D> {
    /// Creates a new `DataLoader`.
    ///
    /// # Arguments
    /// * `dataset` - The dataset to load samples from.
    /// * `indices` - The indices of the samples this loader walks, in order.
    /// * `batch_size` - The maximum size of each batch, the last one may be shorter.
    pub fn new(dataset: &'a D, indices: Vec<usize>, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(TrainErr::Config("batch size must be greater than 0".into()));
        }

        Ok(Self {
            dataset,
            indices,
            batch_size,
            cursor: 0,
        })
    }

    /// Creates a loader over the whole dataset.
    pub fn sequential(dataset: &'a D, batch_size: usize) -> Result<Self> {
        Self::new(dataset, (0..dataset.len()).collect(), batch_size)
    }

    /// Returns the amount of samples this loader walks.
    #[inline]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn num_batches(&self) -> usize {
        self.indices.len().div_ceil(self.batch_size)
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    #[inline]
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Shuffles the order of the indices and rewinds the loader.
    pub fn reshuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.indices.shuffle(rng);
        self.reset();
    }

    /// Loads the next batch, or `None` once every index was visited.
    pub fn next_batch(&mut self) -> Result<Option<Batch>> {
        if self.cursor >= self.indices.len() {
            return Ok(None);
        }

        let end = (self.cursor + self.batch_size).min(self.indices.len());
        let chunk = &self.indices[self.cursor..end];

        let (c, h, w) = self.dataset.shape();
        let mut images = Array4::zeros((chunk.len(), c, h, w));
        let mut labels = Vec::with_capacity(chunk.len());

        for (mut slot, &idx) in images.axis_iter_mut(Axis(0)).zip(chunk) {
            let sample = self.dataset.get(idx)?;
            if sample.image.dim() != (c, h, w) {
                let (gc, gh, gw) = sample.image.dim();
                return Err(TrainErr::ShapeMismatch {
                    what: format!("sample {idx}"),
                    got: vec![gc, gh, gw],
                    expected: vec![c, h, w],
                });
            }

            slot.assign(&sample.image);
            labels.push(sample.label);
        }

        self.cursor = end;
        Ok(Some(Batch { images, labels }))
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array3;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::data::{InMemoryDataset, Sample};

    fn numbered(n: usize) -> InMemoryDataset {
        let samples = (0..n)
            .map(|i| Sample {
                image: Array3::from_elem((1, 2, 2), i as f32),
                label: i,
            })
            .collect();

        InMemoryDataset::new((1, 2, 2), samples).unwrap()
    }

    #[test]
    fn batches_follow_the_indices() {
        let dataset = numbered(10);
        let mut loader = DataLoader::new(&dataset, vec![7, 2, 9, 4, 1], 2).unwrap();
        assert_eq!(loader.num_batches(), 3);

        let b1 = loader.next_batch().unwrap().unwrap();
        assert_eq!(b1.labels, [7, 2]);
        assert_eq!(b1.images.dim(), (2, 1, 2, 2));
        assert_eq!(b1.images[[1, 0, 1, 1]], 2.);

        let b2 = loader.next_batch().unwrap().unwrap();
        assert_eq!(b2.labels, [9, 4]);

        let b3 = loader.next_batch().unwrap().unwrap();
        assert_eq!(b3.labels, [1]);

        assert!(loader.next_batch().unwrap().is_none());

        loader.reset();
        assert_eq!(loader.next_batch().unwrap().unwrap().labels, [7, 2]);
    }

    #[test]
    fn reshuffle_keeps_the_same_indices() {
        let dataset = numbered(20);
        let mut loader = DataLoader::sequential(&dataset, 4).unwrap();
        let mut rng = StdRng::seed_from_u64(9);

        loader.next_batch().unwrap();
        loader.reshuffle(&mut rng);

        let mut seen = Vec::new();
        while let Some(batch) = loader.next_batch().unwrap() {
            seen.extend(batch.labels);
        }

        assert_ne!(seen, (0..20).collect::<Vec<_>>());
        seen.sort_unstable();
        assert_eq!(seen, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn zero_batch_size_fails() {
        let dataset = numbered(1);
        assert!(DataLoader::sequential(&dataset, 0).is_err());
    }
}
