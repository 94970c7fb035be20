use ndarray::Array3;

use super::Transform;
use crate::{Result, TrainErr};

/// A single labeled `(channels, height, width)` image.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub image: Array3<f32>,
    pub label: usize,
}

/// An ordered, indexable and immutable collection of samples.
pub trait Dataset {
    /// Returns the amount of samples.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Loads the sample at `idx`.
    fn get(&self, idx: usize) -> Result<Sample>;

    /// Returns the `(channels, height, width)` of every sample.
    fn shape(&self) -> (usize, usize, usize);
}

impl<D: Dataset + ?Sized> Dataset for &D {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn get(&self, idx: usize) -> Result<Sample> {
        (**self).get(idx)
    }

    fn shape(&self) -> (usize, usize, usize) {
        (**self).shape()
    }
}

/// A dataset held entirely in memory.
#[derive(Clone, Debug)]
pub struct InMemoryDataset {
    samples: Vec<Sample>,
    shape: (usize, usize, usize),
}

impl InMemoryDataset {
    /// Creates a new dataset from owned samples.
    ///
    /// # Arguments
    /// * `shape` - The `(channels, height, width)` every sample must have.
    /// * `samples` - The samples.
    ///
    /// # Returns
    /// An error if any sample doesn't have the given shape.
    pub fn new(shape: (usize, usize, usize), samples: Vec<Sample>) -> Result<Self> {
        if let Some(sample) = samples.iter().find(|s| s.image.dim() != shape) {
            let (c, h, w) = sample.image.dim();
            return Err(TrainErr::ShapeMismatch {
                what: "in memory sample".into(),
                got: vec![c, h, w],
                expected: vec![shape.0, shape.1, shape.2],
            });
        }

        Ok(Self { samples, shape })
    }
}

impl Dataset for InMemoryDataset {
    fn len(&self) -> usize {
        self.samples.len()
    }

    fn get(&self, idx: usize) -> Result<Sample> {
        self.samples
            .get(idx)
            .cloned()
            .ok_or(TrainErr::IndexOutOfRange {
                idx,
                len: self.samples.len(),
            })
    }

    fn shape(&self) -> (usize, usize, usize) {
        self.shape
    }
}

/// A dataset that applies a transform to every sample it loads.
pub struct Transformed<D, T> {
    inner: D,
    transform: T,
}

impl<D: Dataset, T: Transform> Transformed<D, T> {
    pub fn new(inner: D, transform: T) -> Self {
        Self { inner, transform }
    }
}

impl<D: Dataset, T: Transform> Dataset for Transformed<D, T> {
    fn len(&self) -> usize {
        self.inner.len()
    }

    fn get(&self, idx: usize) -> Result<Sample> {
        let Sample { image, label } = self.inner.get(idx)?;
        let image = self.transform.apply(image)?;
        Ok(Sample { image, label })
    }

    fn shape(&self) -> (usize, usize, usize) {
        let (c, h, w) = self.inner.shape();
        (self.transform.out_channels(c), h, w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::AppendRatioIndex;

    #[test]
    fn in_memory_dataset_checks_shapes() {
        let good = Sample {
            image: Array3::zeros((2, 4, 4)),
            label: 0,
        };
        let bad = Sample {
            image: Array3::zeros((3, 4, 4)),
            label: 1,
        };

        assert!(InMemoryDataset::new((2, 4, 4), vec![good.clone()]).is_ok());
        assert!(matches!(
            InMemoryDataset::new((2, 4, 4), vec![good, bad]),
            Err(TrainErr::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn transformed_dataset_reports_new_shape() {
        let sample = Sample {
            image: Array3::from_elem((2, 4, 4), 2.),
            label: 3,
        };
        let dataset = InMemoryDataset::new((2, 4, 4), vec![sample]).unwrap();
        let transformed = Transformed::new(
            &dataset,
            AppendRatioIndex {
                numerator: 0,
                denominator: 1,
            },
        );

        assert_eq!(transformed.shape(), (3, 4, 4));

        let sample = transformed.get(0).unwrap();
        assert_eq!(sample.label, 3);
        assert_eq!(sample.image[[2, 1, 1]], 1.);
        assert!(transformed.get(1).is_err());
    }
}
