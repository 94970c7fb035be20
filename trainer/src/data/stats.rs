use log::warn;
use ndarray::Axis;

use super::{DataLoader, Dataset, Normalize};
use crate::{Result, TrainErr};

/// Per channel mean and standard deviation of a dataset.
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelStats {
    pub mean: Vec<f32>,
    pub std: Vec<f32>,
}

impl ChannelStats {
    /// Sweeps `loader` once, from the start.
    ///
    /// The mean is the average of the per batch channel means and the standard deviation is
    /// `sqrt(E[x²] - mean²)` with `E[x²]` averaged the same way. Channels without a positive
    /// standard deviation get a standard deviation of 1.
    ///
    /// # Returns
    /// An error if the loader yields no batches or a batch fails to load.
    pub fn compute<D: Dataset + ?Sized>(loader: &mut DataLoader<'_, D>) -> Result<Self> {
        loader.reset();

        let mut sum: Vec<f64> = Vec::new();
        let mut sq_sum: Vec<f64> = Vec::new();
        let mut num_batches = 0usize;

        while let Some(batch) = loader.next_batch()? {
            let channels = batch.images.len_of(Axis(1));
            sum.resize(channels, 0.);
            sq_sum.resize(channels, 0.);

            for (c, channel) in batch.images.axis_iter(Axis(1)).enumerate() {
                let n = channel.len().max(1) as f64;
                let (s, sq) = channel.fold((0f64, 0f64), |(s, sq), &x| {
                    let x = x as f64;
                    (s + x, sq + x * x)
                });

                sum[c] += s / n;
                sq_sum[c] += sq / n;
            }

            num_batches += 1;
        }

        loader.reset();

        if num_batches == 0 {
            return Err(TrainErr::EmptyDataset);
        }

        let nb = num_batches as f64;
        let mean: Vec<f64> = sum.iter().map(|s| s / nb).collect();
        let std = sq_sum
            .iter()
            .zip(&mean)
            .enumerate()
            .map(|(c, (sq, mean))| {
                let std = (sq / nb - mean * mean).sqrt();
                if std > 0. && std.is_finite() {
                    std as f32
                } else {
                    warn!("channel {c} has no spread (std {std}), normalizing it with std 1");
                    1.
                }
            })
            .collect();

        Ok(Self {
            mean: mean.into_iter().map(|m| m as f32).collect(),
            std,
        })
    }

    pub fn normalize(&self) -> Result<Normalize> {
        Normalize::new(self.mean.clone(), self.std.clone())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array3;

    use super::*;
    use crate::data::{InMemoryDataset, Sample};

    fn dataset(values: &[(f32, f32)]) -> InMemoryDataset {
        let samples = values
            .iter()
            .map(|&(a, b)| {
                let mut image = Array3::zeros((2, 2, 2));
                image.index_axis_mut(Axis(0), 0).fill(a);
                image.index_axis_mut(Axis(0), 1).fill(b);
                Sample { image, label: 0 }
            })
            .collect();

        InMemoryDataset::new((2, 2, 2), samples).unwrap()
    }

    #[test]
    fn averages_batch_means() {
        // Batches {1, 3} and {5}: batch means 2 and 5.
        let dataset = dataset(&[(1., 7.), (3., 7.), (5., 7.)]);
        let mut loader = DataLoader::sequential(&dataset, 2).unwrap();

        let stats = ChannelStats::compute(&mut loader).unwrap();
        assert!((stats.mean[0] - 3.5).abs() < 1e-6);

        // E[x²] = (5 + 25) / 2 = 15, 15 - 3.5² = 2.75
        assert!((stats.std[0] - 2.75f32.sqrt()).abs() < 1e-5);

        // A constant channel falls back to a unit std.
        assert!((stats.mean[1] - 7.).abs() < 1e-6);
        assert_eq!(stats.std[1], 1.);
    }

    #[test]
    fn empty_dataset_fails() {
        let dataset = dataset(&[]);
        let mut loader = DataLoader::sequential(&dataset, 16).unwrap();

        assert!(matches!(
            ChannelStats::compute(&mut loader),
            Err(TrainErr::EmptyDataset)
        ));
    }
}
