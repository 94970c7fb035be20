use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

use crate::{Result, TrainErr};

/// A partition of `0..n` into disjoint training and validation indices.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
}

impl Split {
    /// Generates a split of `0..n`.
    ///
    /// The first `floor(fraction * n)` indices, after the optional seeded shuffle, go to
    /// validation and the rest to training.
    ///
    /// # Arguments
    /// * `n` - The size of the dataset.
    /// * `fraction` - The validation fraction, within `(0, 1)`.
    /// * `shuffle` - Whether to shuffle the indices before splitting.
    /// * `seed` - The seed of the shuffle.
    ///
    /// # Returns
    /// An error if `fraction` is out of range.
    pub fn generate(n: usize, fraction: f64, shuffle: bool, seed: u64) -> Result<Self> {
        if !(fraction > 0. && fraction < 1.) {
            return Err(TrainErr::Config(format!(
                "validation fraction must be within (0, 1), got {fraction}"
            )));
        }

        let mut indices: Vec<usize> = (0..n).collect();
        if shuffle {
            let mut rng = StdRng::seed_from_u64(seed);
            indices.shuffle(&mut rng);
        }

        let at = (fraction * n as f64).floor() as usize;
        let train = indices.split_off(at);

        Ok(Self {
            train,
            validation: indices,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_partition(split: &Split, n: usize) {
        let mut all: Vec<usize> = split
            .train
            .iter()
            .chain(&split.validation)
            .copied()
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..n).collect::<Vec<_>>());
    }

    #[test]
    fn same_seed_same_split() {
        let a = Split::generate(500, 0.2, true, 1234).unwrap();
        let b = Split::generate(500, 0.2, true, 1234).unwrap();
        let c = Split::generate(500, 0.2, true, 4321).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn splits_are_disjoint_and_exhaustive() {
        for n in [0, 1, 7, 100, 1013] {
            for fraction in [0.01, 0.2, 0.5, 0.99] {
                let split = Split::generate(n, fraction, true, n as u64).unwrap();
                assert_eq!(split.validation.len(), (fraction * n as f64).floor() as usize);
                assert_partition(&split, n);
            }
        }
    }

    #[test]
    fn unshuffled_split_keeps_order() {
        let split = Split::generate(10, 0.2, false, 0).unwrap();
        assert_eq!(split.validation, [0, 1]);
        assert_eq!(split.train, [2, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn fraction_out_of_range_fails() {
        for fraction in [0., 1., -0.5, f64::NAN] {
            assert!(matches!(
                Split::generate(10, fraction, true, 0),
                Err(TrainErr::Config(_))
            ));
        }
    }
}
