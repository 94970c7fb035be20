use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};

use super::ParamGen;
use crate::Result;

/// A parameter generator that follows a certain probabilistic distribution.
pub struct RandParamGen<D: Distribution<f32>> {
    distribution: D,
    remaining: usize,
}

impl<D: Distribution<f32>> RandParamGen<D> {
    /// Creates a new `RandParamGen` parameter generator.
    ///
    /// # Arguments
    /// * `distribution` - The distribution to sample the random numbers from.
    /// * `limit` - The maximum amount of numbers to generate.
    pub fn new(distribution: D, limit: usize) -> Self {
        Self {
            distribution,
            remaining: limit,
        }
    }
}

impl RandParamGen<Uniform<f32>> {
    /// Creates a new `RandParamGen` with a uniform distribution over `[low, high)`.
    ///
    /// # Returns
    /// An error if the range is invalid.
    pub fn uniform(limit: usize, low: f32, high: f32) -> Result<Self> {
        Ok(Self::new(Uniform::new(low, high)?, limit))
    }

    /// Creates a new `RandParamGen` using Xavier uniform initialization.
    ///
    /// # Arguments
    /// * `limit` - The maximum amount of numbers to generate.
    /// * `fan_in` - The number of input units in the weight tensor.
    /// * `fan_out` - The number of output units in the weight tensor.
    ///
    /// # Returns
    /// An error if the calculated range is invalid.
    pub fn xavier_uniform(limit: usize, fan_in: usize, fan_out: usize) -> Result<Self> {
        let range = (6. / (fan_in + fan_out) as f32).sqrt();
        Self::uniform(limit, -range, range)
    }

    /// Creates a new `RandParamGen` sampling from `U(-1/sqrt(fan_in), 1/sqrt(fan_in))`, the
    /// default for both the weights and biases of convolutional and dense layers in most
    /// frameworks.
    ///
    /// # Arguments
    /// * `limit` - The maximum amount of numbers to generate.
    /// * `fan_in` - The number of input units in the weight tensor.
    ///
    /// # Returns
    /// An error if the calculated range is invalid.
    pub fn fan_in_uniform(limit: usize, fan_in: usize) -> Result<Self> {
        let range = 1. / (fan_in as f32).sqrt();
        Self::uniform(limit, -range, range)
    }
}

impl RandParamGen<Normal<f32>> {
    /// Creates a new `RandParamGen` with a normal distribution.
    ///
    /// # Returns
    /// An error if `std_dev` is not finite.
    pub fn normal(limit: usize, mean: f32, std_dev: f32) -> Result<Self> {
        Ok(Self::new(Normal::new(mean, std_dev)?, limit))
    }

    /// Creates a new `RandParamGen` using Kaiming normal initialization.
    ///
    /// # Arguments
    /// * `limit` - The maximum amount of numbers to generate.
    /// * `fan_in` - The number of input units in the weight tensor.
    ///
    /// # Returns
    /// An error if the calculated standard deviation is not finite.
    pub fn kaiming(limit: usize, fan_in: usize) -> Result<Self> {
        let std_dev = (2. / fan_in as f32).sqrt();
        Self::normal(limit, 0., std_dev)
    }
}

impl<R: Rng, D: Distribution<f32>> ParamGen<R> for RandParamGen<D> {
    fn sample(&mut self, rng: &mut R, mut n: usize) -> Option<Vec<f32>> {
        if self.remaining == 0 {
            return None;
        }

        n = n.min(self.remaining);
        self.remaining -= n;
        Some((0..n).map(|_| self.distribution.sample(rng)).collect())
    }

    fn remaining(&self) -> usize {
        self.remaining
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::MlErr;

    #[test]
    fn fan_in_uniform_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut param_gen = RandParamGen::fan_in_uniform(1000, 16).unwrap();

        let params = param_gen.sample(&mut rng, 2000).unwrap();
        assert_eq!(params.len(), 1000);
        assert!(params.iter().all(|p| p.abs() < 0.25));
        assert!(param_gen.sample(&mut rng, 1).is_none());
    }

    #[test]
    fn zero_fan_in_is_rejected() {
        let res = RandParamGen::fan_in_uniform(10, 0);
        assert!(matches!(res, Err(MlErr::InvalidDistribution(_))));
    }
}
