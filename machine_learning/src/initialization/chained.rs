use rand::Rng;

use super::ParamGen;

/// A parameter generator that delegates the generation to a chain of parameter generators.
///
/// Used to give each tensor of a model its own generator, each knowing how many
/// parameters it has to generate.
pub struct ChainedParamGen<R: Rng> {
    param_gens: Vec<Box<dyn ParamGen<R>>>,
    curr: usize,
    remaining: usize,
}

impl<R: Rng> ChainedParamGen<R> {
    /// Creates a new `ChainedParamGen` parameter generator.
    ///
    /// # Arguments
    /// * `param_gens` - A vec of potentially different parameter generators.
    pub fn new(param_gens: Vec<Box<dyn ParamGen<R>>>) -> Self {
        let remaining = param_gens
            .iter()
            .map(|param_gen| param_gen.remaining())
            .sum();

        Self {
            param_gens,
            remaining,
            curr: 0,
        }
    }
}

impl<R: Rng> ParamGen<R> for ChainedParamGen<R> {
    fn sample(&mut self, rng: &mut R, n: usize) -> Option<Vec<f32>> {
        if self.curr == self.param_gens.len() || self.remaining == 0 {
            return None;
        }

        match self.param_gens[self.curr].sample(rng, n) {
            Some(sample) if sample.len() == n => {
                self.remaining -= sample.len();
                Some(sample)
            }
            Some(mut sample) => {
                self.remaining -= sample.len();
                self.curr += 1;

                if let Some(next_sample) = self.sample(rng, n - sample.len()) {
                    sample.extend(next_sample);
                }

                Some(sample)
            }
            None => {
                self.curr += 1;
                self.sample(rng, n)
            }
        }
    }

    fn remaining(&self) -> usize {
        self.remaining
    }
}
