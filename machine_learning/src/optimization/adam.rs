use super::{Optimizer, optimizer::check_sizes};
use crate::Result;

#[derive(Debug)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    beta1_t: f32,
    beta2_t: f32,
    v: Box<[f32]>,
    s: Box<[f32]>,
    epsilon: f32,
}

impl Adam {
    /// Creates a new `Adam` optimizer.
    ///
    /// # Arguments
    /// * `len` - The amount of parameters this instance should hold.
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    /// * `beta1`, `beta2`, `epsilon` - Hyperparameters to the optimization algorithm.
    ///
    /// # Returns
    /// A new `Adam` instance.
    pub fn new(len: usize, learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            beta1_t: 1.,
            beta2_t: 1.,
            v: vec![0.; len].into_boxed_slice(),
            s: vec![0.; len].into_boxed_slice(),
            epsilon,
        }
    }

    /// Creates a new `Adam` optimizer with the usual `0.9`, `0.999` and `1e-8` hyperparameters.
    pub fn with_defaults(len: usize, learning_rate: f32) -> Self {
        Self::new(len, learning_rate, 0.9, 0.999, 1e-8)
    }
}

impl Optimizer for Adam {
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()> {
        check_sizes(grad, params)?;
        check_sizes(&self.v, params)?;

        let Self {
            learning_rate: lr,
            beta1: b1,
            beta2: b2,
            epsilon: eps,
            ..
        } = *self;

        self.beta1_t *= b1;
        self.beta2_t *= b2;

        let step_size = lr / (1. - self.beta1_t);
        let bc2_sqrt = (1. - self.beta2_t).sqrt();

        params
            .iter_mut()
            .zip(grad)
            .zip(self.v.iter_mut())
            .zip(self.s.iter_mut())
            .for_each(|(((p, g), v), s)| {
                *v = b1 * *v + (1. - b1) * g;
                *s = b2 * *s + (1. - b2) * g.powi(2);
                *p -= step_size * *v / (s.sqrt() / bc2_sqrt + eps);
            });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MlErr;

    #[test]
    fn first_step_moves_by_the_learning_rate() {
        let mut adam = Adam::with_defaults(2, 0.1);
        let mut params = [1., -1.];

        adam.update_params(&[0.5, -3.], &mut params).unwrap();

        // The bias corrected first step is `lr * sign(g)`.
        assert!((params[0] - 0.9).abs() < 1e-5);
        assert!((params[1] + 0.9).abs() < 1e-5);
    }

    #[test]
    fn size_mismatch_fails() {
        let mut adam = Adam::with_defaults(2, 0.1);
        let res = adam.update_params(&[0.5], &mut [1., 2.]);
        assert!(matches!(res, Err(MlErr::SizeMismatch { .. })));
    }
}
