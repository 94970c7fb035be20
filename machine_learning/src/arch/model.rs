use ndarray::{Array2, ArrayView4};
use rand::Rng;

use crate::{Result, initialization::Init};

/// A named tensor inside a model's flat parameter buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TensorSpec {
    pub name: String,
    pub shape: Vec<usize>,
}

impl TensorSpec {
    pub fn new(name: impl Into<String>, shape: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            shape,
        }
    }

    /// Returns the amount of elements in the tensor.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An image classifier whose parameters live outside of it, in a flat buffer.
pub trait Model {
    /// Returns the amount of parameters in the model.
    fn size(&self) -> usize;

    /// Returns the tensors the flat parameter buffer is made of, in order.
    fn layout(&self) -> Vec<TensorSpec>;

    /// Draws an initial parameter buffer.
    ///
    /// # Arguments
    /// * `rng` - A random number generator.
    /// * `init` - The initialization scheme.
    fn init_params<R: Rng>(&self, rng: &mut R, init: Init) -> Result<Vec<f32>>;

    /// Makes a forward pass through the model.
    ///
    /// # Arguments
    /// * `params` - The model's parameters.
    /// * `x` - A `(batch, channels, height, width)` batch of images.
    ///
    /// # Returns
    /// The `(batch, classes)` scores or an error if the shapes don't match.
    fn forward(&mut self, params: &[f32], x: ArrayView4<f32>) -> Result<Array2<f32>>;

    /// Propagates the derivative of the loss with respect to the last forward pass' output,
    /// **accumulating** the gradient into `grad`.
    ///
    /// # Arguments
    /// * `params` - The model's parameters.
    /// * `grad` - A buffer the same size as `params`.
    /// * `d` - The derivative of the loss with respect to the scores.
    fn backward(&mut self, params: &[f32], grad: &mut [f32], d: Array2<f32>) -> Result<()>;
}
