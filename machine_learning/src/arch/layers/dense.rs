use ndarray::{ArrayD, Ix2, linalg, prelude::*};

use crate::{MlErr, Result};

/// A fully connected layer computing `x · w + b`.
///
/// The parameter slice is laid out as the `(n, m)` weight matrix in row major order followed by
/// the `m` biases.
#[derive(Clone, Debug)]
pub struct Dense {
    dim: (usize, usize),
    size: usize,

    // Forward metadata
    x: Option<Array2<f32>>,
}

impl Dense {
    /// Creates a new `Dense` layer.
    ///
    /// # Arguments
    /// * `dim` - The amount of input and output features.
    ///
    /// # Returns
    /// A new `Dense` instance.
    pub fn new(dim: (usize, usize)) -> Self {
        Self {
            dim,
            size: (dim.0 + 1) * dim.1,
            x: None,
        }
    }

    /// Returns the size of this layer.
    ///
    /// # Returns
    /// The amount of parameters this layer has.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn dim(&self) -> (usize, usize) {
        self.dim
    }

    /// Feeds a `(batch, n)` input through the layer.
    ///
    /// # Arguments
    /// * `params` - This layer's parameter slice.
    /// * `x` - The input, must be two dimensional.
    ///
    /// # Returns
    /// The `(batch, m)` output or an error if the shapes don't line up.
    pub fn forward(&mut self, params: &[f32], x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let x = x.into_dimensionality::<Ix2>()?;
        if x.ncols() != self.dim.0 {
            return Err(MlErr::SizeMismatch {
                what: "dense input features",
                got: x.ncols(),
                expected: self.dim.0,
            });
        }

        let (w, b) = self.view_params(params)?;
        let mut z = Array2::zeros((x.nrows(), self.dim.1));
        linalg::general_mat_mul(1.0, &x, &w, 0.0, &mut z);
        z += &b;

        self.x = Some(x);
        Ok(z.into_dyn())
    }

    /// Propagates the delta `d` backwards, accumulating this layer's gradient into `grad`.
    ///
    /// # Arguments
    /// * `params` - This layer's parameter slice.
    /// * `grad` - This layer's gradient slice.
    /// * `d` - The derivative of the loss with respect to this layer's output.
    ///
    /// # Returns
    /// The derivative of the loss with respect to this layer's input.
    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: ArrayD<f32>,
    ) -> Result<ArrayD<f32>> {
        let d = d.into_dimensionality::<Ix2>()?;
        let x = self
            .x
            .take()
            .ok_or(MlErr::MissingForward { layer: "dense" })?;

        let (mut dw, mut db) = self.view_grad(grad)?;
        linalg::general_mat_mul(1.0, &x.t(), &d, 1.0, &mut dw);
        db += &d.sum_axis(Axis(0));

        let (w, _) = self.view_params(params)?;
        let mut dx = Array2::zeros((d.nrows(), self.dim.0));
        linalg::general_mat_mul(1.0, &d, &w.t(), 0.0, &mut dx);

        Ok(dx.into_dyn())
    }

    /// Gives a view of the raw gradient slice as the delta weights and delta biases of this layer.
    ///
    /// # Arguments
    /// * `grad` - A gradient slice.
    ///
    /// # Returns
    /// A tuple containing the delta weights and delta biases.
    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        self.check_len("dense gradient", grad.len())?;

        let w_size = self.size - self.dim.1;
        let (dw_raw, db_raw) = grad.split_at_mut(w_size);
        let dw = ArrayViewMut2::from_shape(self.dim, dw_raw)?;
        let db = ArrayViewMut1::from_shape(self.dim.1, db_raw)?;
        Ok((dw, db))
    }

    /// Gives a view of the raw parameter slice as the weights and biases of this layer.
    ///
    /// # Arguments
    /// * `params` - A slice of parameters.
    ///
    /// # Returns
    /// A tuple containing the weights and biases.
    fn view_params<'a>(
        &self,
        params: &'a [f32],
    ) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        self.check_len("dense parameters", params.len())?;

        let w_size = self.size - self.dim.1;
        let weights = ArrayView2::from_shape(self.dim, &params[..w_size])?;
        let biases = ArrayView1::from_shape(self.dim.1, &params[w_size..])?;
        Ok((weights, biases))
    }

    fn check_len(&self, what: &'static str, got: usize) -> Result<()> {
        if got != self.size {
            return Err(MlErr::SizeMismatch {
                what,
                got,
                expected: self.size,
            });
        }

        Ok(())
    }
}
