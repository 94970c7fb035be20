use ndarray::ArrayD;

use crate::{MlErr, Result};

/// Collapses every axis but the first (batch) one.
#[derive(Clone, Debug, Default)]
pub struct Flatten {
    shape: Option<Vec<usize>>,
}

impl Flatten {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forward(&mut self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let shape = x.shape().to_vec();
        let n = shape.first().copied().unwrap_or(0);
        let features: usize = shape.iter().skip(1).product();

        let x = x
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order((n, features))?;

        self.shape = Some(shape);
        Ok(x.into_dyn())
    }

    pub fn backward(&mut self, d: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let shape = self
            .shape
            .take()
            .ok_or(MlErr::MissingForward { layer: "flatten" })?;

        Ok(d.into_shape_with_order(shape)?)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array4;

    use super::*;

    #[test]
    fn flatten_round_trips_the_batch_shape() {
        let mut flatten = Flatten::new();
        let x = Array4::<f32>::zeros((3, 2, 4, 5)).into_dyn();

        let y = flatten.forward(x).unwrap();
        assert_eq!(y.shape(), &[3, 40]);

        let dx = flatten.backward(y).unwrap();
        assert_eq!(dx.shape(), &[3, 2, 4, 5]);
    }

    #[test]
    fn flatten_reads_permuted_inputs_in_logical_order() {
        let mut flatten = Flatten::new();
        // (n, h, w, c) storage viewed as (n, c, h, w)
        let x = Array4::from_shape_vec((1, 2, 2, 2), (0..8).map(|v| v as f32).collect())
            .unwrap()
            .permuted_axes([0, 3, 1, 2])
            .into_dyn();

        let y = flatten.forward(x).unwrap();
        assert_eq!(y.shape(), &[1, 8]);
        assert_eq!(y.iter().copied().collect::<Vec<_>>(), [0., 2., 4., 6., 1., 3., 5., 7.]);
    }
}
