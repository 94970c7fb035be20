use ndarray::ArrayD;

use crate::{MlErr, Result};

/// Rectified linear unit, `max(0, x)` applied elementwise.
#[derive(Clone, Debug, Default)]
pub struct Relu {
    a: Option<ArrayD<f32>>,
}

impl Relu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forward(&mut self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let a = x.mapv_into(|z| z.max(0.));
        self.a = Some(a.clone());
        Ok(a)
    }

    pub fn backward(&mut self, mut d: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let a = self.a.take().ok_or(MlErr::MissingForward { layer: "relu" })?;

        if d.shape() != a.shape() {
            return Err(MlErr::SizeMismatch {
                what: "relu delta",
                got: d.len(),
                expected: a.len(),
            });
        }

        d.zip_mut_with(&a, |d, &a| {
            if a <= 0. {
                *d = 0.;
            }
        });

        Ok(d)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn relu_masks_negative_inputs() {
        let mut relu = Relu::new();
        let y = relu.forward(array![[-1., 0., 2.]].into_dyn()).unwrap();
        assert_eq!(y, array![[0., 0., 2.]].into_dyn());

        let d = relu.backward(array![[5., 5., 5.]].into_dyn()).unwrap();
        assert_eq!(d, array![[0., 0., 5.]].into_dyn());
    }
}
