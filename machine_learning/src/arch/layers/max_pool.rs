use ndarray::{ArrayD, Ix4, Zip, prelude::*};

use crate::{MlErr, Result};

#[derive(Clone, Debug)]
struct PoolCache {
    input_dim: (usize, usize, usize, usize),
    argmax: Array4<usize>,
}

/// Non overlapping max pooling over `size x size` windows.
///
/// Trailing rows and columns that don't fill a whole window are dropped.
#[derive(Clone, Debug)]
pub struct MaxPool2d {
    size: usize,
    cache: Option<PoolCache>,
}

impl MaxPool2d {
    pub fn new(size: usize) -> Self {
        Self { size, cache: None }
    }

    pub fn window(&self) -> usize {
        self.size
    }

    pub fn forward(&mut self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let x = x.into_dimensionality::<Ix4>()?;
        let (n, c, h, w) = x.dim();
        let k = self.size;
        let (oh, ow) = (h / k, w / k);

        if oh == 0 || ow == 0 {
            return Err(MlErr::InvalidArchitecture(format!(
                "a {k}x{k} pooling window does not fit a {h}x{w} input"
            )));
        }

        let mut out = Array4::<f32>::zeros((n, c, oh, ow));
        let mut argmax = Array4::<usize>::zeros((n, c, oh, ow));

        Zip::indexed(&mut out)
            .and(&mut argmax)
            .for_each(|(s, ch, oi, oj), o, a| {
                let mut best = f32::NEG_INFINITY;
                let mut at = (oi * k, oj * k);

                for i in oi * k..(oi + 1) * k {
                    for j in oj * k..(oj + 1) * k {
                        let v = x[[s, ch, i, j]];
                        if v > best {
                            best = v;
                            at = (i, j);
                        }
                    }
                }

                *o = best;
                *a = at.0 * w + at.1;
            });

        self.cache = Some(PoolCache {
            input_dim: (n, c, h, w),
            argmax,
        });

        Ok(out.into_dyn())
    }

    /// Routes each delta to the position that won the max in the forward pass.
    pub fn backward(&mut self, d: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let PoolCache { input_dim, argmax } = self
            .cache
            .take()
            .ok_or(MlErr::MissingForward { layer: "max_pool2d" })?;

        let d = d.into_dimensionality::<Ix4>()?;
        if d.dim() != argmax.dim() {
            return Err(MlErr::SizeMismatch {
                what: "max_pool2d delta",
                got: d.len(),
                expected: argmax.len(),
            });
        }

        let w = input_dim.3;
        let mut dx = Array4::zeros(input_dim);
        Zip::indexed(&d)
            .and(&argmax)
            .for_each(|(s, ch, _, _), &g, &a| dx[[s, ch, a / w, a % w]] += g);

        Ok(dx.into_dyn())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_window_maxima_and_routes_deltas_back() {
        let x = array![[[
            [1., 5., 2., 0.],
            [3., 4., 8., 1.],
            [0., 0., 1., 1.],
            [9., 0., 1., 2.]
        ]]];

        let mut pool = MaxPool2d::new(2);
        let y = pool.forward(x.into_dyn()).unwrap();
        assert_eq!(y, array![[[[5., 8.], [9., 2.]]]].into_dyn());

        let dx = pool
            .backward(array![[[[1., 2.], [3., 4.]]]].into_dyn())
            .unwrap();
        let expected = array![[[
            [0., 1., 0., 0.],
            [0., 0., 2., 0.],
            [0., 0., 0., 0.],
            [3., 0., 0., 4.]
        ]]];
        assert_eq!(dx, expected.into_dyn());
    }

    #[test]
    fn odd_sizes_drop_the_remainder() {
        let mut pool = MaxPool2d::new(2);
        let y = pool
            .forward(Array4::<f32>::ones((2, 3, 5, 7)).into_dyn())
            .unwrap();
        assert_eq!(y.shape(), &[2, 3, 2, 3]);
    }
}
