use ndarray::{ArrayD, Ix4, Zip, linalg, prelude::*};

use crate::{MlErr, Result};

/// Spatial bookkeeping for a single stride-1 convolution pass.
#[derive(Clone, Copy, Debug)]
struct Geometry {
    channels: usize,
    kernel: usize,
    padding: usize,
    height: usize,
    width: usize,
    out_height: usize,
    out_width: usize,
}

impl Geometry {
    fn rows(&self) -> usize {
        self.channels * self.kernel * self.kernel
    }

    fn cols(&self) -> usize {
        self.out_height * self.out_width
    }

    /// Returns the input coordinate that the output `(oi, oj)` reads through the kernel tap
    /// `(ki, kj)`, or `None` if it falls on the zero padding.
    #[inline]
    fn source(&self, oi: usize, oj: usize, ki: usize, kj: usize) -> Option<(usize, usize)> {
        let i = (oi + ki).checked_sub(self.padding)?;
        let j = (oj + kj).checked_sub(self.padding)?;
        (i < self.height && j < self.width).then_some((i, j))
    }

    /// Unrolls every receptive field of `x` into a column of `col`.
    fn im2col(&self, x: ArrayView3<f32>, mut col: ArrayViewMut2<f32>) {
        let k = self.kernel;

        for c in 0..self.channels {
            for ki in 0..k {
                for kj in 0..k {
                    let mut row = col.row_mut((c * k + ki) * k + kj);

                    for oi in 0..self.out_height {
                        for oj in 0..self.out_width {
                            if let Some((i, j)) = self.source(oi, oj, ki, kj) {
                                row[oi * self.out_width + oj] = x[[c, i, j]];
                            }
                        }
                    }
                }
            }
        }
    }

    /// Folds the columns of `col` back onto `dx`, summing overlapping receptive fields.
    fn col2im(&self, col: ArrayView2<f32>, mut dx: ArrayViewMut3<f32>) {
        let k = self.kernel;

        for c in 0..self.channels {
            for ki in 0..k {
                for kj in 0..k {
                    let row = col.row((c * k + ki) * k + kj);

                    for oi in 0..self.out_height {
                        for oj in 0..self.out_width {
                            if let Some((i, j)) = self.source(oi, oj, ki, kj) {
                                dx[[c, i, j]] += row[oi * self.out_width + oj];
                            }
                        }
                    }
                }
            }
        }
    }
}

#[derive(Clone, Debug)]
struct ConvCache {
    cols: Array3<f32>,
    geometry: Geometry,
}

/// A 2D convolution (cross-correlation) layer with stride 1 and symmetric zero padding.
///
/// The parameter slice holds the `(out, in, k, k)` kernels in row major order followed by the
/// `out` biases. The forward pass unrolls the input with im2col so every sample is a single
/// matrix product; samples are processed in parallel on the rayon pool.
#[derive(Clone, Debug)]
pub struct Conv2d {
    in_channels: usize,
    out_channels: usize,
    kernel: usize,
    padding: usize,
    size: usize,

    cache: Option<ConvCache>,
}

impl Conv2d {
    /// Creates a new `Conv2d` layer.
    ///
    /// # Arguments
    /// * `in_channels` - The amount of channels of the input.
    /// * `out_channels` - The amount of kernels, thus channels of the output.
    /// * `kernel` - The side of the square kernels.
    /// * `padding` - The amount of zeros added on each side of the input.
    ///
    /// # Returns
    /// A new `Conv2d` instance.
    pub fn new(in_channels: usize, out_channels: usize, kernel: usize, padding: usize) -> Self {
        Self {
            in_channels,
            out_channels,
            kernel,
            padding,
            size: out_channels * in_channels * kernel * kernel + out_channels,
            cache: None,
        }
    }

    /// Returns the amount of parameters this layer has.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    pub fn kernel(&self) -> usize {
        self.kernel
    }

    /// Returns the spatial size of the output for an input of `(height, width)`.
    pub fn output_hw(&self, (height, width): (usize, usize)) -> Option<(usize, usize)> {
        let span = |n: usize| (n + 2 * self.padding).checked_sub(self.kernel).map(|n| n + 1);
        Some((span(height)?, span(width)?))
    }

    pub fn forward(&mut self, params: &[f32], x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let x = x.into_dimensionality::<Ix4>()?;
        let (n, channels, height, width) = x.dim();

        if channels != self.in_channels {
            return Err(MlErr::SizeMismatch {
                what: "conv2d input channels",
                got: channels,
                expected: self.in_channels,
            });
        }

        let (out_height, out_width) = self.output_hw((height, width)).ok_or_else(|| {
            MlErr::InvalidArchitecture(format!(
                "a {k}x{k} kernel does not fit a {height}x{width} input",
                k = self.kernel
            ))
        })?;

        let geometry = Geometry {
            channels,
            kernel: self.kernel,
            padding: self.padding,
            height,
            width,
            out_height,
            out_width,
        };

        let mut cols = Array3::zeros((n, geometry.rows(), geometry.cols()));
        Zip::from(cols.outer_iter_mut())
            .and(x.outer_iter())
            .par_for_each(|col, xi| geometry.im2col(xi, col));

        let (w, b) = self.view_params(params)?;
        let b = b.insert_axis(Axis(1));
        let mut out = Array3::zeros((n, self.out_channels, geometry.cols()));
        Zip::from(out.outer_iter_mut())
            .and(cols.outer_iter())
            .par_for_each(|mut o, col| {
                linalg::general_mat_mul(1.0, &w, &col, 0.0, &mut o);
                o += &b;
            });

        self.cache = Some(ConvCache { cols, geometry });

        let out = out.into_shape_with_order((n, self.out_channels, out_height, out_width))?;
        Ok(out.into_dyn())
    }

    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: ArrayD<f32>,
    ) -> Result<ArrayD<f32>> {
        let ConvCache { cols, geometry } = self
            .cache
            .take()
            .ok_or(MlErr::MissingForward { layer: "conv2d" })?;

        let n = cols.len_of(Axis(0));
        let d = d.to_shape((n, self.out_channels, geometry.cols()))?;

        let (mut dw, mut db) = self.view_grad(grad)?;
        for (di, col) in d.outer_iter().zip(cols.outer_iter()) {
            linalg::general_mat_mul(1.0, &di, &col.t(), 1.0, &mut dw);
        }
        db += &d.sum_axis(Axis(2)).sum_axis(Axis(0));

        let (w, _) = self.view_params(params)?;
        let mut dx = Array4::zeros((n, geometry.channels, geometry.height, geometry.width));
        Zip::from(dx.outer_iter_mut())
            .and(d.outer_iter())
            .par_for_each(|dxi, di| {
                let mut dcol = Array2::zeros((geometry.rows(), geometry.cols()));
                linalg::general_mat_mul(1.0, &w.t(), &di, 0.0, &mut dcol);
                geometry.col2im(dcol.view(), dxi);
            });

        Ok(dx.into_dyn())
    }

    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        self.check_len("conv2d gradient", grad.len())?;

        let (dw_raw, db_raw) = grad.split_at_mut(self.size - self.out_channels);
        let dw = ArrayViewMut2::from_shape(self.weight_dim(), dw_raw)?;
        let db = ArrayViewMut1::from_shape(self.out_channels, db_raw)?;
        Ok((dw, db))
    }

    fn view_params<'a>(
        &self,
        params: &'a [f32],
    ) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        self.check_len("conv2d parameters", params.len())?;

        let (w_raw, b_raw) = params.split_at(self.size - self.out_channels);
        let w = ArrayView2::from_shape(self.weight_dim(), w_raw)?;
        let b = ArrayView1::from_shape(self.out_channels, b_raw)?;
        Ok((w, b))
    }

    /// The kernels seen as a matrix with one row per output channel.
    fn weight_dim(&self) -> (usize, usize) {
        (
            self.out_channels,
            self.in_channels * self.kernel * self.kernel,
        )
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

#[cfg(test)]
mod tests {
    use super::*;

    /// Direct (loop based) cross-correlation used as a reference.
    fn naive_conv(
        x: &Array4<f32>,
        w: &Array4<f32>,
        b: &Array1<f32>,
        padding: usize,
    ) -> Array4<f32> {
        let (n, c, h, wd) = x.dim();
        let (o, _, k, _) = w.dim();
        let (oh, ow) = (h + 2 * padding - k + 1, wd + 2 * padding - k + 1);
        let mut out = Array4::zeros((n, o, oh, ow));

        for s in 0..n {
            for oc in 0..o {
                for i in 0..oh {
                    for j in 0..ow {
                        let mut acc = b[oc];
                        for ic in 0..c {
                            for ki in 0..k {
                                for kj in 0..k {
                                    let (si, sj) = (i + ki, j + kj);
                                    if si < padding || sj < padding {
                                        continue;
                                    }
                                    let (si, sj) = (si - padding, sj - padding);
                                    if si >= h || sj >= wd {
                                        continue;
                                    }
                                    acc += w[[oc, ic, ki, kj]] * x[[s, ic, si, sj]];
                                }
                            }
                        }
                        out[[s, oc, i, j]] = acc;
                    }
                }
            }
        }

        out
    }

    fn params_for(w: &Array4<f32>, b: &Array1<f32>) -> Vec<f32> {
        w.iter().chain(b.iter()).copied().collect()
    }

    fn ramp(shape: (usize, usize, usize, usize), scale: f32) -> Array4<f32> {
        let len = shape.0 * shape.1 * shape.2 * shape.3;
        let values = (0..len).map(|i| ((i * 7 % 11) as f32 - 5.) * scale).collect();
        Array4::from_shape_vec(shape, values).unwrap()
    }

    #[test]
    fn forward_matches_naive_cross_correlation() {
        let x = ramp((2, 3, 5, 4), 0.1);
        let w = ramp((4, 3, 3, 3), 0.05);
        let b = array![0.1, -0.2, 0.3, 0.];

        let mut conv = Conv2d::new(3, 4, 3, 1);
        let y = conv.forward(&params_for(&w, &b), x.clone().into_dyn()).unwrap();

        let expected = naive_conv(&x, &w, &b, 1);
        assert_eq!(y.shape(), expected.shape());
        for (a, e) in y.iter().zip(expected.iter()) {
            assert!((a - e).abs() < 1e-5, "{a} != {e}");
        }
    }

    #[test]
    fn valid_padding_shrinks_output() {
        let mut conv = Conv2d::new(1, 1, 3, 0);
        let params = vec![0.; conv.size()];
        let y = conv
            .forward(&params, Array4::<f32>::zeros((1, 1, 6, 5)).into_dyn())
            .unwrap();

        assert_eq!(y.shape(), &[1, 1, 4, 3]);
    }

    #[test]
    fn backward_matches_finite_differences() {
        let x = ramp((1, 2, 4, 4), 0.2);
        let w = ramp((2, 2, 3, 3), 0.1);
        let b = array![0.05, -0.05];
        let params = params_for(&w, &b);

        // loss = sum(y * r) for a fixed r, so dL/dy = r.
        let r = ramp((1, 2, 4, 4), 0.3);
        let loss = |params: &[f32], x: &Array4<f32>| {
            let mut conv = Conv2d::new(2, 2, 3, 1);
            let y = conv.forward(params, x.clone().into_dyn()).unwrap();
            (&y * &r.clone().into_dyn()).sum()
        };

        let mut conv = Conv2d::new(2, 2, 3, 1);
        let mut grad = vec![0.; conv.size()];
        conv.forward(&params, x.clone().into_dyn()).unwrap();
        let dx = conv
            .backward(&params, &mut grad, r.clone().into_dyn())
            .unwrap();

        let eps = 1e-2;
        for i in [0, 5, 17, 35, 36, 37] {
            let mut plus = params.clone();
            let mut minus = params.clone();
            plus[i] += eps;
            minus[i] -= eps;
            let numeric = (loss(&plus, &x) - loss(&minus, &x)) / (2. * eps);
            assert!((numeric - grad[i]).abs() < 1e-2, "param {i}: {numeric} vs {}", grad[i]);
        }

        for idx in [[0, 0, 0, 0], [0, 1, 2, 3], [0, 0, 3, 1]] {
            let mut plus = x.clone();
            let mut minus = x.clone();
            plus[idx] += eps;
            minus[idx] -= eps;
            let numeric = (loss(&params, &plus) - loss(&params, &minus)) / (2. * eps);
            let analytic = dx[&idx[..]];
            assert!((numeric - analytic).abs() < 1e-2, "x{idx:?}: {numeric} vs {analytic}");
        }
    }

    #[test]
    fn wrong_channel_count_fails() {
        let mut conv = Conv2d::new(3, 2, 3, 1);
        let params = vec![0.; conv.size()];
        let res = conv.forward(&params, Array4::<f32>::zeros((1, 2, 4, 4)).into_dyn());

        assert!(matches!(res, Err(MlErr::SizeMismatch { .. })));
    }
}
