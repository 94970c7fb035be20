use ndarray::{Array1, Array2, Array3, ArrayView2, Axis, Zip, concatenate};
use serde::{Deserialize, Serialize};

use crate::{Result, TrainErr};

/// A per-sample image transformation.
pub trait Transform {
    /// Transforms a `(channels, height, width)` image.
    fn apply(&self, image: Array3<f32>) -> Result<Array3<f32>>;

    /// Returns the amount of channels of the output given `channels` input channels.
    fn out_channels(&self, channels: usize) -> usize {
        channels
    }
}

impl<T: Transform + ?Sized> Transform for Box<T> {
    fn apply(&self, image: Array3<f32>) -> Result<Array3<f32>> {
        (**self).apply(image)
    }

    fn out_channels(&self, channels: usize) -> usize {
        (**self).out_channels(channels)
    }
}

/// Standardizes every channel with its own mean and standard deviation.
#[derive(Clone, Debug)]
pub struct Normalize {
    mean: Array1<f32>,
    std: Array1<f32>,
}

impl Normalize {
    /// Creates a new `Normalize` transform.
    ///
    /// # Arguments
    /// * `mean` - The per channel mean.
    /// * `std` - The per channel standard deviation, every value must be positive.
    pub fn new(mean: Vec<f32>, std: Vec<f32>) -> Result<Self> {
        if mean.len() != std.len() {
            return Err(TrainErr::ShapeMismatch {
                what: "normalization std".into(),
                got: vec![std.len()],
                expected: vec![mean.len()],
            });
        }

        if let Some(bad) = std.iter().find(|s| !(**s > 0.)) {
            return Err(TrainErr::Config(format!(
                "normalization std must be positive, got {bad}"
            )));
        }

        Ok(Self {
            mean: Array1::from(mean),
            std: Array1::from(std),
        })
    }
}

impl Transform for Normalize {
    fn apply(&self, mut image: Array3<f32>) -> Result<Array3<f32>> {
        let channels = image.len_of(Axis(0));
        if channels != self.mean.len() {
            return Err(TrainErr::ShapeMismatch {
                what: "normalized image channels".into(),
                got: vec![channels],
                expected: vec![self.mean.len()],
            });
        }

        Zip::from(image.outer_iter_mut())
            .and(&self.mean)
            .and(&self.std)
            .for_each(|mut channel, &mean, &std| {
                channel.mapv_inplace(|x| (x - mean) / std);
            });

        Ok(image)
    }
}

/// Appends a channel computed band by band from two existing channels.
fn append_channel<F>(image: Array3<f32>, a: usize, b: usize, f: F) -> Result<Array3<f32>>
where
    F: Fn(f32, f32) -> f32,
{
    check_bands(&image, &[a, b])?;

    let index: Array2<f32> = Zip::from(image.index_axis(Axis(0), a))
        .and(image.index_axis(Axis(0), b))
        .map_collect(|&x, &y| f(x, y));

    stack_channel(image, index.view())
}

fn stack_channel(image: Array3<f32>, channel: ArrayView2<f32>) -> Result<Array3<f32>> {
    Ok(concatenate(
        Axis(0),
        &[image.view(), channel.insert_axis(Axis(0))],
    )?)
}

fn check_bands(image: &Array3<f32>, bands: &[usize]) -> Result<()> {
    let channels = image.len_of(Axis(0));

    match bands.iter().find(|&&band| band >= channels) {
        Some(&band) => Err(TrainErr::ShapeMismatch {
            what: format!("spectral band {band}"),
            got: vec![channels],
            expected: vec![band + 1],
        }),
        None => Ok(()),
    }
}

fn safe_div(num: f32, den: f32) -> f32 {
    if den == 0. { 0. } else { num / den }
}

/// Appends `(a - b) / (a + b)`, the shape of NDVI, NDWI and friends.
#[derive(Clone, Copy, Debug)]
pub struct AppendNormalizedDifferenceIndex {
    pub a: usize,
    pub b: usize,
}

impl Transform for AppendNormalizedDifferenceIndex {
    fn apply(&self, image: Array3<f32>) -> Result<Array3<f32>> {
        append_channel(image, self.a, self.b, |a, b| safe_div(a - b, a + b))
    }

    fn out_channels(&self, channels: usize) -> usize {
        channels + 1
    }
}

/// Appends `numerator / denominator`.
#[derive(Clone, Copy, Debug)]
pub struct AppendRatioIndex {
    pub numerator: usize,
    pub denominator: usize,
}

impl Transform for AppendRatioIndex {
    fn apply(&self, image: Array3<f32>) -> Result<Array3<f32>> {
        append_channel(image, self.numerator, self.denominator, safe_div)
    }

    fn out_channels(&self, channels: usize) -> usize {
        channels + 1
    }
}

/// Appends the automated water extraction index,
/// `4 (green - swir1) - (0.25 nir + 2.75 swir2)`.
#[derive(Clone, Copy, Debug)]
pub struct AppendAwei {
    pub green: usize,
    pub nir: usize,
    pub swir1: usize,
    pub swir2: usize,
}

impl Transform for AppendAwei {
    fn apply(&self, image: Array3<f32>) -> Result<Array3<f32>> {
        check_bands(&image, &[self.green, self.nir, self.swir1, self.swir2])?;

        let band = |i| image.index_axis(Axis(0), i);
        let index: Array2<f32> = Zip::from(band(self.green))
            .and(band(self.nir))
            .and(band(self.swir1))
            .and(band(self.swir2))
            .map_collect(|&green, &nir, &swir1, &swir2| {
                4. * (green - swir1) - (0.25 * nir + 2.75 * swir2)
            });

        stack_channel(image, index.view())
    }

    fn out_channels(&self, channels: usize) -> usize {
        channels + 1
    }
}

/// A spectral index channel requested through the configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SpectralIndex {
    NormalizedDifference {
        a: usize,
        b: usize,
    },
    Ratio {
        numerator: usize,
        denominator: usize,
    },
    Awei {
        green: usize,
        nir: usize,
        swir1: usize,
        swir2: usize,
    },
}

impl SpectralIndex {
    /// Returns the input bands the index reads.
    pub fn bands(&self) -> Vec<usize> {
        match *self {
            SpectralIndex::NormalizedDifference { a, b } => vec![a, b],
            SpectralIndex::Ratio {
                numerator,
                denominator,
            } => vec![numerator, denominator],
            SpectralIndex::Awei {
                green,
                nir,
                swir1,
                swir2,
            } => vec![green, nir, swir1, swir2],
        }
    }

    pub fn into_transform(self) -> Box<dyn Transform> {
        match self {
            SpectralIndex::NormalizedDifference { a, b } => {
                Box::new(AppendNormalizedDifferenceIndex { a, b })
            }
            SpectralIndex::Ratio {
                numerator,
                denominator,
            } => Box::new(AppendRatioIndex {
                numerator,
                denominator,
            }),
            SpectralIndex::Awei {
                green,
                nir,
                swir1,
                swir2,
            } => Box::new(AppendAwei {
                green,
                nir,
                swir1,
                swir2,
            }),
        }
    }
}

/// Applies a list of transforms in order.
#[derive(Default)]
pub struct Compose {
    transforms: Vec<Box<dyn Transform>>,
}

impl Compose {
    pub fn new(transforms: Vec<Box<dyn Transform>>) -> Self {
        Self { transforms }
    }

    pub fn push<T: Transform + 'static>(&mut self, transform: T) {
        self.transforms.push(Box::new(transform));
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

impl Transform for Compose {
    fn apply(&self, image: Array3<f32>) -> Result<Array3<f32>> {
        self.transforms
            .iter()
            .try_fold(image, |image, transform| transform.apply(image))
    }

    fn out_channels(&self, channels: usize) -> usize {
        self.transforms
            .iter()
            .fold(channels, |channels, transform| transform.out_channels(channels))
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    fn two_bands() -> Array3<f32> {
        array![[[3., 0.], [1., 2.]], [[1., 0.], [1., 6.]]]
    }

    #[test]
    fn normalize_standardizes_each_channel() {
        let normalize = Normalize::new(vec![1., 2.], vec![2., 4.]).unwrap();
        let out = normalize.apply(two_bands()).unwrap();

        assert_eq!(out, array![[[1., -0.5], [0., 0.5]], [[-0.25, -0.5], [-0.25, 1.]]]);
    }

    #[test]
    fn normalize_rejects_wrong_channel_count() {
        let normalize = Normalize::new(vec![0.; 3], vec![1.; 3]).unwrap();
        assert!(matches!(
            normalize.apply(two_bands()),
            Err(TrainErr::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn normalized_difference_handles_zero_sums() {
        let ndi = AppendNormalizedDifferenceIndex { a: 0, b: 1 };
        let out = ndi.apply(two_bands()).unwrap();

        assert_eq!(out.dim(), (3, 2, 2));
        assert_eq!(out.index_axis(Axis(0), 2), array![[0.5, 0.], [0., -0.5]]);
    }

    #[test]
    fn ratio_and_awei_append_one_channel_each() {
        let compose = Compose::new(vec![
            SpectralIndex::Ratio {
                numerator: 1,
                denominator: 0,
            }
            .into_transform(),
            SpectralIndex::Awei {
                green: 0,
                nir: 1,
                swir1: 1,
                swir2: 0,
            }
            .into_transform(),
        ]);

        assert_eq!(compose.out_channels(2), 4);

        let out = compose.apply(two_bands()).unwrap();
        assert_eq!(out.index_axis(Axis(0), 2), array![[1. / 3., 0.], [1., 3.]]);
        // 4 (3 - 1) - (0.25 + 2.75 * 3)
        assert_eq!(out[[3, 0, 0]], 8. - 8.5);
    }

    #[test]
    fn missing_band_fails() {
        let ndi = AppendNormalizedDifferenceIndex { a: 0, b: 7 };
        assert!(matches!(
            ndi.apply(two_bands()),
            Err(TrainErr::ShapeMismatch { .. })
        ));
    }
}
