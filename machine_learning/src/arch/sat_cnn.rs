use super::{Sequential, layers::Layer};
use crate::{MlErr, Result};

/// Builds the two block convolutional classifier used for multi-band satellite tiles.
///
/// Each block is a 3x3 same padded convolution, a ReLU and a 2x2 max pool, followed by a
/// 128 unit hidden layer and the class scores.
///
/// # Arguments
/// * `in_channels` - The amount of bands of the input images.
/// * `height`, `width` - The size of the input images, both must be divisible by 4.
/// * `num_classes` - The amount of classes to score.
///
/// # Returns
/// The model or an error if the input size can't go through both pooling layers.
pub fn sat_cnn(
    in_channels: usize,
    height: usize,
    width: usize,
    num_classes: usize,
) -> Result<Sequential> {
    if in_channels == 0 || num_classes == 0 {
        return Err(MlErr::InvalidArchitecture(format!(
            "need at least one input channel and one class, got {in_channels} and {num_classes}"
        )));
    }

    if height == 0 || width == 0 || height % 4 != 0 || width % 4 != 0 {
        return Err(MlErr::InvalidArchitecture(format!(
            "image size {height}x{width} must be a non zero multiple of 4"
        )));
    }

    let flat = 32 * (height / 4) * (width / 4);

    Ok(Sequential::new([
        Layer::conv2d(in_channels, 16, 3, 1),
        Layer::relu(),
        Layer::max_pool2d(2),
        Layer::conv2d(16, 32, 3, 1),
        Layer::relu(),
        Layer::max_pool2d(2),
        Layer::flatten(),
        Layer::dense((flat, 128)),
        Layer::relu(),
        Layer::dense((128, num_classes)),
    ]))
}

#[cfg(test)]
mod tests {
    use ndarray::Array4;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::{arch::Model, initialization::Init};

    #[test]
    fn eurosat_sized_model() {
        let model = sat_cnn(13, 64, 64, 10).unwrap();

        let conv = 16 * 13 * 9 + 16 + 32 * 16 * 9 + 32;
        let dense = 32 * 16 * 16 * 128 + 128 + 128 * 10 + 10;
        assert_eq!(model.size(), conv + dense);
        assert_eq!(model.layout().len(), 8);
    }

    #[test]
    fn scores_every_class() {
        let mut model = sat_cnn(3, 8, 8, 5).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let params = model.init_params(&mut rng, Init::TorchDefault).unwrap();

        let x = Array4::from_elem((4, 3, 8, 8), 0.1);
        let y = model.forward(&params, x.view()).unwrap();
        assert_eq!(y.dim(), (4, 5));
    }

    #[test]
    fn odd_sizes_are_rejected() {
        assert!(matches!(
            sat_cnn(13, 62, 64, 10),
            Err(MlErr::InvalidArchitecture(_))
        ));
    }
}
