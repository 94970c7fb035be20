use ndarray::ArrayD;

use super::{Conv2d, Dense, Flatten, MaxPool2d, Relu};
use crate::Result;

/// A layer of a `Sequential` model.
#[derive(Clone, Debug)]
pub enum Layer {
    Conv2d(Conv2d),
    MaxPool2d(MaxPool2d),
    Relu(Relu),
    Flatten(Flatten),
    Dense(Dense),
}
use Layer::*;

impl Layer {
    pub fn conv2d(in_channels: usize, out_channels: usize, kernel: usize, padding: usize) -> Self {
        Conv2d(super::Conv2d::new(in_channels, out_channels, kernel, padding))
    }

    pub fn max_pool2d(size: usize) -> Self {
        MaxPool2d(super::MaxPool2d::new(size))
    }

    pub fn relu() -> Self {
        Relu(super::Relu::new())
    }

    pub fn flatten() -> Self {
        Flatten(super::Flatten::new())
    }

    pub fn dense(dim: (usize, usize)) -> Self {
        Dense(super::Dense::new(dim))
    }

    /// Returns the amount of parameters this layer takes from the model's buffer.
    pub fn size(&self) -> usize {
        match self {
            Conv2d(l) => l.size(),
            Dense(l) => l.size(),
            MaxPool2d(_) | Relu(_) | Flatten(_) => 0,
        }
    }

    /// A short name for the kind of layer, used to name its tensors.
    pub fn kind(&self) -> &'static str {
        match self {
            Conv2d(_) => "conv2d",
            MaxPool2d(_) => "max_pool2d",
            Relu(_) => "relu",
            Flatten(_) => "flatten",
            Dense(_) => "dense",
        }
    }

    /// Returns the name and shape of every tensor this layer owns, in buffer order.
    pub fn tensors(&self) -> Vec<(&'static str, Vec<usize>)> {
        match self {
            Conv2d(l) => {
                let (o, i, k) = (l.out_channels(), l.in_channels(), l.kernel());
                vec![("weight", vec![o, i, k, k]), ("bias", vec![o])]
            }
            Dense(l) => {
                let (n, m) = l.dim();
                vec![("weight", vec![n, m]), ("bias", vec![m])]
            }
            MaxPool2d(_) | Relu(_) | Flatten(_) => vec![],
        }
    }

    /// Returns the `(fan_in, fan_out)` of the layer's weights, used by the initializers.
    pub fn fans(&self) -> (usize, usize) {
        match self {
            Conv2d(l) => {
                let area = l.kernel() * l.kernel();
                (l.in_channels() * area, l.out_channels() * area)
            }
            Dense(l) => l.dim(),
            MaxPool2d(_) | Relu(_) | Flatten(_) => (0, 0),
        }
    }

    pub fn forward(&mut self, params: &[f32], x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        match self {
            Conv2d(l) => l.forward(params, x),
            MaxPool2d(l) => l.forward(x),
            Relu(l) => l.forward(x),
            Flatten(l) => l.forward(x),
            Dense(l) => l.forward(params, x),
        }
    }

    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: ArrayD<f32>,
    ) -> Result<ArrayD<f32>> {
        match self {
            Conv2d(l) => l.backward(params, grad, d),
            MaxPool2d(l) => l.backward(d),
            Relu(l) => l.backward(d),
            Flatten(l) => l.backward(d),
            Dense(l) => l.backward(params, grad, d),
        }
    }
}
