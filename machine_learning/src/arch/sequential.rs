use std::mem;

use ndarray::{Array2, ArrayView4, Ix2};
use rand::Rng;

use super::{Model, TensorSpec, layers::Layer};
use crate::{
    MlErr, Result,
    initialization::{ChainedParamGen, Init, ParamGen},
};

/// A sequential model: information flows forward when computing an output and backward when
/// computing the *deltas* of its layers.
///
/// Each layer takes the next `layer.size()` parameters of the flat buffer, so the buffer is
/// walked from the front on the forward pass and from the back on the backward pass.
#[derive(Clone, Debug)]
pub struct Sequential {
    layers: Vec<Layer>,
}

impl Sequential {
    /// Creates a new `Sequential`.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    ///
    /// # Returns
    /// A new `Sequential` instance.
    pub fn new<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = Layer>,
    {
        Self {
            layers: layers.into_iter().collect(),
        }
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    fn check_len(&self, what: &'static str, got: usize) -> Result<()> {
        let expected = self.size();
        if got != expected {
            return Err(MlErr::SizeMismatch {
                what,
                got,
                expected,
            });
        }

        Ok(())
    }
}

impl Model for Sequential {
    fn size(&self) -> usize {
        self.layers.iter().map(|layer| layer.size()).sum()
    }

    fn layout(&self) -> Vec<TensorSpec> {
        self.layers
            .iter()
            .enumerate()
            .flat_map(|(i, layer)| {
                layer.tensors().into_iter().map(move |(tensor, shape)| {
                    TensorSpec::new(format!("{i}.{}.{tensor}", layer.kind()), shape)
                })
            })
            .collect()
    }

    fn init_params<R: Rng>(&self, rng: &mut R, init: Init) -> Result<Vec<f32>> {
        let param_gens = self
            .layers
            .iter()
            .filter(|layer| layer.size() > 0)
            .flat_map(|layer| {
                let (fan_in, fan_out) = layer.fans();
                layer
                    .tensors()
                    .into_iter()
                    .map(move |(tensor, shape)| {
                        let limit = shape.iter().product();
                        match tensor {
                            "bias" => init.bias_gen(limit, fan_in),
                            _ => init.weight_gen(limit, fan_in, fan_out),
                        }
                    })
            })
            .collect::<Result<Vec<Box<dyn ParamGen<R>>>>>()?;

        let size = self.size();
        let mut param_gen = ChainedParamGen::new(param_gens);
        let params = param_gen.sample(rng, size).unwrap_or_default();

        if params.len() != size {
            return Err(MlErr::SizeMismatch {
                what: "initial parameters",
                got: params.len(),
                expected: size,
            });
        }

        Ok(params)
    }

    fn forward(&mut self, params: &[f32], x: ArrayView4<f32>) -> Result<Array2<f32>> {
        self.check_len("params", params.len())?;

        let mut rest = params;
        let mut x = x.to_owned().into_dyn();

        for layer in self.layers.iter_mut() {
            let (head, tail) = rest.split_at(layer.size());
            x = layer.forward(head, x)?;
            rest = tail;
        }

        Ok(x.into_dimensionality::<Ix2>()?)
    }

    fn backward(&mut self, params: &[f32], grad: &mut [f32], d: Array2<f32>) -> Result<()> {
        self.check_len("params", params.len())?;
        self.check_len("grad", grad.len())?;

        let mut params_rest = params;
        let mut grad_rest = grad;
        let mut d = d.into_dyn();

        for layer in self.layers.iter_mut().rev() {
            let at = params_rest.len() - layer.size();
            let (params_head, params_tail) = params_rest.split_at(at);
            let (grad_head, grad_tail) = mem::take(&mut grad_rest).split_at_mut(at);

            d = layer.backward(params_tail, grad_tail, d)?;

            params_rest = params_head;
            grad_rest = grad_head;
        }

        Ok(())
    }
}
