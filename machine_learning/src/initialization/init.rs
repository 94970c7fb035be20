use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{ConstParamGen, ParamGen, RandParamGen};
use crate::Result;

/// The scheme used to draw a model's initial parameters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Init {
    /// Weights and biases from `U(-1/sqrt(fan_in), 1/sqrt(fan_in))`.
    #[default]
    TorchDefault,
    /// Kaiming normal weights, zero biases.
    Kaiming,
    /// Xavier uniform weights, zero biases.
    Xavier,
}

impl Init {
    /// Builds the generator for a weight tensor.
    ///
    /// # Arguments
    /// * `limit` - The amount of elements in the tensor.
    /// * `fan_in` - The number of input units in the weight tensor.
    /// * `fan_out` - The number of output units in the weight tensor.
    pub fn weight_gen<R: Rng>(
        self,
        limit: usize,
        fan_in: usize,
        fan_out: usize,
    ) -> Result<Box<dyn ParamGen<R>>> {
        let param_gen: Box<dyn ParamGen<R>> = match self {
            Init::TorchDefault => Box::new(RandParamGen::fan_in_uniform(limit, fan_in)?),
            Init::Kaiming => Box::new(RandParamGen::kaiming(limit, fan_in)?),
            Init::Xavier => Box::new(RandParamGen::xavier_uniform(limit, fan_in, fan_out)?),
        };

        Ok(param_gen)
    }

    /// Builds the generator for a bias tensor.
    pub fn bias_gen<R: Rng>(self, limit: usize, fan_in: usize) -> Result<Box<dyn ParamGen<R>>> {
        let param_gen: Box<dyn ParamGen<R>> = match self {
            Init::TorchDefault => Box::new(RandParamGen::fan_in_uniform(limit, fan_in)?),
            Init::Kaiming | Init::Xavier => Box::new(ConstParamGen::new(0., limit)),
        };

        Ok(param_gen)
    }
}
