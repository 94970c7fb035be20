use std::{
    error::Error,
    fmt::{self, Display},
};

use ndarray::ShapeError;
use rand_distr::{NormalError, uniform::Error as UniformError};

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug)]
pub enum MlErr {
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    Shape(ShapeError),
    MissingForward {
        layer: &'static str,
    },
    LabelOutOfRange {
        label: usize,
        classes: usize,
    },
    InvalidArchitecture(String),
    InvalidDistribution(String),
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "There's a size mismatch for {what}, got {got} and expected {expected}"
            ),
            MlErr::Shape(e) => write!(f, "Invalid tensor shape: {e}"),
            MlErr::MissingForward { layer } => write!(
                f,
                "Tried to run the backward pass of a {layer} layer without a previous forward pass"
            ),
            MlErr::LabelOutOfRange { label, classes } => write!(
                f,
                "The label {label} is out of range for a model with {classes} classes"
            ),
            MlErr::InvalidArchitecture(msg) => write!(f, "Invalid architecture: {msg}"),
            MlErr::InvalidDistribution(msg) => {
                write!(f, "Invalid parameter distribution: {msg}")
            }
        }
    }
}

impl Error for MlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlErr::Shape(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ShapeError> for MlErr {
    fn from(value: ShapeError) -> Self {
        Self::Shape(value)
    }
}

impl From<NormalError> for MlErr {
    fn from(value: NormalError) -> Self {
        Self::InvalidDistribution(value.to_string())
    }
}

impl From<UniformError> for MlErr {
    fn from(value: UniformError) -> Self {
        Self::InvalidDistribution(value.to_string())
    }
}
