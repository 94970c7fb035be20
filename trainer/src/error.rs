use std::{error::Error, fmt, io, path::PathBuf};

use machine_learning::MlErr;
use safetensors::SafeTensorError;
use tiff::TiffError;

/// The trainer's result type.
pub type Result<T> = std::result::Result<T, TrainErr>;

/// Failures of an experiment run, from reading the dataset to writing checkpoints.
#[derive(Debug)]
pub enum TrainErr {
    Io(io::Error),
    Tiff {
        path: PathBuf,
        source: TiffError,
    },
    Checkpoint(String),
    Config(String),
    Ml(MlErr),
    MissingDataset(PathBuf),
    EmptyDataset,
    EmptySplit(&'static str),
    IndexOutOfRange {
        idx: usize,
        len: usize,
    },
    ShapeMismatch {
        what: String,
        got: Vec<usize>,
        expected: Vec<usize>,
    },
}

impl fmt::Display for TrainErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainErr::Io(e) => write!(f, "io error: {e}"),
            TrainErr::Tiff { path, source } => {
                write!(f, "cannot decode {}: {source}", path.display())
            }
            TrainErr::Checkpoint(msg) => write!(f, "checkpoint error: {msg}"),
            TrainErr::Config(msg) => write!(f, "invalid config: {msg}"),
            TrainErr::Ml(e) => write!(f, "{e}"),
            TrainErr::MissingDataset(path) => {
                write!(f, "dataset not found at {}", path.display())
            }
            TrainErr::EmptyDataset => write!(f, "the dataset has no samples"),
            TrainErr::EmptySplit(which) => write!(f, "the {which} split has no samples"),
            TrainErr::IndexOutOfRange { idx, len } => {
                write!(f, "sample {idx} is out of range for a dataset of {len} samples")
            }
            TrainErr::ShapeMismatch {
                what,
                got,
                expected,
            } => write!(f, "shape mismatch for {what}: got {got:?}, expected {expected:?}"),
        }
    }
}

impl Error for TrainErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TrainErr::Io(e) => Some(e),
            TrainErr::Tiff { source, .. } => Some(source),
            TrainErr::Ml(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TrainErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<MlErr> for TrainErr {
    fn from(value: MlErr) -> Self {
        Self::Ml(value)
    }
}

impl From<SafeTensorError> for TrainErr {
    fn from(value: SafeTensorError) -> Self {
        Self::Checkpoint(value.to_string())
    }
}

impl From<serde_json::Error> for TrainErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Config(value.to_string())
    }
}

impl From<ndarray::ShapeError> for TrainErr {
    fn from(value: ndarray::ShapeError) -> Self {
        Self::Ml(MlErr::Shape(value))
    }
}

/// Boundary conversion for the binary.
impl From<TrainErr> for io::Error {
    fn from(value: TrainErr) -> Self {
        match value {
            TrainErr::Io(e) => e,
            TrainErr::MissingDataset(_) => io::Error::new(io::ErrorKind::NotFound, value),
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
