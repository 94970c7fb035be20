use std::{fs, path::Path, path::PathBuf};

use log::{info, warn};
use machine_learning::{
    initialization::Init,
    optimization::{Adam, GradientDescent, GradientDescentWithMomentum, Optimizer},
};
use serde::{Deserialize, Serialize};

use crate::{Result, TrainErr, data::SpectralIndex, early_stopping::Mode};

/// The `(channels, height, width)` of the dataset's images.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageShape {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl ImageShape {
    pub fn dim(&self) -> (usize, usize, usize) {
        (self.channels, self.height, self.width)
    }
}

impl Default for ImageShape {
    fn default() -> Self {
        Self {
            channels: 13,
            height: 64,
            width: 64,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EarlyStoppingConfig {
    pub patience: usize,
    pub mode: Mode,
    pub min_delta: f64,
    pub percentage: bool,
}

impl Default for EarlyStoppingConfig {
    fn default() -> Self {
        Self {
            patience: 30,
            mode: Mode::Max,
            min_delta: 0.,
            percentage: true,
        }
    }
}

/// The optimizer used for training, its learning rate comes from the experiment.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OptimizerConfig {
    Adam { beta1: f32, beta2: f32, epsilon: f32 },
    GradientDescent,
    GradientDescentWithMomentum { momentum: f32 },
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig::Adam {
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }
}

impl OptimizerConfig {
    /// Builds a fresh optimizer for `len` parameters.
    pub fn build(&self, len: usize, learning_rate: f32) -> Box<dyn Optimizer> {
        match *self {
            OptimizerConfig::Adam {
                beta1,
                beta2,
                epsilon,
            } => Box::new(Adam::new(len, learning_rate, beta1, beta2, epsilon)),
            OptimizerConfig::GradientDescent => Box::new(GradientDescent::new(learning_rate)),
            OptimizerConfig::GradientDescentWithMomentum { momentum } => Box::new(
                GradientDescentWithMomentum::new(len, learning_rate, momentum),
            ),
        }
    }
}

/// Where the numeric kernels run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Device {
    /// A single thread.
    #[default]
    Cpu,
    /// A rayon pool of `threads` threads, 0 picks one per core.
    Parallel { threads: usize },
}

impl Device {
    /// Sizes the global rayon pool for this device and reports the choice.
    ///
    /// The global pool can only be built once per process, later calls keep the first pool.
    pub fn install(&self) {
        let threads = match *self {
            Device::Cpu => 1,
            Device::Parallel { threads } => threads,
        };

        match rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
        {
            Ok(()) => info!(
                "running on {self:?} with {} thread(s)",
                rayon::current_num_threads()
            ),
            Err(e) => warn!(
                "could not size the thread pool for {self:?} ({e}), using {} thread(s)",
                rayon::current_num_threads()
            ),
        }
    }
}

/// Everything an experiment run needs, immutable once loaded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExperimentConfig {
    pub data_dir: PathBuf,
    pub checkpoint_path: PathBuf,
    pub epochs: usize,
    pub learning_rate: f32,
    pub batch_size: usize,
    pub validation_split: f64,
    pub shuffle: bool,
    /// Seed of the split and the initial parameters, derived from the clock when absent.
    pub seed: Option<u64>,
    pub iterations: usize,
    pub num_classes: usize,
    pub image: ImageShape,
    pub early_stopping: EarlyStoppingConfig,
    pub optimizer: OptimizerConfig,
    pub init: Init,
    pub device: Device,
    /// Spectral index channels appended after normalization.
    pub indices: Vec<SpectralIndex>,
    /// Reshuffles the training indices at the start of every epoch.
    pub resample_each_epoch: bool,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/eurosat"),
            checkpoint_path: PathBuf::from("reports/checkpoint/satcnn_sat6/model.best.safetensors"),
            epochs: 50,
            learning_rate: 0.0002,
            batch_size: 16,
            validation_split: 0.2,
            shuffle: true,
            seed: None,
            iterations: 1,
            num_classes: 10,
            image: ImageShape::default(),
            early_stopping: EarlyStoppingConfig::default(),
            optimizer: OptimizerConfig::default(),
            init: Init::default(),
            device: Device::default(),
            indices: Vec::new(),
            resample_each_epoch: false,
        }
    }
}

impl ExperimentConfig {
    /// Reads and validates a JSON configuration, missing fields take their default value.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            TrainErr::Config(format!("cannot read '{}': {e}", path.display()))
        })?;

        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Returns the amount of channels the model sees, spectral indices included.
    pub fn in_channels(&self) -> usize {
        self.image.channels + self.indices.len()
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(TrainErr::Config(msg));

        if !(self.validation_split > 0. && self.validation_split < 1.) {
            return invalid(format!(
                "validation_split must be within (0, 1), got {}",
                self.validation_split
            ));
        }

        for (name, value) in [
            ("epochs", self.epochs),
            ("batch_size", self.batch_size),
            ("iterations", self.iterations),
            ("num_classes", self.num_classes),
            ("image.channels", self.image.channels),
        ] {
            if value == 0 {
                return invalid(format!("{name} must be greater than 0"));
            }
        }

        if !(self.learning_rate.is_finite() && self.learning_rate > 0.) {
            return invalid(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            ));
        }

        let ImageShape { height, width, .. } = self.image;
        if height == 0 || width == 0 || height % 4 != 0 || width % 4 != 0 {
            return invalid(format!(
                "image size {height}x{width} must be a non zero multiple of 4"
            ));
        }

        let min_delta = self.early_stopping.min_delta;
        if !(min_delta.is_finite() && min_delta >= 0.) {
            return invalid(format!("min_delta must be non negative, got {min_delta}"));
        }

        for index in &self.indices {
            if let Some(band) = index.bands().into_iter().find(|&b| b >= self.image.channels) {
                return invalid(format!(
                    "spectral index {index:?} reads band {band} of a {} band image",
                    self.image.channels
                ));
            }
        }

        Ok(())
    }
}
