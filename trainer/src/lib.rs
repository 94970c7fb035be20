pub mod checkpoint;
pub mod config;
pub mod data;
pub mod early_stopping;
pub mod error;
pub mod report;
pub mod training;

pub use config::ExperimentConfig;
pub use error::{Result, TrainErr};
pub use report::Report;
pub use training::{run_experiment, run_experiment_with};
