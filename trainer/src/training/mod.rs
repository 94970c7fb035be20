mod evaluate;
mod experiment;
mod trainer;

pub use evaluate::{Evaluation, argmax, evaluate};
pub use experiment::{resolve_seed, run_experiment, run_experiment_with};
pub use trainer::{EpochStats, FitOutcome, StopReason, Trainer};
