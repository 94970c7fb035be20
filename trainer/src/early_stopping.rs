use std::path::{Path, PathBuf};

use log::{debug, info};
use machine_learning::arch::TensorSpec;
use serde::{Deserialize, Serialize};

use crate::{
    Result,
    checkpoint::{Checkpoint, CheckpointStore},
    config::EarlyStoppingConfig,
};

/// Whether the monitored metric should go down or up.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Min,
    #[default]
    Max,
}

/// Tracks a metric across epochs, checkpointing the parameters every time it improves and
/// signaling a stop once it stalled for `patience` epochs.
///
/// A `patience` of 0 never stops nor saves.
pub struct EarlyStopping<S> {
    patience: usize,
    mode: Mode,
    min_delta: f64,
    percentage: bool,
    path: PathBuf,
    store: S,
    best: Option<f64>,
    best_epoch: Option<usize>,
    num_bad_epochs: usize,
}

impl<S: CheckpointStore> EarlyStopping<S> {
    /// Creates a new `EarlyStopping` monitor.
    ///
    /// # Arguments
    /// * `config` - The patience, mode and improvement threshold.
    /// * `path` - Where the best parameters are checkpointed.
    /// * `store` - The backend that persists the checkpoints.
    pub fn new<P: Into<PathBuf>>(config: &EarlyStoppingConfig, path: P, store: S) -> Self {
        Self {
            patience: config.patience,
            mode: config.mode,
            min_delta: config.min_delta,
            percentage: config.percentage,
            path: path.into(),
            store,
            best: None,
            best_epoch: None,
            num_bad_epochs: 0,
        }
    }

    fn is_better(&self, metric: f64, best: f64) -> bool {
        let delta = if self.percentage {
            best.abs() * self.min_delta / 100.
        } else {
            self.min_delta
        };

        match self.mode {
            Mode::Min => metric < best - delta,
            Mode::Max => metric > best + delta,
        }
    }

    /// Feeds the metric of an epoch to the monitor.
    ///
    /// # Arguments
    /// * `metric` - The monitored metric.
    /// * `epoch` - The epoch the metric belongs to, stored with the checkpoint.
    /// * `params` - The parameters that achieved `metric`.
    /// * `layout` - The tensors `params` is made of.
    ///
    /// # Returns
    /// Whether training should stop, or an error if the checkpoint can't be saved.
    pub fn step(
        &mut self,
        metric: f64,
        epoch: usize,
        params: &[f32],
        layout: &[TensorSpec],
    ) -> Result<bool> {
        if self.patience == 0 {
            return Ok(false);
        }

        if metric.is_nan() {
            info!("monitored metric is NaN at epoch {epoch}, stopping");
            return Ok(true);
        }

        let improved = self.best.is_none_or(|best| self.is_better(metric, best));

        if improved {
            self.best = Some(metric);
            self.best_epoch = Some(epoch);
            self.num_bad_epochs = 0;

            let checkpoint = Checkpoint::from_params(params, layout)?
                .with_metadata("epoch", epoch)
                .with_metadata("metric", metric);
            self.store.save(&checkpoint, &self.path)?;
            debug!(epoch = epoch, metric = metric; "checkpointed new best");
        } else {
            self.num_bad_epochs += 1;
            debug!(
                epoch = epoch,
                metric = metric,
                bad_epochs = self.num_bad_epochs;
                "no improvement"
            );
        }

        Ok(self.num_bad_epochs >= self.patience)
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    pub fn num_bad_epochs(&self) -> usize {
        self.num_bad_epochs
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::MemoryStore;

    fn layout() -> Vec<TensorSpec> {
        vec![TensorSpec::new("w", vec![2])]
    }

    fn monitor(
        patience: usize,
        mode: Mode,
        min_delta: f64,
        percentage: bool,
    ) -> EarlyStopping<MemoryStore> {
        let config = EarlyStoppingConfig {
            patience,
            mode,
            min_delta,
            percentage,
        };

        EarlyStopping::new(&config, "best.safetensors", MemoryStore::new())
    }

    fn feed(monitor: &mut EarlyStopping<MemoryStore>, metrics: &[f64]) -> Vec<bool> {
        metrics
            .iter()
            .enumerate()
            .map(|(epoch, &metric)| {
                monitor
                    .step(metric, epoch, &[epoch as f32, metric as f32], &layout())
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn stops_after_patience_stalled_epochs() {
        let mut monitor = monitor(3, Mode::Max, 0., true);
        let stops = feed(&mut monitor, &[50., 52., 52., 52., 52.]);

        assert_eq!(stops, [false, false, false, false, true]);
        assert_eq!(monitor.best(), Some(52.));
        assert_eq!(monitor.best_epoch(), Some(1));
    }

    #[test]
    fn saves_only_on_improvement() {
        let mut monitor = monitor(10, Mode::Max, 0., true);
        feed(&mut monitor, &[10., 12., 11., 12., 15., 14., 15.5]);

        assert_eq!(monitor.store().saves(), 4);

        let best = monitor.store().get(Path::new("best.safetensors")).unwrap();
        assert_eq!(best.epoch(), Some(6));
        assert_eq!(best.metric(), Some(15.5));
        assert_eq!(best.tensors[0].1, [6., 15.5]);
    }

    #[test]
    fn percentage_threshold_is_relative_to_the_best() {
        // 5% of 100 is 5, so 104 is not an improvement but 106 is.
        let mut monitor = monitor(2, Mode::Max, 5., true);
        let stops = feed(&mut monitor, &[100., 104., 106., 110.]);

        assert_eq!(stops, [false, false, false, false]);
        assert_eq!(monitor.best(), Some(106.));
        assert_eq!(monitor.num_bad_epochs(), 1);
    }

    #[test]
    fn min_mode_with_absolute_delta() {
        let mut monitor = monitor(2, Mode::Min, 0.5, false);
        let stops = feed(&mut monitor, &[3., 2.4, 2.0, 1.95]);

        assert_eq!(stops, [false, false, false, true]);
        assert_eq!(monitor.best(), Some(2.4));
    }

    #[test]
    fn nan_stops_immediately() {
        let mut monitor = monitor(5, Mode::Max, 0., true);
        assert_eq!(feed(&mut monitor, &[1., f64::NAN]), [false, true]);
    }

    #[test]
    fn zero_patience_never_stops() {
        let mut monitor = monitor(0, Mode::Max, 0., true);
        assert!(feed(&mut monitor, &[1., 1., 1., 1.]).iter().all(|stop| !stop));
        assert_eq!(monitor.store().saves(), 0);
    }
}
