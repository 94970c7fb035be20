use std::time::{Duration, Instant};

use log::{debug, info};
use machine_learning::{
    MlErr,
    arch::{
        Model, TensorSpec,
        loss::{LossFn, one_hot},
    },
    optimization::Optimizer,
};
use rand::rngs::StdRng;

use super::{Evaluation, evaluate};
use crate::{
    Result, TrainErr,
    checkpoint::CheckpointStore,
    data::{Batch, DataLoader, Dataset},
    early_stopping::EarlyStopping,
};

/// Statistics of one pass over the training split.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EpochStats {
    /// The loss of the last batch.
    pub last_loss: f32,
    pub mean_loss: f32,
    pub batches: usize,
    pub samples: usize,
    /// Time spent on the training batches only.
    pub elapsed: Duration,
}

/// Why `fit` returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The monitor ran out of patience.
    EarlyStopped,
    /// Every configured epoch ran.
    Exhausted,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FitOutcome {
    pub epochs_run: usize,
    pub stop: StopReason,
    /// Summed training time of every epoch, validation excluded.
    pub train_time: Duration,
    /// The validation accuracy of every epoch.
    pub accuracies: Vec<f64>,
}

/// Owns a model together with its parameters, their gradient, an optimizer and a loss.
pub struct Trainer<M, O, L>
where
    M: Model,
    O: Optimizer,
    L: LossFn,
{
    model: M,
    params: Vec<f32>,
    grad: Vec<f32>,
    optimizer: O,
    loss_fn: L,
    num_classes: usize,
}

impl<M, O, L> Trainer<M, O, L>
where
    M: Model,
    O: Optimizer,
    L: LossFn,
{
    /// Creates a new `Trainer`.
    ///
    /// # Arguments
    /// * `model` - The model that will be trained.
    /// * `params` - Its initial parameters.
    /// * `optimizer` - The optimizer, sized for the model's parameters.
    /// * `loss_fn` - The loss function minimized during training.
    /// * `num_classes` - The amount of classes the model scores.
    ///
    /// # Returns
    /// An error if `params` doesn't fit the model.
    pub fn new(
        model: M,
        params: Vec<f32>,
        optimizer: O,
        loss_fn: L,
        num_classes: usize,
    ) -> Result<Self> {
        if params.len() != model.size() {
            return Err(MlErr::SizeMismatch {
                what: "initial parameters",
                got: params.len(),
                expected: model.size(),
            }
            .into());
        }

        Ok(Self {
            grad: vec![0.; model.size()],
            model,
            params,
            optimizer,
            loss_fn,
            num_classes,
        })
    }

    pub fn params(&self) -> &[f32] {
        &self.params
    }

    /// Replaces the parameters, as when reloading a checkpoint.
    pub fn set_params(&mut self, params: Vec<f32>) -> Result<()> {
        if params.len() != self.params.len() {
            return Err(MlErr::SizeMismatch {
                what: "parameters",
                got: params.len(),
                expected: self.params.len(),
            }
            .into());
        }

        self.params = params;
        Ok(())
    }

    pub fn layout(&self) -> Vec<TensorSpec> {
        self.model.layout()
    }

    /// Runs a training step on `batch`: forward, loss, zeroed gradient, backward and update.
    ///
    /// # Returns
    /// The batch loss.
    pub fn step(&mut self, batch: &Batch) -> Result<f32> {
        let y = one_hot(&batch.labels, self.num_classes)?;
        let y_pred = self.model.forward(&self.params, batch.images.view())?;

        let loss = self.loss_fn.loss(y_pred.view(), y.view());
        let d = self.loss_fn.loss_prime(y_pred.view(), y.view());

        self.grad.fill(0.);
        self.model.backward(&self.params, &mut self.grad, d)?;
        self.optimizer.update_params(&self.grad, &mut self.params)?;

        Ok(loss)
    }

    /// Runs one pass over every batch of `loader`, from the start.
    ///
    /// # Returns
    /// The epoch's statistics, or `EmptySplit` if the loader has no samples.
    pub fn train_epoch<D: Dataset + ?Sized>(
        &mut self,
        loader: &mut DataLoader<'_, D>,
    ) -> Result<EpochStats> {
        loader.reset();

        let start = Instant::now();
        let mut last_loss = 0.;
        let mut loss_sum = 0.;
        let mut batches = 0;
        let mut samples = 0;

        while let Some(batch) = loader.next_batch()? {
            last_loss = self.step(&batch)?;
            debug!(batch = batches, loss = last_loss; "trained batch");

            loss_sum += last_loss;
            batches += 1;
            samples += batch.len();
        }

        if batches == 0 {
            return Err(TrainErr::EmptySplit("training"));
        }

        Ok(EpochStats {
            last_loss,
            mean_loss: loss_sum / batches as f32,
            batches,
            samples,
            elapsed: start.elapsed(),
        })
    }

    /// Scores the current parameters over `loader`.
    pub fn evaluate<D: Dataset + ?Sized>(
        &mut self,
        loader: &mut DataLoader<'_, D>,
    ) -> Result<Evaluation> {
        evaluate(
            &mut self.model,
            &self.params,
            loader,
            &self.loss_fn,
            self.num_classes,
        )
    }

    /// Trains for at most `epochs` epochs, validating after each one and feeding the accuracy
    /// to `monitor` until it signals a stop.
    ///
    /// # Arguments
    /// * `train` - The training split.
    /// * `validation` - The validation split.
    /// * `monitor` - The early stopping monitor, it checkpoints the best parameters.
    /// * `epochs` - The maximum amount of epochs.
    /// * `resample` - When present, reshuffles the training split before every epoch.
    pub fn fit<D, S>(
        &mut self,
        train: &mut DataLoader<'_, D>,
        validation: &mut DataLoader<'_, D>,
        monitor: &mut EarlyStopping<S>,
        epochs: usize,
        mut resample: Option<&mut StdRng>,
    ) -> Result<FitOutcome>
    where
        D: Dataset + ?Sized,
        S: CheckpointStore,
    {
        let layout = self.layout();
        let mut train_time = Duration::ZERO;
        let mut accuracies = Vec::with_capacity(epochs);

        for epoch in 0..epochs {
            if let Some(rng) = resample.as_deref_mut() {
                train.reshuffle(rng);
            }

            let stats = self.train_epoch(train)?;
            train_time += stats.elapsed;
            info!(
                "Epoch [{}/{}], Training Loss: {:.4}",
                epoch + 1,
                epochs,
                stats.last_loss
            );

            let accuracy = self.evaluate(validation)?.accuracy();
            accuracies.push(accuracy);
            info!("Validation Accuracy: {accuracy} %");

            if monitor.step(accuracy, epoch, &self.params, &layout)? {
                info!("early stopped! With validation accuracy: {accuracy} %");
                return Ok(FitOutcome {
                    epochs_run: epoch + 1,
                    stop: StopReason::EarlyStopped,
                    train_time,
                    accuracies,
                });
            }
        }

        Ok(FitOutcome {
            epochs_run: epochs,
            stop: StopReason::Exhausted,
            train_time,
            accuracies,
        })
    }
}
