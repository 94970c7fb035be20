use std::time::{Instant, SystemTime, UNIX_EPOCH};

use log::{info, warn};
use machine_learning::arch::{Model, loss::CrossEntropy, sat_cnn};
use rand::{SeedableRng, rngs::StdRng};

use super::Trainer;
use crate::{
    Result, TrainErr,
    checkpoint::{CheckpointStore, SafetensorsStore},
    config::ExperimentConfig,
    data::{ChannelStats, Compose, DataLoader, Dataset, Split, Transformed},
    early_stopping::EarlyStopping,
    report::Report,
};

/// Returns the configured seed, or one derived from the clock.
pub fn resolve_seed(config: &ExperimentConfig) -> u64 {
    config.seed.unwrap_or_else(|| {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default();

        info!("no seed configured, using {seed}");
        seed
    })
}

/// Runs the whole experiment, checkpointing to `.safetensors` files.
pub fn run_experiment<D: Dataset>(config: &ExperimentConfig, dataset: D) -> Result<Report> {
    run_experiment_with(config, dataset, &mut SafetensorsStore::new())
}

/// Runs the whole experiment over `dataset`:
///
/// 1. Computes the per channel statistics and normalizes the dataset with them.
/// 2. Splits it into training and validation.
/// 3. For every iteration, trains a fresh model with early stopping, reloads its best
///    checkpoint and scores it on the validation split.
///
/// # Arguments
/// * `config` - The experiment's configuration.
/// * `dataset` - The raw dataset.
/// * `store` - Where the best parameters of each iteration are checkpointed.
///
/// # Returns
/// The report of every iteration.
pub fn run_experiment_with<D, S>(
    config: &ExperimentConfig,
    dataset: D,
    store: &mut S,
) -> Result<Report>
where
    D: Dataset,
    S: CheckpointStore,
{
    let start = Instant::now();
    config.validate()?;

    let (c, h, w) = config.image.dim();
    if dataset.shape() != (c, h, w) {
        let (dc, dh, dw) = dataset.shape();
        return Err(TrainErr::ShapeMismatch {
            what: "dataset images".into(),
            got: vec![dc, dh, dw],
            expected: vec![c, h, w],
        });
    }

    let seed = resolve_seed(config);

    let mut full_loader = DataLoader::sequential(&dataset, config.batch_size)?;
    let stats = ChannelStats::compute(&mut full_loader)?;
    info!("channel mean {:?}, std {:?}", stats.mean, stats.std);

    let mut transform = Compose::default();
    transform.push(stats.normalize()?);
    for index in &config.indices {
        transform.push(index.into_transform());
    }
    let dataset = Transformed::new(&dataset, transform);

    let split = Split::generate(dataset.len(), config.validation_split, config.shuffle, seed)?;
    info!("training size: {}", split.train.len());
    info!("val size: {}", split.validation.len());

    if split.train.is_empty() {
        return Err(TrainErr::EmptySplit("training"));
    }
    if split.validation.is_empty() {
        return Err(TrainErr::EmptySplit("validation"));
    }

    let mut train = DataLoader::new(&dataset, split.train, config.batch_size)?;
    let mut validation = DataLoader::new(&dataset, split.validation, config.batch_size)?;

    let mut report = Report::default();

    for iteration in 0..config.iterations {
        let model = sat_cnn(config.in_channels(), h, w, config.num_classes)?;
        info!("iteration {iteration}: model with {} parameters", model.size());

        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(iteration as u64));
        let params = model.init_params(&mut rng, config.init)?;
        let optimizer = config.optimizer.build(model.size(), config.learning_rate);
        let mut trainer = Trainer::new(model, params, optimizer, CrossEntropy, config.num_classes)?;

        let mut monitor =
            EarlyStopping::new(&config.early_stopping, &config.checkpoint_path, &mut *store);
        let outcome = trainer.fit(
            &mut train,
            &mut validation,
            &mut monitor,
            config.epochs,
            config.resample_each_epoch.then_some(&mut rng),
        )?;

        let best_epoch = monitor.best_epoch();
        drop(monitor);

        match best_epoch {
            Some(best_epoch) => {
                let checkpoint = store.load(&config.checkpoint_path)?;
                trainer.set_params(checkpoint.into_params(&trainer.layout())?)?;
                info!("reloaded the best checkpoint, from epoch {}", best_epoch + 1);
            }
            None => warn!("early stopping is disabled, scoring the last parameters"),
        }

        let accuracy = trainer.evaluate(&mut validation)?.accuracy();
        info!("iteration {iteration}: validation accuracy {accuracy} %");

        report.record(accuracy, outcome.train_time, outcome.epochs_run);
    }

    report.end_to_end = start.elapsed();
    Ok(report)
}
