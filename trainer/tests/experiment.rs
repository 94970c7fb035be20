use std::{
    env, fs,
    fs::File,
    io,
    path::{Path, PathBuf},
};

use ndarray::Array3;
use tiff::encoder::{TiffEncoder, colortype};
use trainer::{
    ExperimentConfig, TrainErr,
    checkpoint::{CheckpointStore, MemoryStore, SafetensorsStore},
    config::{EarlyStoppingConfig, ImageShape},
    data::{EuroSat, InMemoryDataset, Sample, SpectralIndex},
    early_stopping::Mode,
    run_experiment, run_experiment_with,
};

fn scratch(name: &str) -> PathBuf {
    let dir = env::temp_dir().join(format!("trainer-it-{name}-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// Writes `per_class` 8x8 RGB tiles per class, each class lighting a different band.
fn write_tiles(root: &Path, classes: &[&str], per_class: usize) {
    for (label, class) in classes.iter().enumerate() {
        let dir = root.join(class);
        fs::create_dir_all(&dir).unwrap();

        for i in 0..per_class {
            let data: Vec<u16> = (0..8 * 8 * 3)
                .map(|k| {
                    let band = k % 3;
                    let noise = ((i * 13 + k * 7) % 17) as u16;
                    if band == label { 1000 + noise } else { 100 + noise }
                })
                .collect();

            let file = File::create(dir.join(format!("{class}_{i}.tif"))).unwrap();
            TiffEncoder::new(file)
                .unwrap()
                .write_image::<colortype::RGB16>(8, 8, &data)
                .unwrap();
        }
    }
}

fn small_config(root: &Path) -> ExperimentConfig {
    ExperimentConfig {
        data_dir: root.join("eurosat"),
        checkpoint_path: root.join("checkpoint").join("model.best.safetensors"),
        epochs: 3,
        learning_rate: 0.001,
        batch_size: 4,
        seed: Some(42),
        num_classes: 2,
        image: ImageShape {
            channels: 3,
            height: 8,
            width: 8,
        },
        early_stopping: EarlyStoppingConfig {
            patience: 2,
            mode: Mode::Max,
            min_delta: 0.,
            percentage: true,
        },
        ..Default::default()
    }
}

#[test]
fn runs_on_tiff_tiles_and_writes_a_checkpoint() {
    let root = scratch("tiff");
    let config = ExperimentConfig {
        indices: vec![SpectralIndex::NormalizedDifference { a: 0, b: 1 }],
        ..small_config(&root)
    };
    write_tiles(&config.data_dir, &["Forest", "SeaLake"], 10);

    let dataset = EuroSat::open(&config.data_dir, config.image.dim()).unwrap();
    let report = run_experiment(&config, dataset).unwrap();

    assert_eq!(report.accuracies.len(), 1);
    assert!((0. ..=100.).contains(&report.accuracies[0]));
    assert!(report.epochs_run >= 1 && report.epochs_run <= 3);
    assert!(report.end_to_end >= report.total_train_time);

    let checkpoint = SafetensorsStore::new()
        .load(&config.checkpoint_path)
        .unwrap();
    assert!(checkpoint.epoch().unwrap() < 3);
    let (first_conv, _) = checkpoint
        .tensors
        .iter()
        .find(|(spec, _)| spec.name == "0.conv2d.weight")
        .unwrap();
    assert_eq!(first_conv.shape, [16, 4, 3, 3]);

    fs::remove_dir_all(root).unwrap();
}

fn in_memory(n: usize) -> InMemoryDataset {
    let samples = (0..n)
        .map(|i| {
            let label = i % 2;
            Sample {
                image: Array3::from_shape_fn((3, 8, 8), |(c, h, w)| {
                    let lit = if c == label { 5. } else { 0. };
                    lit + ((i + h * 3 + w) % 4) as f32
                }),
                label,
            }
        })
        .collect();

    InMemoryDataset::new((3, 8, 8), samples).unwrap()
}

#[test]
fn every_iteration_checkpoints_and_reports() {
    let root = scratch("memory");
    let config = ExperimentConfig {
        iterations: 2,
        ..small_config(&root)
    };
    let mut store = MemoryStore::new();

    let report = run_experiment_with(&config, in_memory(30), &mut store).unwrap();

    assert_eq!(report.accuracies.len(), 2);
    assert!(report.accuracies.iter().all(|a| (0. ..=100.).contains(a)));
    assert!(store.saves() >= 2);
    assert!(store.get(&config.checkpoint_path).is_some());
    assert!(!config.checkpoint_path.exists());
    assert!(report.variation() >= 0.);

    fs::remove_dir_all(root).unwrap();
}

#[test]
fn early_stopped_run_reports_the_best_checkpoint() {
    let root = scratch("early-stop");
    let config = ExperimentConfig {
        epochs: 8,
        // nothing after the first epoch can beat it by 1000 points
        early_stopping: EarlyStoppingConfig {
            patience: 3,
            mode: Mode::Max,
            min_delta: 1000.,
            percentage: false,
        },
        ..small_config(&root)
    };
    let mut store = MemoryStore::new();

    let report = run_experiment_with(&config, in_memory(30), &mut store).unwrap();

    assert_eq!(report.epochs_run, 4);
    assert!(report.epochs_run < config.epochs);
    assert_eq!(store.saves(), 1);

    let best = store.get(&config.checkpoint_path).unwrap();
    assert_eq!(best.epoch(), Some(0));
    assert_eq!(best.metric(), Some(report.accuracies[0]));

    fs::remove_dir_all(root).unwrap();
}

#[test]
fn too_small_dataset_has_an_empty_split() {
    let root = scratch("empty-split");
    let config = small_config(&root);

    // floor(0.2 * 4) = 0 validation samples.
    let res = run_experiment_with(&config, in_memory(4), &mut MemoryStore::new());
    assert!(matches!(res, Err(TrainErr::EmptySplit("validation"))));

    fs::remove_dir_all(root).unwrap();
}

#[test]
fn mismatched_image_shape_fails() {
    let root = scratch("shape");
    let config = ExperimentConfig {
        image: ImageShape {
            channels: 13,
            height: 8,
            width: 8,
        },
        ..small_config(&root)
    };

    let res = run_experiment_with(&config, in_memory(10), &mut MemoryStore::new());
    assert!(matches!(res, Err(TrainErr::ShapeMismatch { .. })));

    fs::remove_dir_all(root).unwrap();
}

#[test]
fn missing_dataset_is_reported() {
    let root = scratch("missing");
    let err = EuroSat::open(root.join("eurosat"), (13, 64, 64)).unwrap_err();
    assert!(matches!(err, TrainErr::MissingDataset(_)));

    let err: io::Error = err.into();
    assert_eq!(err.kind(), io::ErrorKind::NotFound);

    fs::remove_dir_all(root).unwrap();
}
