use std::{env, io};

use log::info;

use trainer::{ExperimentConfig, data::EuroSat, run_experiment};

fn main() -> io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match env::var("CONFIG") {
        Ok(path) => {
            info!("loading config from {path}");
            ExperimentConfig::from_json_file(path)?
        }
        Err(_) => ExperimentConfig::default(),
    };

    config.device.install();

    let dataset = EuroSat::open(&config.data_dir, config.image.dim())?;
    let report = run_experiment(&config, dataset)?;

    println!("{report}");
    Ok(())
}
