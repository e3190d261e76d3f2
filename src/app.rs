//! Training run entry points.
//!
//! Orchestrates the complete run:
//! configure → load train/cv → check → snapshot → train

use crate::cli::TrainArgs;
use crate::config::{Config, merge};
use crate::consistency::{SatSets, check_training_sets};
use crate::defaults;
use crate::engine::{TrainingData, TrainingEngine};
use crate::error::Result;
use crate::partition::{PartitionSummary, load_mixed_partitions, load_partition};
use crate::sat::{SatStage, SpeakerTransforms};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Load the base configuration: `--config`, else the default path, else defaults.
///
/// Environment overrides are applied on top.
pub fn load_base_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = match custom_path {
        Some(path) => Config::load(path)?,
        None => match Config::default_path() {
            Some(path) => Config::load_or_default(&path)?,
            None => Config::default(),
        },
    };
    Ok(config.with_env_overrides())
}

/// Build the configuration for a training run.
///
/// With `--import-config` the previous run's snapshot is merged with the few
/// flags that may change between runs. Otherwise a fresh configuration is
/// assembled from the base configuration and all flags, always starting
/// without speaker adaptation.
pub fn resolve_train_config(args: &TrainArgs, custom_path: Option<&Path>) -> Result<Config> {
    let config = match &args.import_config {
        Some(snapshot) => {
            info!(snapshot = %snapshot.display(), "Importing configuration");
            let old = Config::load(snapshot)?;
            let config = merge(&old, &args.overrides());
            info!(from = %old.sat.stage, to = %config.sat.stage, "Speaker adaptation stage");
            config
        }
        None => {
            let mut config = load_base_config(custom_path)?;
            args.apply(&mut config);
            if args.apply_sat {
                warn!("--apply-sat only takes effect together with --import-config");
            }
            config.sat.stage = SatStage::Unadapted;
            config.sat.feat_dim = None;
            config
        }
    };

    config.validate()?;
    Ok(config)
}

/// Load and check everything the engine needs, recording derived facts in `config`.
pub fn prepare_data(config: &mut Config) -> Result<TrainingData> {
    let options = config.batching_options();
    let data_dir = config.data.data_dir.clone();

    banner("reading training set");
    let train = if config.data.mix {
        info!(nepoch = config.runtime.nepoch, "Loading mixed data, one directory per epoch");
        load_mixed_partitions(
            &data_dir,
            defaults::TRAIN_PARTITION,
            config.runtime.nepoch,
            &options,
        )?
    } else {
        vec![load_partition(&data_dir, defaults::TRAIN_PARTITION, &options)?]
    };
    for part in &train {
        info!(
            batches = part.batches.len(),
            utterances = part.num_utterances(),
            "Training data loaded"
        );
    }

    banner("reading cross-validation set");
    let cv = load_partition(&data_dir, defaults::CV_PARTITION, &options)?;
    info!(
        batches = cv.batches.len(),
        utterances = cv.num_utterances(),
        "Cross-validation data loaded"
    );

    config.run.input_feats_dim = Some(cv.feature_dim);
    config.run.alphabet_sizes = cv.alphabet_sizes.clone();

    let sat = if config.sat.stage.is_adapting() {
        banner("reading speaker adaptation set");
        let sets = SatSets {
            train: SpeakerTransforms::load(&data_dir, defaults::TRAIN_PARTITION)?,
            cv: SpeakerTransforms::load(&data_dir, defaults::CV_PARTITION)?,
        };
        config.sat.feat_dim = Some(sets.train.feature_dim());
        info!(
            dim = sets.train.feature_dim(),
            stage = %config.sat.stage,
            "Adaptation data prepared"
        );
        Some(sets)
    } else {
        None
    };

    check_training_sets(&train, &cv, sat.as_ref())?;
    config.run.model_dir = Some(config.model_dir());

    Ok(TrainingData { cv, train, sat })
}

/// Run a full training session and return the configuration that was snapshotted.
pub fn run_train<E: TrainingEngine + ?Sized>(mut config: Config, engine: &mut E) -> Result<Config> {
    let data = prepare_data(&mut config)?;

    let model_dir = config.model_dir();
    fs::create_dir_all(&model_dir)?;
    let snapshot = model_dir.join(defaults::CONFIG_SNAPSHOT_NAME);
    config.save(&snapshot)?;

    banner("done with data preparation");
    info!(snapshot = %snapshot.display(), engine = engine.name(), "Beginning training");
    let rendered = toml::to_string_pretty(&config)?;
    debug!("Configuration:\n{rendered}");

    engine.train(data, &config)?;
    Ok(config)
}

/// Load a single partition the way a training run would.
pub fn inspect_partition(config: &Config, partition: &str) -> Result<PartitionSummary> {
    config.validate()?;
    let data = load_partition(&config.data.data_dir, partition, &config.batching_options())?;
    Ok(data.summary())
}

fn banner(title: &str) {
    info!("{}", "-".repeat(60));
    info!("{title}");
    info!("{}", "-".repeat(60));
}
