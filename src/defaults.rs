//! Default configuration constants for ctctrain.
//!
//! Shared between the typed configuration, the CLI and the data loaders so the
//! same values are used everywhere.

/// Default number of utterances per batch.
pub const BATCH_SIZE: usize = 32;

/// Number of manifest entries read when debug mode is on.
///
/// Deterministic truncation (the first N lines), not sampling, so debug runs
/// see the same batches every time.
pub const DEBUG_LIMIT: usize = 1000;

/// Seed for every random choice made on behalf of a run (batch shuffling).
pub const RANDOM_SEED: u64 = 15213;

/// Frames concatenated per output frame when augmentation is on.
pub const AUGMENT_WINDOW: usize = 3;

/// Subsampling factor applied when augmentation is on.
///
/// One record per shift in `0..AUGMENT_SUBSAMPLING` is generated.
pub const AUGMENT_SUBSAMPLING: usize = 3;

/// Label files read from every label directory.
pub const LABEL_FILES: &[&str] = &["labels.tr", "labels.cv"];

/// Partition name for training data.
pub const TRAIN_PARTITION: &str = "train";

/// Partition name for cross-validation data.
pub const CV_PARTITION: &str = "cv";

/// Prefix of the per-epoch data directories used when mixing data.
pub const MIX_DIR_PREFIX: &str = "X";

/// Directory under `train_dir` that holds model artefacts.
pub const MODEL_DIR_NAME: &str = "model";

/// Directory under the model directory used by speaker-adaptation runs.
pub const SAT_DIR_NAME: &str = "sat";

/// File name of the configuration snapshot written before training.
pub const CONFIG_SNAPSHOT_NAME: &str = "config.toml";

// Network and optimiser defaults.
pub const NLAYER: usize = 5;
pub const NHIDDEN: usize = 320;
pub const NPROJ: usize = 0;
pub const FEAT_PROJ: usize = 0;
pub const L2: f64 = 0.0;
pub const CLIP: f64 = 0.1;
pub const MODEL: &str = "deepbilstm";
pub const GRAD_OPT: &str = "grad";

// Learning-rate schedule defaults.
pub const NEPOCH: usize = 30;
pub const LR_RATE: f64 = 0.03;
pub const HALF_PERIOD: usize = 10;
pub const HALF_RATE: f64 = 0.5;
pub const HALF_AFTER: usize = 0;

/// Default number of speaker-adaptation layers.
pub const NUM_SAT_LAYERS: usize = 2;

/// Path of the manifest describing one partition: `<data_dir>/<partition>_local.scp`.
pub fn manifest_file_name(partition: &str) -> String {
    format!("{partition}_local.scp")
}

/// Path of the speaker-transform manifest for one partition.
pub fn sat_manifest_file_name(partition: &str) -> String {
    format!("{partition}_sat_local.scp")
}
