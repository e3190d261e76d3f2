//! Typed experiment configuration.
//!
//! A run's configuration is built from defaults, an optional TOML file,
//! environment variables and CLI flags, or imported from a previous run's
//! snapshot and merged with a small set of overrides. It is validated once and
//! written next to the model before training starts.

use crate::batch::BatchPolicy;
use crate::defaults;
use crate::error::{Result, TrainError};
use crate::features::Augmentation;
use crate::labels::DuplicatePolicy;
use crate::partition::BatchingOptions;
use crate::sat::SatStage;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub random_seed: u64,
    pub data: DataConfig,
    pub augment: AugmentConfig,
    pub model: ModelConfig,
    pub runtime: RuntimeConfig,
    pub sat: SatConfig,
    /// Facts discovered while loading data; filled in before the snapshot is written.
    pub run: RunInfo,
}

/// Data locations and batching
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DataConfig {
    pub data_dir: PathBuf,
    pub train_dir: PathBuf,
    pub batch_size: usize,
    pub shuffle: bool,
    /// Read only the first `debug_limit` manifest entries.
    pub debug: bool,
    pub debug_limit: usize,
    pub extra_label_dirs: Vec<PathBuf>,
    /// Keep the last entry instead of failing when a label file repeats an utterance.
    pub allow_duplicate_labels: bool,
    /// Load training data from a separate `X<epoch>` directory per epoch.
    pub mix: bool,
    pub continue_ckpt: Option<String>,
    pub store_model: bool,
}

/// On-the-fly frame stacking and subsampling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AugmentConfig {
    pub enabled: bool,
    pub window: usize,
    pub subsampling: usize,
    /// Randomly roll frames inside a batch (applied by the engine).
    pub roll: bool,
}

/// Recurrent kernel implementation used by the engine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum LstmType {
    #[default]
    Cudnn,
    Fuse,
    Native,
}

impl LstmType {
    /// cuDNN kernels cannot run batches with a ragged time dimension.
    pub fn requires_equal_length(self) -> bool {
        matches!(self, LstmType::Cudnn)
    }

    pub fn batch_policy(self) -> BatchPolicy {
        if self.requires_equal_length() {
            BatchPolicy::EqualLength
        } else {
            BatchPolicy::Uniform
        }
    }
}

/// Network architecture
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub model: String,
    pub lstm_type: LstmType,
    pub nlayer: usize,
    pub nhidden: usize,
    pub nproj: usize,
    pub feat_proj: usize,
    pub l2: f64,
    pub clip: f64,
    pub batch_norm: bool,
    pub grad_opt: String,
}

/// Epochs and learning-rate schedule
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    pub nepoch: usize,
    pub lr_rate: f64,
    pub half_period: usize,
    pub half_rate: f64,
    pub half_after: usize,
}

/// Speaker adaptation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SatConfig {
    pub stage: SatStage,
    pub num_sat_layers: usize,
    pub feat_dim: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct RunInfo {
    pub input_feats_dim: Option<usize>,
    pub alphabet_sizes: Vec<usize>,
    pub model_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            random_seed: defaults::RANDOM_SEED,
            data: DataConfig::default(),
            augment: AugmentConfig::default(),
            model: ModelConfig::default(),
            runtime: RuntimeConfig::default(),
            sat: SatConfig::default(),
            run: RunInfo::default(),
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::new(),
            train_dir: PathBuf::new(),
            batch_size: defaults::BATCH_SIZE,
            shuffle: true,
            debug: false,
            debug_limit: defaults::DEBUG_LIMIT,
            extra_label_dirs: Vec::new(),
            allow_duplicate_labels: false,
            mix: false,
            continue_ckpt: None,
            store_model: false,
        }
    }
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            window: defaults::AUGMENT_WINDOW,
            subsampling: defaults::AUGMENT_SUBSAMPLING,
            roll: false,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: defaults::MODEL.to_string(),
            lstm_type: LstmType::default(),
            nlayer: defaults::NLAYER,
            nhidden: defaults::NHIDDEN,
            nproj: defaults::NPROJ,
            feat_proj: defaults::FEAT_PROJ,
            l2: defaults::L2,
            clip: defaults::CLIP,
            batch_norm: false,
            grad_opt: defaults::GRAD_OPT.to_string(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            nepoch: defaults::NEPOCH,
            lr_rate: defaults::LR_RATE,
            half_period: defaults::HALF_PERIOD,
            half_rate: defaults::HALF_RATE,
            half_after: defaults::HALF_AFTER,
        }
    }
}

impl Default for SatConfig {
    fn default() -> Self {
        Self {
            stage: SatStage::Unadapted,
            num_sat_layers: defaults::NUM_SAT_LAYERS,
            feat_dim: None,
        }
    }
}

/// Values a user may change when continuing from an imported snapshot.
///
/// Everything else about the imported run (architecture, batching) is kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub data_dir: Option<PathBuf>,
    pub train_dir: Option<PathBuf>,
    pub continue_ckpt: Option<String>,
    pub nepoch: Option<usize>,
    pub lr_rate: Option<f64>,
    /// Advance the speaker-adaptation stage of the imported run.
    pub apply_sat: bool,
    pub num_sat_layers: Option<usize>,
}

/// Derive a new configuration from an imported one.
///
/// `old` is left untouched.
pub fn merge(old: &Config, overrides: &ConfigOverrides) -> Config {
    let mut new = old.clone();

    if let Some(dir) = &overrides.data_dir {
        new.data.data_dir = dir.clone();
    }
    if let Some(dir) = &overrides.train_dir {
        new.data.train_dir = dir.clone();
    }
    if let Some(ckpt) = &overrides.continue_ckpt {
        new.data.continue_ckpt = Some(ckpt.clone());
    }
    if let Some(nepoch) = overrides.nepoch {
        new.runtime.nepoch = nepoch;
    }
    if let Some(lr_rate) = overrides.lr_rate {
        new.runtime.lr_rate = lr_rate;
    }

    new.sat = SatConfig {
        stage: old.sat.stage.next(overrides.apply_sat),
        num_sat_layers: overrides
            .num_sat_layers
            .unwrap_or(old.sat.num_sat_layers),
        feat_dim: None,
    };
    new.run = RunInfo::default();

    new
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TrainError::ConfigFileNotFound {
                path: path.display().to_string(),
            });
        }
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(TrainError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            other => other,
        }
    }

    /// Write the configuration as TOML, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - CTCTRAIN_DATA_DIR → data.data_dir
    /// - CTCTRAIN_TRAIN_DIR → data.train_dir
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = std::env::var("CTCTRAIN_DATA_DIR")
            && !dir.is_empty()
        {
            self.data.data_dir = PathBuf::from(dir);
        }

        if let Ok(dir) = std::env::var("CTCTRAIN_TRAIN_DIR")
            && !dir.is_empty()
        {
            self.data.train_dir = PathBuf::from(dir);
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/ctctrain/config.toml on Linux
    #[cfg(feature = "cli")]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("ctctrain").join("config.toml"))
    }

    /// Reject values the loaders or the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.data.batch_size == 0 {
            return Err(TrainError::invalid(
                "data.batch_size",
                "batch size must be at least 1",
            ));
        }
        if self.data.debug && self.data.debug_limit == 0 {
            return Err(TrainError::invalid(
                "data.debug_limit",
                "debug limit must be at least 1",
            ));
        }
        if self.augment.enabled {
            self.augmentation().validate()?;
        } else if self.augment.window % 2 == 0 {
            // Checked even when disabled: the engine always sees the window.
            return Err(TrainError::invalid(
                "augment.window",
                format!("window must be odd, got {}", self.augment.window),
            ));
        }
        if self.data.mix && self.runtime.nepoch == 0 {
            return Err(TrainError::invalid(
                "runtime.nepoch",
                "mixing data needs at least one epoch",
            ));
        }
        if self.sat.stage.is_adapting() && self.sat.num_sat_layers == 0 {
            return Err(TrainError::invalid(
                "sat.num_sat_layers",
                "speaker adaptation needs at least one layer",
            ));
        }
        for (key, value) in [
            ("runtime.lr_rate", self.runtime.lr_rate),
            ("runtime.half_rate", self.runtime.half_rate),
            ("model.l2", self.model.l2),
            ("model.clip", self.model.clip),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(TrainError::invalid(
                    key,
                    format!("must be a non-negative number, got {value}"),
                ));
            }
        }
        Ok(())
    }

    fn augmentation(&self) -> Augmentation {
        Augmentation {
            window: self.augment.window,
            subsampling: self.augment.subsampling,
        }
    }

    /// Options handed to the partition loader.
    pub fn batching_options(&self) -> BatchingOptions {
        BatchingOptions {
            batch_size: self.data.batch_size,
            augmentation: self.augment.enabled.then(|| self.augmentation()),
            policy: self.model.lstm_type.batch_policy(),
            debug_limit: self.data.debug.then_some(self.data.debug_limit),
            extra_label_dirs: self.data.extra_label_dirs.clone(),
            duplicates: if self.data.allow_duplicate_labels {
                DuplicatePolicy::Overwrite
            } else {
                DuplicatePolicy::Reject
            },
        }
    }

    /// Where the model and the configuration snapshot are stored.
    pub fn model_dir(&self) -> PathBuf {
        let dir = self.data.train_dir.join(defaults::MODEL_DIR_NAME);
        if self.sat.stage.is_adapting() {
            dir.join(defaults::SAT_DIR_NAME)
        } else {
            dir
        }
    }
}
