//! Command-line interface for ctctrain
//!
//! Provides argument parsing using clap derive macros.

use crate::config::{Config, ConfigOverrides, LstmType};
use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

/// Prepare batched CTC training data and drive a training engine
#[derive(Parser, Debug)]
#[command(
    name = "ctctrain",
    version,
    about = "Prepare batched CTC training data and drive a training engine"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only print warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
#[allow(clippy::large_enum_variant)]
pub enum Commands {
    /// Load train and cv data, check them, snapshot the config and train
    Train(TrainArgs),

    /// Load one partition and print batch statistics
    Inspect {
        /// Partition to load (e.g. train, cv)
        #[arg(default_value = "cv")]
        partition: String,

        #[command(flatten)]
        data: DataArgs,

        /// Output format
        #[arg(long, short = 'o', value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

/// Options that decide how a partition is read and batched.
#[derive(Args, Debug, Clone, Default)]
pub struct DataArgs {
    /// Directory with <partition>_local.scp manifests and labels.tr/labels.cv
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Utterances per batch
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,

    /// Extra label directories, colon-separated (e.g. a phone set next to characters)
    #[arg(long, value_name = "DIR[:DIR...]")]
    pub extra_labels: Option<String>,

    /// Expand every utterance into shifted, subsampled copies
    #[arg(long)]
    pub augment: bool,

    /// Frames concatenated per step when augmenting (must be odd)
    #[arg(long, value_name = "FRAMES")]
    pub window: Option<usize>,

    /// Subsampling factor when augmenting
    #[arg(long, value_name = "FACTOR")]
    pub subsampling: Option<usize>,

    /// LSTM kernel; cudnn forces equal-length batches
    #[arg(long, value_enum, value_name = "TYPE")]
    pub lstm_type: Option<LstmType>,

    /// Read only the first entries of each manifest
    #[arg(long)]
    pub debug: bool,

    /// Keep the last entry when a label file repeats an utterance id
    #[arg(long)]
    pub allow_duplicate_labels: bool,
}

/// Arguments of `ctctrain train`
#[derive(Args, Debug, Clone, Default)]
pub struct TrainArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Log and model output directory
    #[arg(long, value_name = "DIR")]
    pub train_dir: Option<PathBuf>,

    /// Continue from a previous run's config.toml snapshot
    #[arg(long, value_name = "PATH")]
    pub import_config: Option<PathBuf>,

    /// Checkpoint to continue training from
    #[arg(long, value_name = "CKPT")]
    pub continue_ckpt: Option<String>,

    /// Store the model after training
    #[arg(long)]
    pub store_model: bool,

    /// Do not shuffle training batches
    #[arg(long)]
    pub noshuffle: bool,

    /// Apply random rolls to the frames in a batch
    #[arg(long)]
    pub roll: bool,

    /// Load a differently mixed copy of the training data for every epoch
    #[arg(long)]
    pub mix: bool,

    /// Model architecture name
    #[arg(long, value_name = "NAME")]
    pub model: Option<String>,

    /// Number of layers
    #[arg(long, value_name = "N")]
    pub nlayer: Option<usize>,

    /// Hidden units per direction
    #[arg(long, value_name = "N")]
    pub nhidden: Option<usize>,

    /// Projection units (0 disables projection)
    #[arg(long, value_name = "N")]
    pub nproj: Option<usize>,

    /// Feature projection units (0 disables projection)
    #[arg(long, value_name = "N")]
    pub feat_proj: Option<usize>,

    /// L2 regularisation weight
    #[arg(long, value_name = "WEIGHT")]
    pub l2: Option<f64>,

    /// Gradient clipping threshold
    #[arg(long, value_name = "VALUE")]
    pub clip: Option<f64>,

    /// Add batch normalisation to fully connected layers
    #[arg(long)]
    pub batch_norm: bool,

    /// Optimiser: grad, adam, momentum
    #[arg(long, value_name = "OPT")]
    pub grad_opt: Option<String>,

    /// Number of epochs
    #[arg(long, value_name = "N")]
    pub nepoch: Option<usize>,

    /// Learning rate
    #[arg(long, value_name = "RATE")]
    pub lr_rate: Option<f64>,

    /// Epochs between learning-rate halvings
    #[arg(long, value_name = "N")]
    pub half_period: Option<usize>,

    /// Learning-rate halving factor
    #[arg(long, value_name = "FACTOR")]
    pub half_rate: Option<f64>,

    /// Enable halving after this many epochs
    #[arg(long, value_name = "N")]
    pub half_after: Option<usize>,

    /// Train (or continue training) a speaker adaptation layer
    #[arg(long)]
    pub apply_sat: bool,

    /// Number of speaker adaptation layers
    #[arg(long, value_name = "N")]
    pub num_sat_layers: Option<usize>,
}

/// Split a colon-separated list of directories, ignoring empty parts.
fn split_label_dirs(s: &str) -> Vec<PathBuf> {
    s.split(':')
        .filter(|part| !part.is_empty())
        .map(PathBuf::from)
        .collect()
}

impl DataArgs {
    /// Write the flags that were given into `config`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(dir) = &self.data_dir {
            config.data.data_dir = dir.clone();
        }
        if let Some(n) = self.batch_size {
            config.data.batch_size = n;
        }
        if let Some(dirs) = &self.extra_labels {
            config.data.extra_label_dirs = split_label_dirs(dirs);
        }
        if self.augment {
            config.augment.enabled = true;
        }
        if let Some(window) = self.window {
            config.augment.window = window;
        }
        if let Some(subsampling) = self.subsampling {
            config.augment.subsampling = subsampling;
        }
        if let Some(lstm_type) = self.lstm_type {
            config.model.lstm_type = lstm_type;
        }
        if self.debug {
            config.data.debug = true;
        }
        if self.allow_duplicate_labels {
            config.data.allow_duplicate_labels = true;
        }
    }
}

impl TrainArgs {
    /// Write the flags that were given into a fresh `config`.
    pub fn apply(&self, config: &mut Config) {
        self.data.apply(config);

        if let Some(dir) = &self.train_dir {
            config.data.train_dir = dir.clone();
        }
        if let Some(ckpt) = &self.continue_ckpt {
            config.data.continue_ckpt = Some(ckpt.clone());
        }
        config.data.store_model |= self.store_model;
        config.data.mix |= self.mix;
        if self.noshuffle {
            config.data.shuffle = false;
        }
        config.augment.roll |= self.roll;

        if let Some(model) = &self.model {
            config.model.model = model.clone();
        }
        if let Some(n) = self.nlayer {
            config.model.nlayer = n;
        }
        if let Some(n) = self.nhidden {
            config.model.nhidden = n;
        }
        if let Some(n) = self.nproj {
            config.model.nproj = n;
        }
        if let Some(n) = self.feat_proj {
            config.model.feat_proj = n;
        }
        if let Some(l2) = self.l2 {
            config.model.l2 = l2;
        }
        if let Some(clip) = self.clip {
            config.model.clip = clip;
        }
        config.model.batch_norm |= self.batch_norm;
        if let Some(opt) = &self.grad_opt {
            config.model.grad_opt = opt.clone();
        }

        if let Some(n) = self.nepoch {
            config.runtime.nepoch = n;
        }
        if let Some(rate) = self.lr_rate {
            config.runtime.lr_rate = rate;
        }
        if let Some(n) = self.half_period {
            config.runtime.half_period = n;
        }
        if let Some(rate) = self.half_rate {
            config.runtime.half_rate = rate;
        }
        if let Some(n) = self.half_after {
            config.runtime.half_after = n;
        }
        if let Some(n) = self.num_sat_layers {
            config.sat.num_sat_layers = n;
        }
    }

    /// The subset of flags honoured when continuing from an imported snapshot.
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            data_dir: self.data.data_dir.clone(),
            train_dir: self.train_dir.clone(),
            continue_ckpt: self.continue_ckpt.clone(),
            nepoch: self.nepoch,
            lr_rate: self.lr_rate,
            apply_sat: self.apply_sat,
            num_sat_layers: self.num_sat_layers,
        }
    }
}
