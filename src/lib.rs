//! ctctrain - CTC acoustic model training driver
//!
//! Reads feature manifests and label files, sorts and batches utterances,
//! checks train/cv consistency and hands the batches to a training engine.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod batch;
pub mod config;
pub mod consistency;
pub mod defaults;
pub mod engine;
pub mod error;
pub mod features;
pub mod labels;
pub mod logging;
pub mod manifest;
pub mod partition;
pub mod sat;

#[cfg(feature = "cli")]
pub mod cli;

// Composition root
#[cfg(feature = "cli")]
pub mod app;

// Engine seam
pub use engine::{DryRunEngine, MockEngine, TrainingData, TrainingEngine};

// Data loading
pub use batch::{BatchPolicy, BatchSet, FeatureLocator, SparseLabels, batch_ranges, build_batches};
pub use features::{Augmentation, FeatureIndex, UtteranceRecord};
pub use labels::{DuplicatePolicy, LabelStream, load_labels};
pub use partition::{BatchingOptions, PartitionData, load_mixed_partitions, load_partition};

// Error handling
pub use error::{Result, TrainError};

// Config
pub use config::{Config, ConfigOverrides, merge};
pub use sat::SatStage;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{version}+{hash}"),
        _ => version.to_string(),
    }
}
