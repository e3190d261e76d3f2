//! Batch orchestration for one named data partition (train, cv).
//!
//! Ties the label store, the feature index and the batch builder together and
//! returns everything the training engine needs for that partition.

use crate::batch::{BatchPolicy, BatchSet, build_batches};
use crate::defaults;
use crate::error::{Result, TrainError};
use crate::features::{Augmentation, FeatureIndex};
use crate::labels::{DuplicatePolicy, LabelStream, load_labels};
use crate::manifest::{ManifestEntry, read_manifest};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Everything that shapes how a partition is read and batched.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchingOptions {
    pub batch_size: usize,
    pub augmentation: Option<Augmentation>,
    pub policy: BatchPolicy,
    pub debug_limit: Option<usize>,
    /// Directories holding auxiliary label streams, loaded after the primary one.
    pub extra_label_dirs: Vec<PathBuf>,
    pub duplicates: DuplicatePolicy,
}

impl Default for BatchingOptions {
    fn default() -> Self {
        Self {
            batch_size: defaults::BATCH_SIZE,
            augmentation: None,
            policy: BatchPolicy::EqualLength,
            debug_limit: None,
            extra_label_dirs: Vec::new(),
            duplicates: DuplicatePolicy::Reject,
        }
    }
}

impl BatchingOptions {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(TrainError::invalid(
                "data.batch_size",
                "batch size must be at least 1",
            ));
        }
        if let Some(aug) = &self.augmentation {
            aug.validate()?;
        }
        Ok(())
    }
}

/// A fully batched partition.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionData {
    pub name: String,
    /// One alphabet size per label stream; stream 0 is the primary target set.
    pub alphabet_sizes: Vec<usize>,
    /// Input dimension after augmentation.
    pub feature_dim: usize,
    pub batches: BatchSet,
}

impl PartitionData {
    /// Every utterance id in batch order. Augmented utterances repeat.
    pub fn utterance_ids(&self) -> impl Iterator<Item = &str> {
        self.batches
            .utterance_ids
            .iter()
            .flatten()
            .map(String::as_str)
    }

    pub fn num_utterances(&self) -> usize {
        self.batches.num_rows()
    }

    /// Batch statistics for reports.
    pub fn summary(&self) -> PartitionSummary {
        let heights = self.batches.heights();
        let frames = self.batches.features.iter().flatten().map(|f| f.frame_length);
        let utterances = self.num_utterances();

        PartitionSummary {
            partition: self.name.clone(),
            alphabet_sizes: self.alphabet_sizes.clone(),
            feature_dim: self.feature_dim,
            batches: heights.len(),
            utterances,
            min_batch: heights.iter().copied().min().unwrap_or(0),
            max_batch: heights.iter().copied().max().unwrap_or(0),
            mean_batch: if heights.is_empty() {
                0.0
            } else {
                utterances as f64 / heights.len() as f64
            },
            min_frames: frames.clone().min().unwrap_or(0),
            max_frames: frames.max().unwrap_or(0),
        }
    }
}

/// Summary of one batched partition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartitionSummary {
    pub partition: String,
    pub alphabet_sizes: Vec<usize>,
    pub feature_dim: usize,
    pub batches: usize,
    pub utterances: usize,
    pub min_batch: usize,
    pub max_batch: usize,
    pub mean_batch: f64,
    pub min_frames: usize,
    pub max_frames: usize,
}

/// Load the primary label stream from `data_dir`, then one stream per extra directory.
pub fn load_label_streams(data_dir: &Path, options: &BatchingOptions) -> Result<Vec<LabelStream>> {
    let mut streams = Vec::with_capacity(1 + options.extra_label_dirs.len());
    streams.push(load_labels(
        data_dir,
        defaults::LABEL_FILES,
        options.duplicates,
    )?);

    for dir in &options.extra_label_dirs {
        info!(dir = %dir.display(), "Loading extra label stream");
        streams.push(load_labels(dir, defaults::LABEL_FILES, options.duplicates)?);
    }

    Ok(streams)
}

/// Read, check, sort and batch the partition stored under `data_dir`.
///
/// Nothing is batched unless the manifest and every label stream agree on the
/// set of utterances.
pub fn load_partition(
    data_dir: &Path,
    partition: &str,
    options: &BatchingOptions,
) -> Result<PartitionData> {
    options.validate()?;

    let manifest_path = data_dir.join(defaults::manifest_file_name(partition));
    if !manifest_path.is_file() {
        return Err(TrainError::MissingFile {
            path: manifest_path.display().to_string(),
        });
    }

    let streams = load_label_streams(data_dir, options)?;
    let alphabet_sizes: Vec<usize> = streams.iter().map(|s| s.alphabet_size).collect();

    let entries = read_manifest(&manifest_path, options.debug_limit)?;
    let raw_dim = check_entries(&entries, &streams, &manifest_path)?;

    let feature_dim = match &options.augmentation {
        Some(aug) => {
            info!(
                manifest = %manifest_path.display(),
                features = raw_dim,
                classes = ?alphabet_sizes,
                examples = entries.len(),
                "Augmenting data"
            );
            aug.feature_dim(raw_dim)?
        }
        None => raw_dim,
    };

    let index = FeatureIndex::build(&entries, options.augmentation.as_ref())?;
    let batches = build_batches(index.records(), &streams, options.batch_size, options.policy)?;

    debug!(
        partition,
        records = index.len(),
        batches = batches.len(),
        policy = ?options.policy,
        "Built batches"
    );

    Ok(PartitionData {
        name: partition.to_string(),
        alphabet_sizes,
        feature_dim,
        batches,
    })
}

/// Load one copy of `partition` per epoch from `<data_dir>/X<epoch>`.
///
/// Used when the training data is re-mixed externally for every epoch.
/// Epochs are loaded one after another.
pub fn load_mixed_partitions(
    data_dir: &Path,
    partition: &str,
    nepoch: usize,
    options: &BatchingOptions,
) -> Result<Vec<PartitionData>> {
    (0..nepoch)
        .map(|epoch| {
            let epoch_dir = data_dir.join(format!("{}{epoch}", defaults::MIX_DIR_PREFIX));
            debug!(epoch, dir = %epoch_dir.display(), "Loading mixed epoch data");
            load_partition(&epoch_dir, partition, options)
        })
        .collect()
}

/// Verify the manifest against the label streams and return the shared feature dimension.
fn check_entries(
    entries: &[ManifestEntry],
    streams: &[LabelStream],
    manifest_path: &Path,
) -> Result<usize> {
    let Some(first) = entries.first() else {
        return Err(TrainError::ManifestParse {
            path: manifest_path.display().to_string(),
            line: 0,
            message: "manifest lists no utterances".to_string(),
        });
    };

    for entry in entries {
        if entry.feature_dim != first.feature_dim {
            return Err(TrainError::consistency(format!(
                "utterance {} has feature dimension {}, expected {}",
                entry.id, entry.feature_dim, first.feature_dim
            )));
        }
        for (stream_idx, stream) in streams.iter().enumerate() {
            if stream.get(&entry.id).is_none() {
                return Err(TrainError::consistency(format!(
                    "utterance {} from {} has no labels in stream {stream_idx}",
                    entry.id,
                    manifest_path.display()
                )));
            }
        }
    }

    Ok(first.feature_dim)
}
