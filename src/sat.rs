//! Speaker adaptation (SAT): training stage machine and speaker transforms.

use crate::defaults;
use crate::error::{Result, TrainError};
use crate::manifest::{ManifestEntry, read_manifest};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// Stage of a speaker-adaptive training run.
///
/// A run either trains without adaptation, trains the speaker transform on
/// top of a frozen model, or fine-tunes everything with the transform in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SatStage {
    #[default]
    Unadapted,
    TrainingTransform,
    FineTuning,
}

impl SatStage {
    /// Stage of the next run, given the stage of the imported run.
    ///
    /// | current           | requested | next              |
    /// |-------------------|-----------|-------------------|
    /// | Unadapted         | yes       | TrainingTransform |
    /// | TrainingTransform | yes       | FineTuning        |
    /// | FineTuning        | yes       | FineTuning        |
    /// | any               | no        | Unadapted         |
    pub fn next(self, adaptation_requested: bool) -> Self {
        match (self, adaptation_requested) {
            (_, false) => SatStage::Unadapted,
            (SatStage::Unadapted, true) => SatStage::TrainingTransform,
            (SatStage::TrainingTransform, true) | (SatStage::FineTuning, true) => {
                SatStage::FineTuning
            }
        }
    }

    /// Whether speaker transforms must be loaded for this stage.
    pub fn is_adapting(self) -> bool {
        self != SatStage::Unadapted
    }
}

impl fmt::Display for SatStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SatStage::Unadapted => "unadapted",
            SatStage::TrainingTransform => "training_transform",
            SatStage::FineTuning => "fine_tuning",
        };
        f.write_str(name)
    }
}

/// Per-utterance speaker-transform locators for one partition.
///
/// Stored in the same five-column manifest format as the acoustic features.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeakerTransforms {
    feature_dim: usize,
    entries: HashMap<String, ManifestEntry>,
}

impl SpeakerTransforms {
    /// Load `<data_dir>/<partition>_sat_local.scp`.
    pub fn load(data_dir: &Path, partition: &str) -> Result<Self> {
        let path = data_dir.join(defaults::sat_manifest_file_name(partition));
        let entries = read_manifest(&path, None)?;
        Self::from_entries(entries).map_err(|e| match e {
            TrainError::Consistency { message } => TrainError::consistency(format!(
                "{}: {message}",
                path.display()
            )),
            other => other,
        })
    }

    pub fn from_entries(entries: Vec<ManifestEntry>) -> Result<Self> {
        let Some(feature_dim) = entries.first().map(|e| e.feature_dim) else {
            return Err(TrainError::consistency("no speaker transforms listed"));
        };
        if let Some(odd) = entries.iter().find(|e| e.feature_dim != feature_dim) {
            return Err(TrainError::consistency(format!(
                "speaker transform for {} has dimension {}, expected {feature_dim}",
                odd.id, odd.feature_dim
            )));
        }

        Ok(Self {
            feature_dim,
            entries: entries.into_iter().map(|e| (e.id.clone(), e)).collect(),
        })
    }

    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    pub fn get(&self, utterance: &str) -> Option<&ManifestEntry> {
        self.entries.get(utterance)
    }

    pub fn contains(&self, utterance: &str) -> bool {
        self.entries.contains_key(utterance)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
