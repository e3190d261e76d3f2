//! Feature index: per-utterance metadata sorted by frame length.
//!
//! The index never touches feature values. It only records where each
//! utterance lives and how long it is, which is all batching needs.

use crate::defaults;
use crate::error::{Result, TrainError};
use crate::manifest::{ManifestEntry, read_manifest};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Frame stacking plus subsampling applied on the fly by the training engine.
///
/// Each utterance yields one record per subsampling shift. A record with shift
/// `s` covers frames `s, s + subsampling, ...` with `window` neighbouring frames
/// concatenated per step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Augmentation {
    pub window: usize,
    pub subsampling: usize,
}

impl Default for Augmentation {
    fn default() -> Self {
        Self {
            window: defaults::AUGMENT_WINDOW,
            subsampling: defaults::AUGMENT_SUBSAMPLING,
        }
    }
}

impl Augmentation {
    /// Check the constraints the engine's frame-stacking kernel relies on.
    pub fn validate(&self) -> Result<()> {
        if self.window % 2 == 0 {
            return Err(TrainError::invalid(
                "augment.window",
                format!("window must be odd, got {}", self.window),
            ));
        }
        if self.subsampling == 0 {
            return Err(TrainError::invalid(
                "augment.subsampling",
                "subsampling must be at least 1",
            ));
        }
        Ok(())
    }

    /// Frames left after subsampling a sequence of `frame_length` frames at `shift`.
    ///
    /// `None` when the length cannot be represented or subsampling is 0.
    pub fn frame_length(&self, frame_length: usize, shift: usize) -> Option<usize> {
        let step = self.subsampling.checked_sub(1)?;
        let padded = frame_length.checked_add(step)?;
        Some(padded.saturating_sub(shift) / self.subsampling)
    }

    /// Dimension of a stacked feature vector.
    pub fn feature_dim(&self, feature_dim: usize) -> Result<usize> {
        self.window.checked_mul(feature_dim).ok_or_else(|| {
            TrainError::invalid(
                "augment.window",
                format!(
                    "window {} is too large for feature dimension {feature_dim}",
                    self.window
                ),
            )
        })
    }
}

/// Metadata for one (possibly augmented) utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtteranceRecord {
    pub id: String,
    pub locator: String,
    pub offset: u64,
    pub frame_length: usize,
    pub feature_dim: usize,
    /// Subsampling shift, `None` when augmentation is off.
    pub augment_shift: Option<usize>,
}

impl UtteranceRecord {
    fn plain(entry: &ManifestEntry) -> Self {
        Self {
            id: entry.id.clone(),
            locator: entry.locator.clone(),
            offset: entry.offset,
            frame_length: entry.frame_length,
            feature_dim: entry.feature_dim,
            augment_shift: None,
        }
    }

    fn shifted(entry: &ManifestEntry, augmentation: &Augmentation, shift: usize) -> Result<Self> {
        let frame_length = augmentation
            .frame_length(entry.frame_length, shift)
            .ok_or_else(|| TrainError::FrameLength {
                utterance: entry.id.clone(),
                frames: entry.frame_length,
            })?;
        Ok(Self {
            frame_length,
            feature_dim: augmentation.feature_dim(entry.feature_dim)?,
            augment_shift: Some(shift),
            ..Self::plain(entry)
        })
    }
}

/// Length-sorted utterance records for one partition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureIndex {
    records: Vec<UtteranceRecord>,
}

impl FeatureIndex {
    /// Read a manifest and build the index from it.
    pub fn load(
        path: &Path,
        limit: Option<usize>,
        augmentation: Option<&Augmentation>,
    ) -> Result<Self> {
        let entries = read_manifest(path, limit)?;
        debug!(path = %path.display(), entries = entries.len(), "Read feature manifest");
        Self::build(&entries, augmentation)
    }

    /// Build the index from parsed manifest entries.
    ///
    /// With augmentation every entry is expanded once per shift, shift-major
    /// (all entries at shift 0 first). The result is stably sorted by frame
    /// length, so ties keep that order.
    pub fn build(entries: &[ManifestEntry], augmentation: Option<&Augmentation>) -> Result<Self> {
        let mut records: Vec<UtteranceRecord> = match augmentation {
            Some(aug) => (0..aug.subsampling)
                .flat_map(|shift| {
                    entries
                        .iter()
                        .map(move |entry| UtteranceRecord::shifted(entry, aug, shift))
                })
                .collect::<Result<_>>()?,
            None => entries.iter().map(UtteranceRecord::plain).collect(),
        };

        // `sort_by_key` is stable.
        records.sort_by_key(|r| r.frame_length);

        Ok(Self { records })
    }

    pub fn records(&self) -> &[UtteranceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.id.as_str())
    }
}
