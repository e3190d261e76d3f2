//! Cross-partition checks run after loading and before training.

use crate::error::{Result, TrainError};
use crate::partition::PartitionData;
use crate::sat::SpeakerTransforms;

/// Speaker transforms for the training and cross-validation partitions.
#[derive(Debug, Clone, PartialEq)]
pub struct SatSets {
    pub train: SpeakerTransforms,
    pub cv: SpeakerTransforms,
}

/// Check that the training partitions and the cv partition can feed the same model.
///
/// All partitions must agree on input dimension, number of label streams and
/// alphabet size per stream. With speaker adaptation on, every utterance needs
/// a transform and both transform sets must share a dimension.
pub fn check_training_sets(
    train: &[PartitionData],
    cv: &PartitionData,
    sat: Option<&SatSets>,
) -> Result<()> {
    for part in train {
        check_pair(part, cv)?;
    }

    if let Some(sat) = sat {
        if sat.train.feature_dim() != sat.cv.feature_dim() {
            return Err(TrainError::consistency(format!(
                "speaker transform dimension differs: train {} vs cv {}",
                sat.train.feature_dim(),
                sat.cv.feature_dim()
            )));
        }
        for part in train {
            check_transforms(part, &sat.train)?;
        }
        check_transforms(cv, &sat.cv)?;
    }

    Ok(())
}

fn check_pair(train: &PartitionData, cv: &PartitionData) -> Result<()> {
    if train.feature_dim != cv.feature_dim {
        return Err(TrainError::consistency(format!(
            "feature dimension differs: {} {} vs {} {}",
            train.name, train.feature_dim, cv.name, cv.feature_dim
        )));
    }
    if train.alphabet_sizes.len() != cv.alphabet_sizes.len() {
        return Err(TrainError::consistency(format!(
            "number of label streams differs: {} {} vs {} {}",
            train.name,
            train.alphabet_sizes.len(),
            cv.name,
            cv.alphabet_sizes.len()
        )));
    }
    for (stream, (tr, va)) in train
        .alphabet_sizes
        .iter()
        .zip(&cv.alphabet_sizes)
        .enumerate()
    {
        if tr != va {
            return Err(TrainError::consistency(format!(
                "alphabet size of stream {stream} differs: {} {tr} vs {} {va}",
                train.name, cv.name
            )));
        }
    }
    Ok(())
}

fn check_transforms(part: &PartitionData, transforms: &SpeakerTransforms) -> Result<()> {
    if let Some(missing) = part.utterance_ids().find(|id| !transforms.contains(id)) {
        return Err(TrainError::consistency(format!(
            "utterance {missing} in {} has no speaker transform",
            part.name
        )));
    }
    Ok(())
}
