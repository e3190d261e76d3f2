use crate::config::Config;
use crate::consistency::SatSets;
use crate::error::{Result, TrainError};
use crate::partition::PartitionData;
use tracing::info;

/// Batched data for one training run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingData {
    pub cv: PartitionData,
    /// One partition, or one per epoch when data mixing is on.
    pub train: Vec<PartitionData>,
    pub sat: Option<SatSets>,
}

impl TrainingData {
    /// Training partition for `epoch`.
    ///
    /// With a single partition every epoch sees the same data.
    pub fn train_for_epoch(&self, epoch: usize) -> Option<&PartitionData> {
        self.train.get(self.epoch_slot(epoch))
    }

    pub fn train_for_epoch_mut(&mut self, epoch: usize) -> Option<&mut PartitionData> {
        let slot = self.epoch_slot(epoch);
        self.train.get_mut(slot)
    }

    fn epoch_slot(&self, epoch: usize) -> usize {
        if self.train.len() == 1 { 0 } else { epoch }
    }
}

/// Trait for the network training loop.
///
/// The model definition, the CTC loss and optimisation all live behind this
/// seam. Implementations receive the batches and the validated configuration,
/// and must keep the batch-for-batch alignment of features, labels and ids if
/// they reorder anything.
pub trait TrainingEngine {
    /// Name shown in logs.
    fn name(&self) -> &str;

    /// Train on `data` until the configured number of epochs is done.
    fn train(&mut self, data: TrainingData, config: &Config) -> Result<()>;
}

impl<T: TrainingEngine + ?Sized> TrainingEngine for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn train(&mut self, data: TrainingData, config: &Config) -> Result<()> {
        (**self).train(data, config)
    }
}

/// Engine that walks the epochs and logs batch statistics without training.
///
/// Useful for checking a data directory end to end.
#[derive(Debug, Clone, Default)]
pub struct DryRunEngine {
    batches_seen: usize,
}

impl DryRunEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Training batches visited by the last call to `train`.
    pub fn batches_seen(&self) -> usize {
        self.batches_seen
    }
}

impl TrainingEngine for DryRunEngine {
    fn name(&self) -> &str {
        "dry-run"
    }

    fn train(&mut self, mut data: TrainingData, config: &Config) -> Result<()> {
        self.batches_seen = 0;
        let nepoch = config.runtime.nepoch;

        for epoch in 0..nepoch {
            let Some(part) = data.train_for_epoch_mut(epoch) else {
                return Err(TrainError::Engine {
                    message: format!("no training data for epoch {epoch}"),
                });
            };
            if config.data.shuffle {
                part.batches.shuffle(config.random_seed.wrapping_add(epoch as u64));
            }

            let heights = part.batches.heights();
            let largest = heights.iter().copied().max().unwrap_or(0);
            info!(
                epoch = epoch + 1,
                nepoch,
                batches = heights.len(),
                utterances = part.num_utterances(),
                largest_batch = largest,
                "Dry-run epoch"
            );
            self.batches_seen += heights.len();
        }

        info!(
            cv_batches = data.cv.batches.len(),
            cv_utterances = data.cv.num_utterances(),
            "Dry-run validation"
        );
        Ok(())
    }
}

/// Mock engine for testing
#[derive(Debug, Clone, Default)]
pub struct MockEngine {
    received: Option<TrainingData>,
    should_fail: bool,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the mock to fail on train
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Data passed to the last successful `train` call.
    pub fn received(&self) -> Option<&TrainingData> {
        self.received.as_ref()
    }
}

impl TrainingEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    fn train(&mut self, data: TrainingData, _config: &Config) -> Result<()> {
        if self.should_fail {
            return Err(TrainError::Engine {
                message: "mock training failure".to_string(),
            });
        }
        self.received = Some(data);
        Ok(())
    }
}
