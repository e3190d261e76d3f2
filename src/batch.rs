//! Batch builder: packs length-sorted utterances into mini-batches.
//!
//! Every batch carries three parallel pieces: feature locators for the
//! engine's reader, one sparse label encoding per label stream (the layout a
//! CTC loss consumes), and the utterance ids. Positions are shared across all
//! three, so `features[i]`, `labels[i]` and `utterance_ids[i]` always describe
//! the same batch.

use crate::error::{Result, TrainError};
use crate::features::UtteranceRecord;
use crate::labels::LabelStream;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// How consecutive records are grouped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BatchPolicy {
    /// Fixed-size slices; the last one may be shorter.
    Uniform,
    /// Slices never mix frame lengths. Needed by fused recurrent kernels that
    /// cannot handle a ragged time dimension.
    EqualLength,
}

/// Where the engine finds the features of one batch row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureLocator {
    pub locator: String,
    pub offset: u64,
    pub frame_length: usize,
    pub feature_dim: usize,
    pub augment_shift: Option<usize>,
}

impl From<&UtteranceRecord> for FeatureLocator {
    fn from(record: &UtteranceRecord) -> Self {
        Self {
            locator: record.locator.clone(),
            offset: record.offset,
            frame_length: record.frame_length,
            feature_dim: record.feature_dim,
            augment_shift: record.augment_shift,
        }
    }
}

/// Ragged label sequences as coordinate-format sparse data.
///
/// `indices[k] = [row, col]` holds `values[k]`. `shape` is
/// `[batch height, longest sequence in the batch]`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SparseLabels {
    pub indices: Vec<[usize; 2]>,
    pub values: Vec<u32>,
    pub shape: [usize; 2],
}

impl SparseLabels {
    /// Encode one label sequence per row.
    pub fn from_rows<'a, I>(rows: I) -> Self
    where
        I: IntoIterator<Item = &'a [u32]>,
    {
        let mut encoded = SparseLabels::default();
        let mut height = 0;
        let mut max_len = 0;

        for (row, sequence) in rows.into_iter().enumerate() {
            for (col, &value) in sequence.iter().enumerate() {
                encoded.indices.push([row, col]);
                encoded.values.push(value);
            }
            max_len = max_len.max(sequence.len());
            height = row + 1;
        }

        encoded.shape = [height, max_len];
        encoded
    }

    pub fn height(&self) -> usize {
        self.shape[0]
    }

    pub fn max_len(&self) -> usize {
        self.shape[1]
    }

    /// Materialize the dense `height x max_len` matrix, filling gaps with `pad`.
    pub fn to_dense(&self, pad: u32) -> Vec<Vec<u32>> {
        let mut dense = vec![vec![pad; self.max_len()]; self.height()];
        for (&[row, col], &value) in self.indices.iter().zip(&self.values) {
            dense[row][col] = value;
        }
        dense
    }
}

/// All batches of one partition, stored as three parallel vectors.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct BatchSet {
    pub features: Vec<Vec<FeatureLocator>>,
    /// `labels[batch][stream]`
    pub labels: Vec<Vec<SparseLabels>>,
    pub utterance_ids: Vec<Vec<String>>,
}

impl BatchSet {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Height of every batch, in order.
    pub fn heights(&self) -> Vec<usize> {
        self.utterance_ids.iter().map(Vec::len).collect()
    }

    /// Total number of batch rows.
    pub fn num_rows(&self) -> usize {
        self.utterance_ids.iter().map(Vec::len).sum()
    }

    /// Reorder batches with a seeded RNG, keeping the three vectors aligned.
    pub fn shuffle(&mut self, seed: u64) {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.shuffle(&mut StdRng::seed_from_u64(seed));

        self.features = permute(std::mem::take(&mut self.features), &order);
        self.labels = permute(std::mem::take(&mut self.labels), &order);
        self.utterance_ids = permute(std::mem::take(&mut self.utterance_ids), &order);
    }
}

fn permute<T>(items: Vec<T>, order: &[usize]) -> Vec<T> {
    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    order.iter().filter_map(|&i| slots[i].take()).collect()
}

/// Split `records` into consecutive batch ranges.
///
/// `records` must already be sorted by frame length for `EqualLength` to give
/// the largest possible batches; correctness (no mixed lengths) holds either way.
pub fn batch_ranges(
    records: &[UtteranceRecord],
    batch_size: usize,
    policy: BatchPolicy,
) -> Result<Vec<Range<usize>>> {
    if batch_size == 0 {
        return Err(TrainError::invalid(
            "data.batch_size",
            "batch size must be at least 1",
        ));
    }

    let total = records.len();
    let mut ranges = Vec::with_capacity(total.div_ceil(batch_size));
    let mut start = 0;

    while start < total {
        let cap = (start + batch_size).min(total);
        let end = match policy {
            BatchPolicy::Uniform => cap,
            BatchPolicy::EqualLength => {
                let target = records[start].frame_length;
                let mut end = start + 1;
                while end < cap && records[end].frame_length == target {
                    end += 1;
                }
                end
            }
        };
        ranges.push(start..end);
        start = end;
    }

    Ok(ranges)
}

/// Build every batch of a partition.
///
/// Fails with [`TrainError::Consistency`] if an utterance has no entry in one
/// of the label streams.
pub fn build_batches(
    records: &[UtteranceRecord],
    streams: &[LabelStream],
    batch_size: usize,
    policy: BatchPolicy,
) -> Result<BatchSet> {
    let ranges = batch_ranges(records, batch_size, policy)?;
    let mut set = BatchSet {
        features: Vec::with_capacity(ranges.len()),
        labels: Vec::with_capacity(ranges.len()),
        utterance_ids: Vec::with_capacity(ranges.len()),
    };

    for range in ranges {
        let batch = &records[range];

        let mut per_stream = Vec::with_capacity(streams.len());
        for (stream_idx, stream) in streams.iter().enumerate() {
            let rows = batch
                .iter()
                .map(|record| {
                    stream.get(&record.id).ok_or_else(|| {
                        TrainError::consistency(format!(
                            "utterance {} has no labels in stream {stream_idx}",
                            record.id
                        ))
                    })
                })
                .collect::<Result<Vec<&[u32]>>>()?;
            per_stream.push(SparseLabels::from_rows(rows));
        }

        set.features.push(batch.iter().map(FeatureLocator::from).collect());
        set.labels.push(per_stream);
        set.utterance_ids
            .push(batch.iter().map(|r| r.id.clone()).collect());
    }

    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::LabelMap;

    fn record(id: &str, frames: usize) -> UtteranceRecord {
        UtteranceRecord {
            id: id.to_string(),
            locator: format!("{id}.ark"),
            offset: 0,
            frame_length: frames,
            feature_dim: 40,
            augment_shift: None,
        }
    }

    fn stream(entries: &[(&str, &[u32])]) -> LabelStream {
        let labels: LabelMap = entries
            .iter()
            .map(|(id, seq)| (id.to_string(), seq.to_vec()))
            .collect();
        LabelStream {
            alphabet_size: 10,
            labels,
        }
    }

    fn five_utterances() -> (Vec<UtteranceRecord>, LabelStream) {
        let records = vec![
            record("u0", 10),
            record("u1", 10),
            record("u2", 12),
            record("u3", 12),
            record("u4", 12),
        ];
        let labels = stream(&[
            ("u0", &[1, 2]),
            ("u1", &[3]),
            ("u2", &[4, 5, 6]),
            ("u3", &[]),
            ("u4", &[7, 8]),
        ]);
        (records, labels)
    }

    #[test]
    fn test_equal_length_groups_runs() {
        let (records, labels) = five_utterances();
        let set = build_batches(&records, &[labels], 3, BatchPolicy::EqualLength).unwrap();
        assert_eq!(
            set.utterance_ids,
            vec![vec!["u0", "u1"], vec!["u2", "u3", "u4"]]
        );
        assert_eq!(set.heights(), vec![2, 3]);
    }

    #[test]
    fn test_uniform_ignores_lengths() {
        let (records, labels) = five_utterances();
        let set = build_batches(&records, &[labels], 3, BatchPolicy::Uniform).unwrap();
        assert_eq!(
            set.utterance_ids,
            vec![vec!["u0", "u1", "u2"], vec!["u3", "u4"]]
        );
    }

    #[test]
    fn test_equal_length_respects_batch_size_cap() {
        let records: Vec<UtteranceRecord> =
            (0..7).map(|i| record(&format!("u{i}"), 50)).collect();
        let ranges = batch_ranges(&records, 3, BatchPolicy::EqualLength).unwrap();
        assert_eq!(ranges, vec![0..3, 3..6, 6..7]);
    }

    #[test]
    fn test_equal_length_distinct_lengths_give_singletons() {
        let records = vec![record("a", 1), record("b", 2), record("c", 3)];
        let ranges = batch_ranges(&records, 8, BatchPolicy::EqualLength).unwrap();
        assert_eq!(ranges, vec![0..1, 1..2, 2..3]);
    }

    #[test]
    fn test_equal_length_batches_are_homogeneous() {
        let lengths = [3, 3, 3, 4, 5, 5, 5, 5, 5, 9, 9, 10];
        let records: Vec<UtteranceRecord> = lengths
            .iter()
            .enumerate()
            .map(|(i, &len)| record(&format!("u{i}"), len))
            .collect();

        let ranges = batch_ranges(&records, 4, BatchPolicy::EqualLength).unwrap();
        let covered: usize = ranges.iter().map(|r| r.len()).sum();
        assert_eq!(covered, records.len());
        for range in ranges {
            assert!(range.len() <= 4);
            let batch = &records[range];
            assert!(batch.iter().all(|r| r.frame_length == batch[0].frame_length));
        }
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let (records, _) = five_utterances();
        let err = batch_ranges(&records, 0, BatchPolicy::Uniform).unwrap_err();
        assert!(matches!(err, TrainError::ConfigInvalidValue { .. }));
    }

    #[test]
    fn test_empty_records_give_no_batches() {
        let set = build_batches(&[], &[], 4, BatchPolicy::EqualLength).unwrap();
        assert!(set.is_empty());
        assert_eq!(set.num_rows(), 0);
    }

    #[test]
    fn test_sparse_encoding_layout() {
        let (records, labels) = five_utterances();
        let set = build_batches(&records, &[labels], 3, BatchPolicy::EqualLength).unwrap();

        let second = &set.labels[1][0];
        assert_eq!(second.shape, [3, 3]);
        assert_eq!(
            second.indices,
            vec![[0, 0], [0, 1], [0, 2], [2, 0], [2, 1]]
        );
        assert_eq!(second.values, vec![4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_empty_label_still_occupies_row() {
        let rows: Vec<&[u32]> = vec![&[], &[]];
        let encoded = SparseLabels::from_rows(rows);
        assert_eq!(encoded.shape, [2, 0]);
        assert!(encoded.indices.is_empty());
        assert!(encoded.values.is_empty());
    }

    #[test]
    fn test_dense_reconstruction_matches_original_rows() {
        let (records, labels) = five_utterances();
        let set = build_batches(&records, &[labels.clone()], 2, BatchPolicy::Uniform).unwrap();

        for (ids, streams) in set.utterance_ids.iter().zip(&set.labels) {
            let dense = streams[0].to_dense(u32::MAX);
            for (row, id) in ids.iter().enumerate() {
                let original = labels.get(id).unwrap();
                assert_eq!(&dense[row][..original.len()], original);
            }
        }
    }

    #[test]
    fn test_indices_stay_within_shape() {
        let (records, labels) = five_utterances();
        let set = build_batches(&records, &[labels], 4, BatchPolicy::Uniform).unwrap();
        for streams in &set.labels {
            let sparse = &streams[0];
            assert_eq!(sparse.indices.len(), sparse.values.len());
            for &[row, col] in &sparse.indices {
                assert!(row < sparse.height());
                assert!(col < sparse.max_len());
            }
        }
    }

    #[test]
    fn test_multiple_streams_are_encoded_independently() {
        let (records, chars) = five_utterances();
        let phones = stream(&[
            ("u0", &[0]),
            ("u1", &[0, 1, 2, 3]),
            ("u2", &[1]),
            ("u3", &[2]),
            ("u4", &[3]),
        ]);
        let set = build_batches(&records, &[chars, phones], 3, BatchPolicy::EqualLength).unwrap();

        assert_eq!(set.labels[0].len(), 2);
        assert_eq!(set.labels[0][0].shape, [2, 2]);
        assert_eq!(set.labels[0][1].shape, [2, 4]);
    }

    #[test]
    fn test_missing_label_is_consistency_error() {
        let (records, _) = five_utterances();
        let partial = stream(&[("u0", &[1]), ("u1", &[1])]);
        let err = build_batches(&records, &[partial], 3, BatchPolicy::Uniform).unwrap_err();
        match err {
            TrainError::Consistency { message } => assert!(message.contains("u2")),
            other => panic!("Expected Consistency, got {other:?}"),
        }
    }

    #[test]
    fn test_feature_locators_follow_records() {
        let (records, labels) = five_utterances();
        let set = build_batches(&records, &[labels], 3, BatchPolicy::Uniform).unwrap();
        assert_eq!(set.features[1][0].locator, "u3.ark");
        assert_eq!(set.features[1][0].frame_length, 12);
    }

    #[test]
    fn test_shuffle_keeps_batches_aligned() {
        let records: Vec<UtteranceRecord> =
            (0..20).map(|i| record(&format!("u{i}"), i)).collect();
        let labels = LabelStream {
            alphabet_size: 30,
            labels: (0..20).map(|i| (format!("u{i}"), vec![i as u32])).collect(),
        };
        let mut set = build_batches(&records, &[labels], 3, BatchPolicy::Uniform).unwrap();
        let before = set.clone();

        set.shuffle(15213);

        assert_eq!(set.len(), before.len());
        for i in 0..set.len() {
            let first_id = &set.utterance_ids[i][0];
            let idx: u32 = first_id.trim_start_matches('u').parse().unwrap();
            assert_eq!(set.labels[i][0].values[0], idx);
            assert_eq!(set.features[i][0].locator, format!("{first_id}.ark"));
        }

        let mut again = before.clone();
        again.shuffle(15213);
        assert_eq!(again, set);
    }
}
