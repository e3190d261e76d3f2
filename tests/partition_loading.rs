//! Integration tests for loading and batching a partition from disk.

use std::fs;
use std::path::{Path, PathBuf};

use ctctrain::batch::BatchPolicy;
use ctctrain::features::Augmentation;
use ctctrain::labels::DuplicatePolicy;
use ctctrain::partition::{BatchingOptions, load_mixed_partitions, load_partition};
use ctctrain::TrainError;
use tempfile::TempDir;

/// Write `<partition>_local.scp` with one 40-dim utterance per `(id, frames)`.
fn write_manifest(dir: &Path, partition: &str, utterances: &[(&str, usize)]) {
    let manifest: String = utterances
        .iter()
        .enumerate()
        .map(|(i, (id, frames))| format!("{id} /feats/raw.ark {} {frames} 40\n", i * 1000))
        .collect();
    fs::write(dir.join(format!("{partition}_local.scp")), manifest).unwrap();
}

fn write_labels(dir: &Path, train: &str, cv: &str) {
    fs::write(dir.join("labels.tr"), train).unwrap();
    fs::write(dir.join("labels.cv"), cv).unwrap();
}

fn ids(batches: &[Vec<String>]) -> Vec<Vec<&str>> {
    batches
        .iter()
        .map(|batch| batch.iter().map(String::as_str).collect())
        .collect()
}

fn options(batch_size: usize, policy: BatchPolicy) -> BatchingOptions {
    BatchingOptions {
        batch_size,
        policy,
        ..BatchingOptions::default()
    }
}

/// Five utterances of lengths 10, 10, 12, 12, 12.
fn five_utterance_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_manifest(
        dir.path(),
        "train",
        &[("u0", 10), ("u1", 10), ("u2", 12), ("u3", 12), ("u4", 12)],
    );
    write_labels(
        dir.path(),
        "u0 1 2 3\nu1 4\nu2 2 2\nu3 5 6 7 8\nu4 1\n",
        "",
    );
    dir
}

#[test]
fn test_equal_length_batches_follow_length_runs() {
    let dir = five_utterance_dir();
    let data = load_partition(dir.path(), "train", &options(3, BatchPolicy::EqualLength)).unwrap();

    assert_eq!(
        ids(&data.batches.utterance_ids),
        vec![vec!["u0", "u1"], vec!["u2", "u3", "u4"]]
    );
    assert_eq!(data.batches.heights(), vec![2, 3]);
    for batch in &data.batches.features {
        assert!(batch.iter().all(|f| f.frame_length == batch[0].frame_length));
    }
}

#[test]
fn test_uniform_batches_ignore_lengths() {
    let dir = five_utterance_dir();
    let data = load_partition(dir.path(), "train", &options(3, BatchPolicy::Uniform)).unwrap();

    assert_eq!(
        ids(&data.batches.utterance_ids),
        vec![vec!["u0", "u1", "u2"], vec!["u3", "u4"]]
    );
    assert_eq!(data.batches.heights(), vec![3, 2]);
}

#[test]
fn test_batches_are_sorted_and_cover_every_utterance() {
    let dir = TempDir::new().unwrap();
    let lengths = [("a", 30), ("b", 7), ("c", 19), ("d", 7), ("e", 30), ("f", 2), ("g", 19)];
    write_manifest(dir.path(), "train", &lengths);
    let labels: String = lengths.iter().map(|(id, _)| format!("{id} 1 2\n")).collect();
    write_labels(dir.path(), &labels, "");

    for policy in [BatchPolicy::Uniform, BatchPolicy::EqualLength] {
        let data = load_partition(dir.path(), "train", &options(2, policy)).unwrap();

        let frames: Vec<usize> = data
            .batches
            .features
            .iter()
            .flatten()
            .map(|f| f.frame_length)
            .collect();
        assert!(frames.windows(2).all(|w| w[0] <= w[1]), "{policy:?}: {frames:?}");

        let order: Vec<&str> = data.utterance_ids().collect();
        assert_eq!(order, vec!["f", "b", "d", "c", "g", "a", "e"]);
        assert_eq!(data.batches.heights().iter().sum::<usize>(), lengths.len());
        assert!(data.batches.heights().iter().all(|&h| (1..=2).contains(&h)));
    }
}

#[test]
fn test_sparse_labels_reconstruct_sequences() {
    let dir = five_utterance_dir();
    let data = load_partition(dir.path(), "train", &options(3, BatchPolicy::EqualLength)).unwrap();

    // Second batch is u2, u3, u4 with 0-based labels.
    let sparse = &data.batches.labels[1][0];
    assert_eq!(sparse.shape, [3, 4]);
    assert!(sparse.indices.iter().all(|&[r, c]| r < 3 && c < 4));

    let dense = sparse.to_dense(u32::MAX);
    assert_eq!(&dense[0][..2], &[1, 1]);
    assert_eq!(&dense[1][..4], &[4, 5, 6, 7]);
    assert_eq!(&dense[2][..1], &[0]);
    assert_eq!(dense[2][1], u32::MAX);
}

#[test]
fn test_alphabet_size_spans_both_label_files() {
    let dir = five_utterance_dir();
    fs::write(dir.path().join("labels.cv"), "x9 12\n").unwrap();

    let data = load_partition(dir.path(), "train", &options(3, BatchPolicy::Uniform)).unwrap();
    // Largest code 12 -> 11 after decrement -> 13 symbols with blank.
    assert_eq!(data.alphabet_sizes, vec![13]);
    assert_eq!(data.feature_dim, 40);
}

#[test]
fn test_augmentation_triples_records() {
    let dir = five_utterance_dir();
    let opts = BatchingOptions {
        augmentation: Some(Augmentation::default()),
        ..options(4, BatchPolicy::EqualLength)
    };
    let data = load_partition(dir.path(), "train", &opts).unwrap();

    assert_eq!(data.num_utterances(), 15);
    assert_eq!(data.feature_dim, 120);

    let rows: Vec<_> = data.batches.features.iter().flatten().collect();
    for row in &rows {
        assert_eq!(row.feature_dim, 120);
        assert!(row.augment_shift.is_some());
    }
    // Shift 0 of a 10-frame utterance has (10 + 2) / 3 frames.
    assert!(
        rows.iter()
            .any(|r| r.augment_shift == Some(0) && r.frame_length == 4)
    );
    for batch in &data.batches.features {
        assert!(batch.iter().all(|f| f.frame_length == batch[0].frame_length));
    }
}

#[test]
fn test_debug_limit_truncates_manifest() {
    let dir = five_utterance_dir();
    let opts = BatchingOptions {
        debug_limit: Some(2),
        ..options(3, BatchPolicy::Uniform)
    };
    let data = load_partition(dir.path(), "train", &opts).unwrap();
    assert_eq!(data.utterance_ids().collect::<Vec<_>>(), vec!["u0", "u1"]);
}

#[test]
fn test_extra_label_stream() {
    let dir = five_utterance_dir();
    let phones = TempDir::new().unwrap();
    write_labels(
        phones.path(),
        "u0 7\nu1 7 8\nu2 9\nu3 1\nu4 30\n",
        "",
    );

    let opts = BatchingOptions {
        extra_label_dirs: vec![phones.path().to_path_buf()],
        ..options(3, BatchPolicy::Uniform)
    };
    let data = load_partition(dir.path(), "train", &opts).unwrap();

    assert_eq!(data.alphabet_sizes, vec![9, 31]);
    assert!(data.batches.labels.iter().all(|streams| streams.len() == 2));
}

#[test]
fn test_missing_manifest_is_fatal() {
    let dir = five_utterance_dir();
    let err = load_partition(dir.path(), "cv", &BatchingOptions::default()).unwrap_err();
    match err {
        TrainError::MissingFile { path } => assert!(path.ends_with("cv_local.scp")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_missing_label_file_is_fatal() {
    let dir = five_utterance_dir();
    fs::remove_file(dir.path().join("labels.cv")).unwrap();
    let err = load_partition(dir.path(), "train", &BatchingOptions::default()).unwrap_err();
    assert!(matches!(err, TrainError::MissingFile { .. }));
}

#[test]
fn test_utterance_without_labels_is_fatal() {
    let dir = five_utterance_dir();
    write_labels(dir.path(), "u0 1\nu1 1\nu2 1\nu3 1\n", "");
    let err = load_partition(dir.path(), "train", &BatchingOptions::default()).unwrap_err();
    assert!(matches!(err, TrainError::Consistency { .. }));
    assert!(err.to_string().contains("u4"));
}

#[test]
fn test_duplicate_labels_rejected_unless_allowed() {
    let dir = five_utterance_dir();
    fs::write(dir.path().join("labels.cv"), "u4 9\n").unwrap();

    let err = load_partition(dir.path(), "train", &BatchingOptions::default()).unwrap_err();
    assert!(matches!(err, TrainError::DuplicateUtterance { .. }));

    let opts = BatchingOptions {
        duplicates: DuplicatePolicy::Overwrite,
        ..BatchingOptions::default()
    };
    let data = load_partition(dir.path(), "train", &opts).unwrap();
    assert_eq!(data.alphabet_sizes, vec![10]);
}

#[test]
fn test_mixed_partitions_load_one_directory_per_epoch() {
    let root = TempDir::new().unwrap();
    for epoch in 0..2 {
        let dir: PathBuf = root.path().join(format!("X{epoch}"));
        fs::create_dir(&dir).unwrap();
        write_manifest(&dir, "train", &[("m0", 5), ("m1", 6 + epoch)]);
        write_labels(&dir, "m0 1\nm1 2\n", "");
    }

    let parts = load_mixed_partitions(root.path(), "train", 2, &BatchingOptions::default()).unwrap();
    assert_eq!(parts.len(), 2);
    let longest = parts[1].batches.features.iter().flatten().map(|f| f.frame_length).max();
    assert_eq!(longest, Some(7));

    let err = load_mixed_partitions(root.path(), "train", 3, &BatchingOptions::default()).unwrap_err();
    assert!(matches!(err, TrainError::MissingFile { .. }));
}
