//! Label store: target symbol sequences keyed by utterance id.
//!
//! Label files are whitespace-delimited text, one utterance per line:
//! `<utterance_id> <code> <code> ...` with 1-based codes. Codes are stored
//! 0-based, leaving room for the CTC blank at the top of the alphabet.

use crate::error::{Result, TrainError};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, warn};

/// Utterance id to 0-based label sequence.
pub type LabelMap = HashMap<String, Vec<u32>>;

/// What to do when the same utterance id is seen twice within one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Abort the load with [`TrainError::DuplicateUtterance`].
    #[default]
    Reject,
    /// Keep the last occurrence.
    Overwrite,
}

/// One loaded label stream.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LabelStream {
    /// Largest 0-based label plus two.
    pub alphabet_size: usize,
    pub labels: LabelMap,
}

impl LabelStream {
    pub fn get(&self, utterance: &str) -> Option<&[u32]> {
        self.labels.get(utterance).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Load every file in `files` from `dir` into a single stream.
pub fn load_labels<S: AsRef<str>>(
    dir: &Path,
    files: &[S],
    policy: DuplicatePolicy,
) -> Result<LabelStream> {
    let mut builder = StreamBuilder::new(policy);

    for name in files {
        let path = dir.join(name.as_ref());
        if !path.is_file() {
            return Err(TrainError::MissingFile {
                path: path.display().to_string(),
            });
        }
        let file = File::open(&path)?;
        builder.read(BufReader::new(file), &path.display().to_string())?;
    }

    let stream = builder.finish();
    debug!(
        dir = %dir.display(),
        utterances = stream.len(),
        alphabet_size = stream.alphabet_size,
        "Loaded label stream"
    );
    Ok(stream)
}

/// Parse a single label source, e.g. an in-memory buffer.
pub fn parse_labels<R: BufRead>(
    reader: R,
    source: &str,
    policy: DuplicatePolicy,
) -> Result<LabelStream> {
    let mut builder = StreamBuilder::new(policy);
    builder.read(reader, source)?;
    Ok(builder.finish())
}

struct StreamBuilder {
    policy: DuplicatePolicy,
    labels: LabelMap,
    max_label: u32,
}

impl StreamBuilder {
    fn new(policy: DuplicatePolicy) -> Self {
        Self {
            policy,
            labels: LabelMap::new(),
            max_label: 0,
        }
    }

    fn read<R: BufRead>(&mut self, reader: R, source: &str) -> Result<()> {
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let mut tokens = line.split_whitespace();
            let Some(utterance) = tokens.next() else {
                continue;
            };

            let mut sequence = Vec::new();
            for token in tokens {
                let label = parse_code(token).map_err(|message| TrainError::ManifestParse {
                    path: source.to_string(),
                    line: idx + 1,
                    message,
                })?;
                self.max_label = self.max_label.max(label);
                sequence.push(label);
            }

            if self.labels.insert(utterance.to_string(), sequence).is_some() {
                match self.policy {
                    DuplicatePolicy::Reject => {
                        return Err(TrainError::DuplicateUtterance {
                            path: source.to_string(),
                            utterance: utterance.to_string(),
                        });
                    }
                    DuplicatePolicy::Overwrite => {
                        warn!(utterance, source, "Duplicate utterance, keeping last entry");
                    }
                }
            }
        }
        Ok(())
    }

    fn finish(self) -> LabelStream {
        LabelStream {
            alphabet_size: self.max_label as usize + 2,
            labels: self.labels,
        }
    }
}

/// Parse a 1-based label code into its 0-based value.
fn parse_code(token: &str) -> std::result::Result<u32, String> {
    let code: u32 = token
        .parse()
        .map_err(|_| format!("invalid label code '{token}'"))?;
    code.checked_sub(1)
        .ok_or_else(|| "label codes are 1-based, found 0".to_string())
}
