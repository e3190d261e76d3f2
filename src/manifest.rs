//! Feature manifest reader.
//!
//! A manifest lists one utterance per line:
//!
//! ```text
//! <utterance_id> <locator> <byte_offset> <frame_length> <feature_dim>
//! ```
//!
//! The locator is opaque here (usually an archive path); only the training
//! engine opens it.

use crate::error::{Result, TrainError};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

const MAX_COUNT: u64 = u32::MAX as u64;

/// One parsed manifest line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub id: String,
    pub locator: String,
    pub offset: u64,
    pub frame_length: usize,
    pub feature_dim: usize,
}

/// Read a manifest from disk, keeping at most `limit` entries.
pub fn read_manifest(path: &Path, limit: Option<usize>) -> Result<Vec<ManifestEntry>> {
    if !path.is_file() {
        return Err(TrainError::MissingFile {
            path: path.display().to_string(),
        });
    }
    let file = File::open(path)?;
    parse_manifest(BufReader::new(file), &path.display().to_string(), limit)
}

/// Parse manifest lines from any reader.
///
/// `source` only labels error messages. Blank lines are skipped and do not
/// count toward `limit`.
pub fn parse_manifest<R: BufRead>(
    reader: R,
    source: &str,
    limit: Option<usize>,
) -> Result<Vec<ManifestEntry>> {
    let mut entries = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        if limit.is_some_and(|max| entries.len() >= max) {
            break;
        }
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        entries.push(parse_line(&line, source, idx + 1)?);
    }

    Ok(entries)
}

fn parse_line(line: &str, source: &str, line_no: usize) -> Result<ManifestEntry> {
    let malformed = |message: String| TrainError::ManifestParse {
        path: source.to_string(),
        line: line_no,
        message,
    };

    let tokens: Vec<&str> = line.split_whitespace().collect();
    let [id, locator, offset, frame_length, feature_dim] = tokens[..] else {
        return Err(malformed(format!(
            "expected 5 fields (id, locator, offset, frames, dim), found {}",
            tokens.len()
        )));
    };

    let number = |field: &str, value: &str| -> Result<u64> {
        value
            .parse::<u64>()
            .map_err(|_| malformed(format!("invalid {field} '{value}'")))
    };

    // Lengths and dimensions must survive subsampling and stacking arithmetic.
    let count = |field: &str, value: &str| -> Result<usize> {
        let n = number(field, value)?;
        if n > MAX_COUNT {
            return Err(malformed(format!("{field} {n} exceeds {MAX_COUNT}")));
        }
        usize::try_from(n).map_err(|_| malformed(format!("{field} {n} does not fit in memory")))
    };

    let feature_dim = count("feature dimension", feature_dim)?;
    if feature_dim == 0 {
        return Err(malformed("feature dimension must be positive".to_string()));
    }

    Ok(ManifestEntry {
        id: id.to_string(),
        locator: locator.to_string(),
        offset: number("offset", offset)?,
        frame_length: count("frame length", frame_length)?,
        feature_dim,
    })
}
