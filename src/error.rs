//! Error types for ctctrain.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrainError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    // Data loading errors
    #[error("Required file not found: {path}")]
    MissingFile { path: String },

    #[error("Malformed line {line} in {path}: {message}")]
    ManifestParse {
        path: String,
        line: usize,
        message: String,
    },

    #[error("Frame length {frames} of utterance {utterance} is out of range")]
    FrameLength { utterance: String, frames: usize },

    #[error("Utterance {utterance} appears more than once in {path}")]
    DuplicateUtterance { path: String, utterance: String },

    #[error("Inconsistent data sets: {message}")]
    Consistency { message: String },

    // Training engine errors
    #[error("Training engine failed: {message}")]
    Engine { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TrainError>;

impl TrainError {
    pub(crate) fn invalid(key: &str, message: impl Into<String>) -> Self {
        TrainError::ConfigInvalidValue {
            key: key.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn consistency(message: impl Into<String>) -> Self {
        TrainError::Consistency {
            message: message.into(),
        }
    }
}
