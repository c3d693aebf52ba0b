use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Startup configuration problems. These are the only errors that abort a run
/// before any data is touched.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unsupported sentiment mode '{0}' (expected 'rule' or 'ml')")]
    UnsupportedSentimentMode(String),
    #[error("unsupported review language '{0}' (expected 'dutch' or 'english')")]
    UnsupportedLanguage(String),
    #[error("test size must be strictly between 0 and 1, got {0}")]
    InvalidTestSize(f64),
    #[error("llm timeout must be at least one second")]
    ZeroTimeout,
    #[error("invalid complaint pattern for '{category}': {reason}")]
    InvalidPattern { category: String, reason: String },
}

/// Failures reading the review file itself.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("review file '{}' not found", .0.display())]
    NotFound(PathBuf),
    #[error("review file '{path}' could not be parsed: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Reasons the supervised sentiment model cannot be trained on a dataset.
#[derive(Debug, Error, PartialEq)]
pub enum MlError {
    #[error("need at least two sentiment classes to train, found {0}")]
    TooFewClasses(usize),
    #[error("class '{label}' has only {count} example(s); at least 2 are required")]
    ClassTooSmall { label: String, count: usize },
    #[error("texts and labels differ in length ({texts} vs {labels})")]
    LengthMismatch { texts: usize, labels: usize },
}
