use std::path::PathBuf;

use thiserror::Error;

/// Failure classes of the pipeline. Input-shape and configuration problems
/// abort the operation that hit them; inside a randomized search they fail
/// the single trial instead of the whole search.
#[derive(Debug, Error)]
pub enum VaeError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: expected {expected} columns, found {found}")]
    MalformedRecord {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("line {line}: invalid numeric field {field:?}")]
    InvalidField { line: usize, field: String },

    #[error("shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("non-finite loss at epoch {epoch}, batch {batch}")]
    NonFiniteLoss { epoch: usize, batch: usize },

    #[error("non-finite cross-validation score in fold {fold}")]
    NonFiniteScore { fold: usize },

    #[error("unknown optimizer {0:?}, expected \"adam\" or \"sgd\"")]
    UnknownOptimizer(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("tensor data conversion failed: {0}")]
    Data(String),

    #[error("csv export failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("history serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("model recording failed: {0}")]
    Record(#[from] burn::record::RecorderError),

    #[error("chart rendering failed: {0}")]
    Chart(String),

    #[error("latent projection failed: {0}")]
    Projection(String),
}

pub type Result<T> = std::result::Result<T, VaeError>;
