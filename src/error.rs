//src/error.rs

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures that end a whole stage (converter, strain or species pass).
#[derive(Debug, Error)]
pub enum PivotError {
    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed reference table row {line}: {detail}")]
    ReferenceTable { line: usize, detail: String },

    #[error("reference table contains no entries")]
    EmptyReferenceTable,

    #[error("could not build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl PivotError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        PivotError::Io { path: path.into(), source }
    }
}

pub type Result<T> = std::result::Result<T, PivotError>;

/// Why a single input line could not be turned into a record.
/// These never abort a pass; the line is counted as rejected.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RecordError {
    #[error("missing field {index}")]
    MissingField { index: usize },

    #[error("field {index} is not a number: '{value}'")]
    InvalidNumber { index: usize, value: String },

    #[error("identity denominator is zero (no M, I or S bases)")]
    ZeroIdentityDenominator,

    #[error("line is not valid UTF-8")]
    InvalidUtf8,
}
