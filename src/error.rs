use std::io;
use std::path::PathBuf;

use rayon::ThreadPoolBuildError;
use tokio::task::JoinError;

/// Failures while discovering, reading or writing checkpoint files.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// The file was listed by a directory scan but is gone by the time it is read.
    #[error("checkpoint {} vanished before it could be read", path.display())]
    Missing { path: PathBuf },
    #[error(
        "checkpoint {} is corrupt: token #{position} {token:?} is not an integer",
        path.display()
    )]
    Corrupt {
        path: PathBuf,
        position: usize,
        token: String,
    },
    #[error("checkpoint I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl CheckpointError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        CheckpointError::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("batch size must be positive")]
    ZeroBatchSize,
    #[error("range start {start} is past its end {end}")]
    InvertedRange { start: u64, end: u64 },
}

/// Raised by a payload for a single index.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("index {index} is outside the domain of {payload}")]
    OutOfDomain { index: u64, payload: &'static str },
    #[error("{0}")]
    Failed(String),
}

/// Why a batch produced no usable values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BatchError {
    #[error("payload failed at index {index}: {source}")]
    Payload {
        index: u64,
        #[source]
        source: PayloadError,
    },
    #[error("payload panicked at index {index}: {message}")]
    Panicked { index: u64, message: String },
    #[error("batch starting at {start} returned {got} values, expected {expected}")]
    LengthMismatch {
        start: u64,
        got: usize,
        expected: u64,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error("failed to build worker pool: {0}")]
    PoolBuild(#[from] ThreadPoolBuildError),
    #[error("Tokio Join error: {0:?}")]
    TokioJoin(#[from] JoinError),
    #[error("invalid configuration: {0}")]
    Config(String),
}
