//! Error taxonomy for the log engine.
//!
//! `commitWithRetry` is the only place that recovers from a specific
//! variant (`ConcurrentModification`); everything else propagates with `?`.

use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum DeltaLogError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt log: {reason}")]
    CorruptLog { reason: String },

    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("invalid state: {reason}")]
    InvalidState { reason: String },

    #[error("concurrent modification: {cause}")]
    ConcurrentModification { cause: String },
}

pub type Result<T> = std::result::Result<T, DeltaLogError>;

impl From<storage::StorageError> for DeltaLogError {
    fn from(err: storage::StorageError) -> Self {
        match err {
            storage::StorageError::Io { path, source } => {
                DeltaLogError::Io(std::io::Error::new(
                    source.kind(),
                    format!("{source} (path: {})", path.display()),
                ))
            }
            storage::StorageError::AlreadyExists(path) => DeltaLogError::InvalidState {
                reason: format!("version already committed at {}", path.display()),
            },
        }
    }
}

impl From<serde_json::Error> for DeltaLogError {
    fn from(err: serde_json::Error) -> Self {
        DeltaLogError::CorruptLog {
            reason: err.to_string(),
        }
    }
}

impl From<bincode::Error> for DeltaLogError {
    fn from(err: bincode::Error) -> Self {
        DeltaLogError::CorruptLog {
            reason: format!("checkpoint encoding error: {err}"),
        }
    }
}

/// A conflict surfaced by [`DeltaLogError::ConcurrentModification`], kept
/// around separately so `commitWithRetry` can chain it as the `source` of
/// the `IoError` it raises after exhausting retries.
#[derive(Debug)]
pub struct ConflictCause(pub String);

impl fmt::Display for ConflictCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ConflictCause {}
