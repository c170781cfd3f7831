use thiserror::Error;
use uuid::Uuid;

/// Storage layer error type for the jobforge engine.
///
/// Persistence failures are always surfaced as typed results; the pipeline
/// never swallows a failed save into an absent value.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// The requested job was not found in storage.
    #[error("job not found: id={0}")]
    JobNotFound(Uuid),

    /// A caller-assigned identifier is already taken by another job.
    #[error("duplicate job identifier: '{0}'")]
    DuplicateIdentifier(String),

    /// The backend is unreachable or refused the operation.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Encoding or decoding stored data failed.
    #[error("serialization failed")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;
