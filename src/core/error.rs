use thiserror::Error;
use uuid::Uuid;

use crate::core::job::JobState;

/// Core error type for the jobforge engine.
///
/// Validation failures surface immediately to the caller of the triggering
/// operation and never mutate job state.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoreError {
    /// A state transition was requested that the job state machine forbids.
    #[error("illegal state transition: job {id} cannot move from {from} to {to}")]
    IllegalTransition {
        id: Uuid,
        from: JobState,
        to: JobState,
    },

    /// A name was registered twice in a name-keyed registry.
    #[error("duplicate registration: {kind} '{name}' is already registered")]
    DuplicateRegistration { kind: &'static str, name: String },

    /// A required field was missing or empty when building a job.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// An invalid state string was encountered during parsing.
    #[error("invalid job state: {0}")]
    InvalidState(String),

    /// A general validation failure.
    #[error("validation failed: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
