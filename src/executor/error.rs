use thiserror::Error;

use crate::core::FailureRecord;

/// A boxed error that can be sent across threads.
///
/// This is the standard error type used throughout async Rust ecosystems;
/// handler code returns it so any error implementing `std::error::Error`
/// flows into the pipeline unchanged.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Cause chains captured into a [`FailureRecord`] are cut off here.
pub const MAX_CAUSE_CHAIN: usize = 100;

/// Execution failure: the tagged outcome of a task that did not succeed.
///
/// Failures are captured into `job.error` and drive the Retryable/Failed
/// transition. They never escape the task service as thrown values and
/// never crash the dispatch tick.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum ExecutionFailure {
    /// The handler ran past its hard timeout.
    #[error("task execution timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    /// The dependency resolver yielded no instance for the handler's owner.
    #[error("dependency resolution failed for task '{task}': no instance of '{owner}'")]
    Resolution { task: String, owner: String },

    /// No task is registered under the job's handler name.
    #[error("no task registered under handler '{0}'")]
    UnknownHandler(String),

    /// An argument value could not be parsed as the requested type.
    #[error("argument '{name}' is not a valid {requested}: '{value}'")]
    Parse {
        name: String,
        requested: &'static str,
        value: String,
    },

    /// The handler panicked.
    #[error("task panicked: {0}")]
    Panic(String),

    /// The handler returned an error.
    #[error("task failed: {message}")]
    Handler {
        message: String,
        cause_chain: Vec<String>,
    },

    /// `progress()` was called before `progress(max)` fixed the maximum.
    #[error("progress reporter not initialized; call progress(max) first")]
    ProgressNotInitialized,
}

impl ExecutionFailure {
    /// Stable name of the failure kind, persisted on the job.
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionFailure::Timeout { .. } => "timeout",
            ExecutionFailure::Resolution { .. } => "resolution",
            ExecutionFailure::UnknownHandler(_) => "unknown-handler",
            ExecutionFailure::Parse { .. } => "parse",
            ExecutionFailure::Panic(_) => "panic",
            ExecutionFailure::Handler { .. } => "handler",
            ExecutionFailure::ProgressNotInitialized => "validation",
        }
    }

    /// Normalizes a handler error into an execution failure.
    ///
    /// An error that already is an `ExecutionFailure` propagates verbatim,
    /// preserving its message and kind. Anything else is wrapped as a
    /// handler failure with its source chain captured, innermost cause
    /// last, capped at [`MAX_CAUSE_CHAIN`] entries.
    pub fn from_handler_error(error: BoxError) -> Self {
        match error.downcast::<ExecutionFailure>() {
            Ok(failure) => *failure,
            Err(error) => {
                let message = error.to_string();
                let mut cause_chain = Vec::new();
                let mut source = error.source();
                while let Some(cause) = source {
                    if cause_chain.len() >= MAX_CAUSE_CHAIN {
                        break;
                    }
                    cause_chain.push(cause.to_string());
                    source = cause.source();
                }
                ExecutionFailure::Handler {
                    message,
                    cause_chain,
                }
            }
        }
    }

    /// Captures this failure into the record persisted on a job.
    pub fn to_record(&self) -> FailureRecord {
        let cause_chain = match self {
            ExecutionFailure::Handler { cause_chain, .. } => {
                cause_chain.iter().take(MAX_CAUSE_CHAIN).cloned().collect()
            }
            _ => Vec::new(),
        };
        FailureRecord {
            message: self.to_string(),
            kind: self.kind().to_string(),
            cause_chain,
        }
    }
}

pub type Result<T> = std::result::Result<T, ExecutionFailure>;
