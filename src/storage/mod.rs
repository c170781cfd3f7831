//! Storage layer for the jobforge engine.
//!
//! This module provides a trait-based interface for durable job storage.
//! The dispatch core consumes [`JobStore`] and never assumes a particular
//! backend; [`InMemoryJobStore`] is the bundled implementation for tests
//! and development.
//!
//! # Example
//!
//! ```
//! use jobforge::core::Job;
//! use jobforge::storage::{InMemoryJobStore, JobStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = InMemoryJobStore::new();
//! let job = Job::builder("send-email").build()?;
//! let id = store.insert(job).await?;
//! assert!(store.get(id).await?.is_some());
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{Job, JobState};

mod error;
pub mod memory;

pub use error::{Result, StorageError};
pub use memory::InMemoryJobStore;

/// Severity of a job-scoped log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// A log record emitted by task code, persisted alongside its job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub job_id: Uuid,
    pub at: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

impl LogRecord {
    pub fn new(job_id: Uuid, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            job_id,
            at: Utc::now(),
            level,
            message: message.into(),
        }
    }
}

/// Trait for durable job storage backends.
///
/// Implementations must be thread-safe. The one hard contract is
/// [`claim_due_job`](JobStore::claim_due_job): a given job must be handed
/// out at most once, no matter how many claims race; the dispatch core
/// does not add its own mutual exclusion over job ids.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Inserts a new job, assigning its storage id.
    ///
    /// Rejects a caller-assigned `identifier` that is already taken.
    async fn insert(&self, job: Job) -> Result<Uuid>;

    /// Atomically claims at most one due job.
    ///
    /// A job is due when its state is claimable (Available, Scheduled or
    /// Retryable) and `scheduled_at` is not in the future. The claimed job
    /// is moved to Executing with `executing_at` set before it is returned.
    async fn claim_due_job(&self) -> Result<Option<Job>>;

    /// Persists the current state of a job.
    async fn save(&self, job: &Job) -> Result<()>;

    /// Looks up a job by storage id.
    async fn get(&self, id: Uuid) -> Result<Option<Job>>;

    /// Looks up a job by its caller-assigned identifier.
    async fn get_by_identifier(&self, identifier: &str) -> Result<Option<Job>>;

    /// Lists jobs currently in the given state, for administrative use.
    async fn jobs_in_state(&self, state: JobState) -> Result<Vec<Job>>;

    /// Counts jobs currently in the given state.
    async fn count_in_state(&self, state: JobState) -> Result<usize>;

    /// Appends a job-scoped log record.
    async fn append_log(&self, record: LogRecord) -> Result<()>;

    /// Returns the log records of a job, oldest first.
    async fn logs(&self, job_id: Uuid) -> Result<Vec<LogRecord>>;
}
