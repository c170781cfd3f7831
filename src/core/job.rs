//! Job domain model.
//!
//! A [`Job`] is one durable unit of scheduled work bound to a named handler.
//! Jobs move through the [`JobState`] machine: they are created `Scheduled`
//! by the enqueue path, claimed into `Executing` by storage, and resolved by
//! the execution pipeline into `Completed`, `Retryable` or `Failed`.
//! `Discarded` is reached only through explicit cancellation before
//! execution starts.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{CoreError, Result};

/// A job is considered stuck once it has been executing longer than
/// `timeout × STUCK_FACTOR`. This is a signal for external crash-recovery;
/// the dispatch core itself never acts on it.
pub const STUCK_FACTOR: f64 = 1.2;

/// Default retry budget for jobs that do not specify one.
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Default execution timeout for jobs that do not specify one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Finite state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    /// Due immediately, waiting to be claimed.
    Available,
    /// Scheduled for a point in time (possibly the past).
    Scheduled,
    /// Claimed by storage, currently running on a worker.
    Executing,
    /// Failed recoverably, re-scheduled with backoff.
    Retryable,
    /// Finished successfully. Terminal.
    Completed,
    /// Cancelled by the user before execution. Terminal.
    Discarded,
    /// Retries exhausted. Terminal.
    Failed,
}

impl JobState {
    /// Returns the string representation of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Available => "AVAILABLE",
            JobState::Scheduled => "SCHEDULED",
            JobState::Executing => "EXECUTING",
            JobState::Retryable => "RETRYABLE",
            JobState::Completed => "COMPLETED",
            JobState::Discarded => "DISCARDED",
            JobState::Failed => "FAILED",
        }
    }

    /// True for states a job can never leave.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Discarded | JobState::Failed
        )
    }

    /// True for states in which a job may still be claimed by storage.
    pub fn is_claimable(&self) -> bool {
        matches!(
            self,
            JobState::Available | JobState::Scheduled | JobState::Retryable
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for JobState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "AVAILABLE" => Ok(JobState::Available),
            "SCHEDULED" => Ok(JobState::Scheduled),
            "EXECUTING" => Ok(JobState::Executing),
            "RETRYABLE" => Ok(JobState::Retryable),
            "COMPLETED" => Ok(JobState::Completed),
            "DISCARDED" => Ok(JobState::Discarded),
            "FAILED" => Ok(JobState::Failed),
            _ => Err(CoreError::InvalidState(s.to_string())),
        }
    }
}

/// Metadata attached to an encrypted argument payload.
///
/// The engine carries this alongside the payload but never interprets it;
/// encryption and decryption live outside the dispatch core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionMetadata {
    pub salt: String,
    pub iv: String,
    pub version: u32,
}

/// Serialized argument payload of a job.
///
/// Arguments are a JSON object of named string values. Typed interpretation
/// happens lazily in the execution context, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPayload {
    /// JSON-encoded map of argument name to string value.
    pub data: String,
    /// Present when the payload is encrypted at rest.
    pub encryption: Option<EncryptionMetadata>,
}

impl JobPayload {
    /// Builds a payload from named string arguments.
    pub fn from_args(args: &BTreeMap<String, String>) -> serde_json::Result<Self> {
        Ok(Self {
            data: serde_json::to_string(args)?,
            encryption: None,
        })
    }

    /// An empty payload (no arguments).
    pub fn empty() -> Self {
        Self {
            data: "{}".to_string(),
            encryption: None,
        }
    }

    /// Decodes the payload into its named arguments.
    pub fn decode(&self) -> serde_json::Result<BTreeMap<String, String>> {
        serde_json::from_str(&self.data)
    }
}

/// Execution progress reported by a running handler, as `current` out of `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    pub current: u64,
    pub max: u64,
}

/// Captured failure detail persisted on a job.
///
/// `cause_chain` is the error's source chain, innermost cause last, capped
/// by the capture site. Rust errors carry no frame stacks, so the chain is
/// the durable equivalent of a truncated stack trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub message: String,
    pub kind: String,
    pub cause_chain: Vec<String>,
}

/// One durable unit of scheduled work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Storage-assigned identifier. Nil until the job is inserted.
    pub id: Uuid,
    /// Optional caller-assigned identifier, unique across the store.
    pub identifier: Option<String>,
    /// Human-readable job name. Defaults to the handler name.
    pub name: String,
    /// Queue the job belongs to.
    pub queue: String,
    /// Name of the registered handler that executes this job.
    pub handler: String,
    /// Serialized argument payload.
    pub payload: JobPayload,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: DateTime<Utc>,
    pub executing_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub discarded_at: Option<DateTime<Utc>>,
    /// Failures so far. Invariant: `retries <= max_retries` while Retryable.
    pub retries: u32,
    pub max_retries: u32,
    /// Hard execution timeout. `None` inherits the task descriptor's
    /// default at dispatch time.
    pub timeout: Option<Duration>,
    pub tags: BTreeSet<String>,
    pub progress: Option<JobProgress>,
    pub error: Option<FailureRecord>,
}

impl Job {
    /// Starts building a job for the given handler.
    pub fn builder(handler: impl Into<String>) -> JobBuilder {
        JobBuilder::new(handler)
    }

    /// True if the job has been executing longer than `timeout × 1.2`.
    ///
    /// A stuck job signals that its worker likely crashed; recovering it is
    /// the responsibility of storage-side reclamation, not this core.
    pub fn is_stuck(&self, now: DateTime<Utc>) -> bool {
        let Some(executing_at) = self.executing_at else {
            return false;
        };
        if self.state != JobState::Executing {
            return false;
        }
        let limit = self.timeout.unwrap_or(DEFAULT_TIMEOUT).as_secs_f64() * STUCK_FACTOR;
        (now - executing_at).as_seconds_f64() > limit
    }

    /// Cancels the job, moving it to `Discarded`.
    ///
    /// Only allowed while the job is pre-execution (Available, Scheduled or
    /// Retryable). An executing job cannot be cancelled: there is no
    /// mechanism to stop an in-flight execution. Note that unlike automatic
    /// retry exhaustion, manual discard does not set `failed_at`.
    pub fn discard(&mut self, now: DateTime<Utc>) -> Result<()> {
        if !self.state.is_claimable() {
            return Err(CoreError::IllegalTransition {
                id: self.id,
                from: self.state,
                to: JobState::Discarded,
            });
        }
        self.state = JobState::Discarded;
        self.discarded_at = Some(now);
        Ok(())
    }
}

/// Builder for enqueuing new jobs.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use jobforge::core::Job;
///
/// let job = Job::builder("send-welcome-email")
///     .queue("mail")
///     .arg("user_id", "42")
///     .tag("onboarding")
///     .timeout(Duration::from_secs(30))
///     .max_retries(3)
///     .build()
///     .unwrap();
/// assert_eq!(job.state, jobforge::core::JobState::Scheduled);
/// ```
#[derive(Debug, Clone)]
pub struct JobBuilder {
    handler: String,
    name: Option<String>,
    queue: String,
    identifier: Option<String>,
    args: BTreeMap<String, String>,
    tags: BTreeSet<String>,
    timeout: Option<Duration>,
    max_retries: u32,
    schedule_in: Option<Duration>,
}

impl JobBuilder {
    fn new(handler: impl Into<String>) -> Self {
        Self {
            handler: handler.into(),
            name: None,
            queue: "default".to_string(),
            identifier: None,
            args: BTreeMap::new(),
            tags: BTreeSet::new(),
            timeout: None,
            max_retries: DEFAULT_MAX_RETRIES,
            schedule_in: None,
        }
    }

    /// Sets a human-readable name. Defaults to the handler name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the queue. Defaults to `"default"`.
    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    /// Sets a caller-assigned identifier, unique across the store.
    pub fn identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// Adds a named string argument to the payload.
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }

    /// Adds a tag.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Sets an explicit execution timeout. Jobs without one inherit their
    /// task descriptor's default, whatever its value.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the retry budget.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Delays the first execution by the given interval.
    pub fn schedule_in(mut self, delay: Duration) -> Self {
        self.schedule_in = Some(delay);
        self
    }

    /// Builds the job in `Scheduled` state.
    ///
    /// The id stays nil until the job is inserted into a store.
    pub fn build(self) -> Result<Job> {
        if self.handler.is_empty() {
            return Err(CoreError::MissingField("handler"));
        }
        let payload = JobPayload::from_args(&self.args)
            .map_err(|e| CoreError::Validation(format!("unencodable arguments: {}", e)))?;
        let now = Utc::now();
        let scheduled_at = match self.schedule_in {
            Some(delay) => now + chrono::Duration::from_std(delay).unwrap_or_default(),
            None => now,
        };
        Ok(Job {
            id: Uuid::nil(),
            identifier: self.identifier,
            name: self.name.unwrap_or_else(|| self.handler.clone()),
            queue: self.queue,
            handler: self.handler,
            payload,
            state: JobState::Scheduled,
            created_at: now,
            scheduled_at,
            executing_at: None,
            completed_at: None,
            failed_at: None,
            discarded_at: None,
            retries: 0,
            max_retries: self.max_retries,
            timeout: self.timeout,
            tags: self.tags,
            progress: None,
            error: None,
        })
    }
}
