//! Per-execution sandbox handed to task code.
//!
//! An [`ExecutionContext`] is ephemeral: one is created per task invocation
//! from an immutable snapshot of the job taken at creation time. Task code
//! never mutates the live job; all effects flow through the logger and
//! progress side channels or the eventual execution outcome.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

use super::environment::EnvStore;
use super::error::{ExecutionFailure, Result};
use crate::core::{Job, JobProgress};
use crate::storage::{JobStore, LogLevel, LogRecord};

/// Decoded value of one named argument.
#[derive(Debug, Clone)]
enum ArgValue {
    /// The argument name is not present in the payload.
    Missing,
    /// The raw string value from the payload.
    Present(String),
    /// The payload itself could not be decoded; carries the decode error.
    Undecodable(String),
}

/// A named argument looked up from the job payload.
///
/// Typed accessors follow the coercion contract: an absent argument yields
/// `None` without failing; a present value that cannot be parsed as the
/// requested numeric type is a parse-kind failure. Boolean and string
/// access never fail.
#[derive(Debug, Clone)]
pub struct ArgumentValue {
    name: String,
    value: ArgValue,
}

impl ArgumentValue {
    /// The argument name this value was looked up under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True if the argument was present in the payload.
    pub fn is_present(&self) -> bool {
        matches!(self.value, ArgValue::Present(_))
    }

    pub fn as_i32(&self) -> Result<Option<i32>> {
        self.parse_numeric("i32")
    }

    pub fn as_i64(&self) -> Result<Option<i64>> {
        self.parse_numeric("i64")
    }

    pub fn as_f64(&self) -> Result<Option<f64>> {
        self.parse_numeric("f64")
    }

    /// Boolean coercion never fails: a present value that is not `true`
    /// (case-insensitive) reads as `false`.
    pub fn as_bool(&self) -> Option<bool> {
        match &self.value {
            ArgValue::Present(value) => Some(value.eq_ignore_ascii_case("true")),
            _ => None,
        }
    }

    /// Direct passthrough of the stored text.
    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            ArgValue::Present(value) => Some(value),
            _ => None,
        }
    }

    fn parse_numeric<T: std::str::FromStr>(&self, requested: &'static str) -> Result<Option<T>> {
        match &self.value {
            ArgValue::Missing => Ok(None),
            ArgValue::Present(value) => match value.parse::<T>() {
                Ok(parsed) => Ok(Some(parsed)),
                Err(_) => Err(ExecutionFailure::Parse {
                    name: self.name.clone(),
                    requested,
                    value: value.clone(),
                }),
            },
            ArgValue::Undecodable(error) => Err(ExecutionFailure::Parse {
                name: self.name.clone(),
                requested,
                value: format!("<undecodable payload: {}>", error),
            }),
        }
    }
}

/// Job-scoped logger available to task code.
///
/// Messages are persisted to storage as log records bound to the job.
/// Persistence is best-effort: a storage failure is logged locally and
/// never propagates into task execution.
pub struct JobLogger {
    job_id: Uuid,
    store: Arc<dyn JobStore>,
}

impl JobLogger {
    pub async fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message.into()).await;
    }

    pub async fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message.into()).await;
    }

    pub async fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message.into()).await;
    }

    pub async fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message.into()).await;
    }

    async fn log(&self, level: LogLevel, message: String) {
        let record = LogRecord::new(self.job_id, level, message);
        if let Err(error) = self.store.append_log(record).await {
            warn!(job_id = %self.job_id, %error, "failed to persist job log record");
        }
    }
}

/// Progress side channel for a running handler.
///
/// The maximum is fixed when the reporter is created; `set` clamps to it.
/// Updates are persisted best-effort onto the job.
pub struct ProgressReporter {
    job_id: Uuid,
    max: u64,
    current: AtomicU64,
    store: Arc<dyn JobStore>,
}

impl ProgressReporter {
    pub fn max(&self) -> u64 {
        self.max
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    /// Records progress, clamped to the fixed maximum, and persists it.
    pub async fn set(&self, current: u64) {
        let current = current.min(self.max);
        self.current.store(current, Ordering::SeqCst);
        self.persist(current).await;
    }

    /// Increments progress by one.
    pub async fn advance(&self) {
        let previous = self.current.fetch_add(1, Ordering::SeqCst);
        let current = (previous + 1).min(self.max);
        self.current.store(current, Ordering::SeqCst);
        self.persist(current).await;
    }

    async fn persist(&self, current: u64) {
        let progress = JobProgress {
            current,
            max: self.max,
        };
        let result = match self.store.get(self.job_id).await {
            Ok(Some(mut job)) => {
                job.progress = Some(progress);
                self.store.save(&job).await
            }
            Ok(None) => return,
            Err(error) => Err(error),
        };
        if let Err(error) = result {
            warn!(job_id = %self.job_id, %error, "failed to persist job progress");
        }
    }
}

/// The per-invocation sandbox exposing arguments, environment, logger and
/// progress to handler code.
pub struct ExecutionContext {
    job: Job,
    env: HashMap<String, String>,
    store: Arc<dyn JobStore>,
    /// One-shot lazy decode of the argument payload.
    args: OnceLock<std::result::Result<BTreeMap<String, String>, String>>,
    logger: OnceLock<Arc<JobLogger>>,
    progress: OnceLock<Arc<ProgressReporter>>,
    cancel: CancellationToken,
}

impl ExecutionContext {
    /// The immutable job snapshot this context was created from.
    pub fn job(&self) -> &Job {
        &self.job
    }

    /// Looks up a named argument from the decoded payload.
    pub fn argument(&self, name: &str) -> ArgumentValue {
        let decoded = self.args.get_or_init(|| {
            self.job
                .payload
                .decode()
                .map_err(|error| error.to_string())
        });
        let value = match decoded {
            Ok(args) => match args.get(name) {
                Some(value) => ArgValue::Present(value.clone()),
                None => ArgValue::Missing,
            },
            Err(error) => ArgValue::Undecodable(error.clone()),
        };
        ArgumentValue {
            name: name.to_string(),
            value,
        }
    }

    /// Reads an entry from this execution's private environment snapshot.
    pub fn environment(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    /// The job-scoped logger, created lazily on first use.
    pub fn logger(&self) -> Arc<JobLogger> {
        self.logger
            .get_or_init(|| {
                Arc::new(JobLogger {
                    job_id: self.job.id,
                    store: self.store.clone(),
                })
            })
            .clone()
    }

    /// Creates the progress reporter, fixing its maximum.
    ///
    /// The first call wins: later calls return the existing reporter and
    /// their `max` is ignored.
    pub fn progress(&self, max: u64) -> Arc<ProgressReporter> {
        self.progress
            .get_or_init(|| {
                Arc::new(ProgressReporter {
                    job_id: self.job.id,
                    max,
                    current: AtomicU64::new(0),
                    store: self.store.clone(),
                })
            })
            .clone()
    }

    /// Returns the existing progress reporter.
    ///
    /// Fails with a validation failure if [`progress`](Self::progress) was
    /// never called to fix the maximum.
    pub fn progress_reporter(&self) -> Result<Arc<ProgressReporter>> {
        self.progress
            .get()
            .cloned()
            .ok_or(ExecutionFailure::ProgressNotInitialized)
    }

    /// Cooperative cancellation token for this execution.
    ///
    /// Cancelled when the execution times out; long-running handlers should
    /// check it to avoid leaking their worker task.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Builds execution contexts from the shared baseline environment.
pub struct ContextFactory {
    env: Arc<EnvStore>,
    store: Arc<dyn JobStore>,
}

impl ContextFactory {
    pub fn new(env: Arc<EnvStore>, store: Arc<dyn JobStore>) -> Self {
        Self { env, store }
    }

    /// Creates the sandbox for one execution of `job`.
    ///
    /// The job is snapshotted and the environment cloned, so concurrent
    /// executions are fully isolated from each other.
    pub fn create(&self, job: &Job) -> Arc<ExecutionContext> {
        Arc::new(ExecutionContext {
            job: job.clone(),
            env: self.env.snapshot(),
            store: self.store.clone(),
            args: OnceLock::new(),
            logger: OnceLock::new(),
            progress: OnceLock::new(),
            cancel: CancellationToken::new(),
        })
    }
}
