//! Outcome-to-state resolution.
//!
//! [`JobResultProcessor`] interprets a task outcome into the job's next
//! state and persists it. Persistence failures surface as typed storage
//! results; they are never swallowed into an absent value.

use chrono::Utc;

use super::error::ExecutionFailure;
use crate::core::{Job, JobState, RetryStrategy};
use crate::storage::{JobStore, Result};
use std::sync::Arc;

/// Decides whether another retry fits in the budget.
pub struct JobRetryer;

impl JobRetryer {
    /// True iff `retries < max_retries`.
    ///
    /// Equality means exhausted: the transition that set
    /// `retries == max_retries` was the last one allowed back into
    /// Retryable, so the next failure must terminate.
    pub fn is_retryable(retries: u32, max_retries: u32) -> bool {
        retries < max_retries
    }
}

/// Persists the state transition a task outcome implies.
pub struct JobResultProcessor {
    store: Arc<dyn JobStore>,
}

impl JobResultProcessor {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Resolves a successful execution: the job becomes Completed.
    ///
    /// Idempotent: re-invoking on an already-completed job produces the
    /// same terminal fields (a fresh `completed_at`, everything else
    /// cleared).
    pub async fn handle_successful(&self, job: &mut Job) -> Result<()> {
        job.completed_at = Some(Utc::now());
        job.state = JobState::Completed;
        job.failed_at = None;
        job.discarded_at = None;
        job.error = None;
        self.store.save(job).await
    }

    /// Resolves a failed execution into Retryable or Failed.
    ///
    /// While the retry budget holds, the job is re-scheduled after the
    /// strategy's backoff and its retry counter advances. Once exhausted
    /// the job lands in Failed with both `failed_at` and `discarded_at`
    /// set; downstream consumers key on both timestamps, so the pair is
    /// kept even though the terminal state is Failed, not Discarded.
    pub async fn handle_failed(
        &self,
        job: &mut Job,
        failure: &ExecutionFailure,
        strategy: &dyn RetryStrategy,
    ) -> Result<()> {
        let now = Utc::now();
        if JobRetryer::is_retryable(job.retries, job.max_retries) {
            let delay = strategy.delay(job.retries);
            job.scheduled_at = now + chrono::Duration::from_std(delay).unwrap_or_default();
            job.failed_at = Some(now);
            job.state = JobState::Retryable;
            job.retries += 1;
            job.executing_at = None;
        } else {
            job.failed_at = Some(now);
            job.discarded_at = Some(now);
            job.executing_at = None;
            job.state = JobState::Failed;
        }
        job.error = Some(failure.to_record());
        self.store.save(job).await
    }

    /// Terminates a job that can never execute: no handler is registered
    /// under its name, so retrying cannot help. The job fails immediately
    /// regardless of its remaining retry budget.
    pub async fn handle_unresolvable(
        &self,
        job: &mut Job,
        failure: &ExecutionFailure,
    ) -> Result<()> {
        let now = Utc::now();
        job.failed_at = Some(now);
        job.discarded_at = Some(now);
        job.executing_at = None;
        job.state = JobState::Failed;
        job.error = Some(failure.to_record());
        self.store.save(job).await
    }
}
