//! In-memory job store using DashMap for concurrent access.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{JobStore, LogRecord, Result, StorageError};
use crate::core::{Job, JobState};

/// In-memory job store backed by DashMap.
///
/// DashMap provides concurrent access through sharding, so reads and saves
/// never contend on a single lock. Claiming is the exception: a claim scans
/// for the earliest due job and flips it to Executing, and those two steps
/// must be atomic with respect to other claimers, so claims are serialized
/// through a dedicated mutex.
///
/// Suitable for tests and single-process development. Nothing survives a
/// restart, so this is not a durable backend.
pub struct InMemoryJobStore {
    jobs: DashMap<Uuid, Job>,
    /// Caller-assigned identifier to job id index, for uniqueness checks.
    identifiers: DashMap<String, Uuid>,
    logs: DashMap<Uuid, Vec<LogRecord>>,
    /// Serializes claim scans so a job is claimed at most once.
    claim_lock: Mutex<()>,
}

impl InMemoryJobStore {
    /// Creates an empty in-memory store.
    pub fn new() -> Self {
        Self {
            jobs: DashMap::new(),
            identifiers: DashMap::new(),
            logs: DashMap::new(),
            claim_lock: Mutex::new(()),
        }
    }

    /// Returns the total number of stored jobs.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Returns true if the store holds no jobs.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, mut job: Job) -> Result<Uuid> {
        if let Some(identifier) = &job.identifier {
            if self.identifiers.contains_key(identifier) {
                return Err(StorageError::DuplicateIdentifier(identifier.clone()));
            }
        }
        if job.id.is_nil() {
            job.id = Uuid::new_v4();
        }
        let id = job.id;
        if let Some(identifier) = &job.identifier {
            self.identifiers.insert(identifier.clone(), id);
        }
        self.jobs.insert(id, job);
        Ok(id)
    }

    async fn claim_due_job(&self) -> Result<Option<Job>> {
        let _guard = self.claim_lock.lock().await;
        let now = Utc::now();

        let due = self
            .jobs
            .iter()
            .filter(|entry| entry.value().state.is_claimable())
            .filter(|entry| entry.value().scheduled_at <= now)
            .min_by_key(|entry| entry.value().scheduled_at)
            .map(|entry| *entry.key());

        let Some(id) = due else {
            return Ok(None);
        };

        // The claim lock is held, so nobody else can have flipped it.
        let Some(mut entry) = self.jobs.get_mut(&id) else {
            return Ok(None);
        };
        entry.state = JobState::Executing;
        entry.executing_at = Some(now);
        Ok(Some(entry.clone()))
    }

    async fn save(&self, job: &Job) -> Result<()> {
        if job.id.is_nil() {
            return Err(StorageError::JobNotFound(job.id));
        }
        self.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>> {
        Ok(self.jobs.get(&id).map(|entry| entry.value().clone()))
    }

    async fn get_by_identifier(&self, identifier: &str) -> Result<Option<Job>> {
        let Some(id) = self.identifiers.get(identifier).map(|entry| *entry.value()) else {
            return Ok(None);
        };
        self.get(id).await
    }

    async fn jobs_in_state(&self, state: JobState) -> Result<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .jobs
            .iter()
            .filter(|entry| entry.value().state == state)
            .map(|entry| entry.value().clone())
            .collect();
        jobs.sort_by_key(|job| job.scheduled_at);
        Ok(jobs)
    }

    async fn count_in_state(&self, state: JobState) -> Result<usize> {
        Ok(self
            .jobs
            .iter()
            .filter(|entry| entry.value().state == state)
            .count())
    }

    async fn append_log(&self, record: LogRecord) -> Result<()> {
        self.logs.entry(record.job_id).or_default().push(record);
        Ok(())
    }

    async fn logs(&self, job_id: Uuid) -> Result<Vec<LogRecord>> {
        Ok(self
            .logs
            .get(&job_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LogLevel;
    use std::time::Duration;

    #[tokio::test]
    async fn test_insert_assigns_id() {
        let store = InMemoryJobStore::new();
        let job = Job::builder("h").build().unwrap();
        let id = store.insert(job).await.unwrap();
        assert!(!id.is_nil());
        assert_eq!(store.get(id).await.unwrap().unwrap().id, id);
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_identifier() {
        let store = InMemoryJobStore::new();
        let first = Job::builder("h").identifier("unique-1").build().unwrap();
        store.insert(first).await.unwrap();

        let second = Job::builder("h").identifier("unique-1").build().unwrap();
        let err = store.insert(second).await.unwrap_err();
        assert!(matches!(err, StorageError::DuplicateIdentifier(_)));
    }

    #[tokio::test]
    async fn test_get_by_identifier() {
        let store = InMemoryJobStore::new();
        let job = Job::builder("h").identifier("lookup-me").build().unwrap();
        let id = store.insert(job).await.unwrap();
        let found = store.get_by_identifier("lookup-me").await.unwrap().unwrap();
        assert_eq!(found.id, id);
        assert!(store.get_by_identifier("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_moves_job_to_executing() {
        let store = InMemoryJobStore::new();
        let id = store
            .insert(Job::builder("h").build().unwrap())
            .await
            .unwrap();

        let claimed = store.claim_due_job().await.unwrap().unwrap();
        assert_eq!(claimed.id, id);
        assert_eq!(claimed.state, JobState::Executing);
        assert!(claimed.executing_at.is_some());

        // The stored copy was updated too, and a second claim finds nothing.
        let stored = store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.state, JobState::Executing);
        assert!(store.claim_due_job().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_skips_future_scheduled_jobs() {
        let store = InMemoryJobStore::new();
        store
            .insert(
                Job::builder("h")
                    .schedule_in(Duration::from_secs(3600))
                    .build()
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(store.claim_due_job().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_prefers_earliest_scheduled() {
        let store = InMemoryJobStore::new();
        let mut early = Job::builder("early").build().unwrap();
        early.scheduled_at = Utc::now() - chrono::Duration::seconds(60);
        let early_id = store.insert(early).await.unwrap();
        store
            .insert(Job::builder("late").build().unwrap())
            .await
            .unwrap();

        let claimed = store.claim_due_job().await.unwrap().unwrap();
        assert_eq!(claimed.id, early_id);
    }

    #[tokio::test]
    async fn test_state_counts() {
        let store = InMemoryJobStore::new();
        store
            .insert(Job::builder("a").build().unwrap())
            .await
            .unwrap();
        store
            .insert(Job::builder("b").build().unwrap())
            .await
            .unwrap();
        assert_eq!(store.count_in_state(JobState::Scheduled).await.unwrap(), 2);
        assert_eq!(store.count_in_state(JobState::Executing).await.unwrap(), 0);
        assert_eq!(
            store.jobs_in_state(JobState::Scheduled).await.unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn test_job_logs_append_in_order() {
        let store = InMemoryJobStore::new();
        let id = Uuid::new_v4();
        store
            .append_log(LogRecord::new(id, LogLevel::Info, "first"))
            .await
            .unwrap();
        store
            .append_log(LogRecord::new(id, LogLevel::Warn, "second"))
            .await
            .unwrap();

        let logs = store.logs(id).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].message, "first");
        assert_eq!(logs[1].message, "second");
    }
}
