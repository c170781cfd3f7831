//! The dispatch tick: admission, claim, spawn.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, error};

use super::picker::Picker;
use super::processor::JobProcessor;

/// What one dispatch tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No capacity or no due job; nothing was claimed or spawned.
    Skipped,
    /// A job was claimed and its execution spawned.
    Processed,
}

/// One-tick dispatcher: claim a job if capacity allows and run it in the
/// background.
///
/// Ticks may overlap; concurrency is bounded by the semaphore's permit
/// count, not by the ticking cadence. Without a semaphore every tick that
/// finds a due job spawns.
pub struct JobRunner {
    picker: Picker,
    processor: Arc<JobProcessor>,
    permits: Option<Arc<Semaphore>>,
}

impl JobRunner {
    pub fn new(picker: Picker, processor: Arc<JobProcessor>) -> Self {
        Self {
            picker,
            processor,
            permits: None,
        }
    }

    /// Bounds concurrent executions to `max_concurrency`.
    pub fn with_concurrency(mut self, max_concurrency: usize) -> Self {
        self.permits = Some(Arc::new(Semaphore::new(max_concurrency)));
        self
    }

    /// Runs one dispatch tick.
    ///
    /// Admission comes first: when the pool is exhausted no claim is
    /// attempted, so jobs stay claimable for workers that do have
    /// capacity. The claimed job runs on its own task; the tick returns
    /// without waiting for it.
    pub async fn tick(&self) -> TickOutcome {
        let permit = match &self.permits {
            Some(semaphore) => match Arc::clone(semaphore).try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    debug!("worker pool exhausted, skipping tick");
                    return TickOutcome::Skipped;
                }
            },
            None => None,
        };

        let Some(job) = self.picker.pick().await else {
            return TickOutcome::Skipped;
        };

        let processor = Arc::clone(&self.processor);
        tokio::spawn(async move {
            let id = job.id;
            if let Err(err) = processor.process(job).await {
                error!(job_id = %id, %err, "job processing aborted");
            }
            drop(permit);
        });
        TickOutcome::Processed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Job, JobState, StrategyRegistry, TaskDescriptor, TaskRegistry};
    use crate::executor::breaker::CircuitBreaker;
    use crate::executor::context::{ContextFactory, ExecutionContext};
    use crate::executor::environment::EnvStore;
    use crate::executor::error::BoxError;
    use crate::executor::events::{EventBus, DEFAULT_BUS_CAPACITY};
    use crate::executor::result_processor::JobResultProcessor;
    use crate::executor::task_executor::{DependencyResolver, TaskExecutor, TaskHandler};
    use crate::executor::task_service::TaskService;
    use crate::storage::{InMemoryJobStore, JobStore};
    use async_trait::async_trait;
    use std::time::Duration;

    struct Blocker;

    #[async_trait]
    impl TaskHandler for Blocker {
        async fn run(&self, ctx: Arc<ExecutionContext>) -> Result<(), BoxError> {
            ctx.cancellation().cancelled().await;
            Ok(())
        }
    }

    struct Instant;

    #[async_trait]
    impl TaskHandler for Instant {
        async fn run(&self, _ctx: Arc<ExecutionContext>) -> Result<(), BoxError> {
            Ok(())
        }
    }

    struct Resolver {
        blocking: bool,
    }

    impl DependencyResolver for Resolver {
        fn resolve(&self, _owner: &str) -> Option<Arc<dyn TaskHandler>> {
            if self.blocking {
                Some(Arc::new(Blocker))
            } else {
                Some(Arc::new(Instant))
            }
        }
    }

    fn runner(store: Arc<InMemoryJobStore>, blocking: bool) -> JobRunner {
        let mut registry = TaskRegistry::new();
        registry
            .register(TaskDescriptor::new("work", "worker"))
            .unwrap();

        let store_dyn: Arc<dyn JobStore> = store;
        let bus = Arc::new(EventBus::new(DEFAULT_BUS_CAPACITY));
        let processor = JobProcessor::new(
            Arc::new(registry),
            Arc::new(StrategyRegistry::with_defaults()),
            ContextFactory::new(Arc::new(EnvStore::new()), Arc::clone(&store_dyn)),
            Vec::new(),
            TaskService::new(TaskExecutor::new(Arc::new(Resolver { blocking }))),
            JobResultProcessor::new(Arc::clone(&store_dyn)),
            Arc::clone(&bus),
        );
        let picker = Picker::new(store_dyn, Arc::new(CircuitBreaker::default()), bus);
        JobRunner::new(picker, Arc::new(processor))
    }

    async fn enqueue(store: &Arc<InMemoryJobStore>) {
        let store: Arc<dyn JobStore> = store.clone();
        store
            .insert(Job::builder("work").build().unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_tick_with_nothing_due_skips() {
        let store = Arc::new(InMemoryJobStore::new());
        let runner = runner(store, false);
        assert_eq!(runner.tick().await, TickOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_tick_processes_a_due_job() {
        let store = Arc::new(InMemoryJobStore::new());
        let runner = runner(store.clone(), false);
        enqueue(&store).await;

        assert_eq!(runner.tick().await, TickOutcome::Processed);

        // Completion happens on the spawned task; wait for it to land.
        let store_dyn: Arc<dyn JobStore> = store;
        for _ in 0..50 {
            if store_dyn.count_in_state(JobState::Completed).await.unwrap() == 1 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job never completed");
    }

    #[tokio::test]
    async fn test_exhausted_pool_skips_without_claiming() {
        let store = Arc::new(InMemoryJobStore::new());
        let runner = runner(store.clone(), true).with_concurrency(1);
        enqueue(&store).await;
        enqueue(&store).await;

        assert_eq!(runner.tick().await, TickOutcome::Processed);
        // The blocking handler holds the only permit.
        assert_eq!(runner.tick().await, TickOutcome::Skipped);

        // The second job was never claimed.
        let store_dyn: Arc<dyn JobStore> = store;
        assert_eq!(
            store_dyn.count_in_state(JobState::Scheduled).await.unwrap(),
            1
        );
    }
}
