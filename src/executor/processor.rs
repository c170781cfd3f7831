//! Per-job orchestration: lookup, context, middleware, execution,
//! resolution, events.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use super::context::{ContextFactory, ExecutionContext};
use super::error::{BoxError, ExecutionFailure};
use super::events::{EventBus, JobEvent};
use super::result_processor::JobResultProcessor;
use super::task_service::{TaskService, TaskState};
use crate::core::{ConstantBackoff, Job, RetryStrategy, StrategyRegistry, TaskRegistry};
use crate::storage::StorageError;

/// Hook that runs before a job's handler starts.
///
/// Middleware errors abort the execution and propagate out of
/// [`JobProcessor::process`]; the job stays Executing for the stuck-job
/// sweep to reclaim, matching an in-flight crash.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn before_execute(
        &self,
        job: &Job,
        ctx: &ExecutionContext,
    ) -> std::result::Result<(), BoxError>;
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProcessError {
    #[error("middleware rejected job {id}: {source}")]
    Middleware {
        id: Uuid,
        #[source]
        source: BoxError,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, ProcessError>;

/// Drives one claimed job from Executing to a resolved state.
pub struct JobProcessor {
    registry: Arc<TaskRegistry>,
    strategies: Arc<StrategyRegistry>,
    factory: ContextFactory,
    middleware: Vec<Arc<dyn Middleware>>,
    service: TaskService,
    results: JobResultProcessor,
    bus: Arc<EventBus>,
}

impl JobProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<TaskRegistry>,
        strategies: Arc<StrategyRegistry>,
        factory: ContextFactory,
        middleware: Vec<Arc<dyn Middleware>>,
        service: TaskService,
        results: JobResultProcessor,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            registry,
            strategies,
            factory,
            middleware,
            service,
            results,
            bus,
        }
    }

    /// Executes a claimed job and persists its resolution.
    ///
    /// A job whose handler name has no registered descriptor fails
    /// terminally: no retry budget can make an unregistered handler
    /// appear, and leaving it Executing would strand it until the stuck
    /// sweep. Storage and middleware errors propagate.
    pub async fn process(&self, mut job: Job) -> Result<()> {
        let Some(descriptor) = self.registry.lookup(&job.handler) else {
            let failure = ExecutionFailure::UnknownHandler(job.handler.clone());
            warn!(job_id = %job.id, handler = %job.handler, "no task registered for handler");
            self.bus.publish(JobEvent::Exception {
                job: job.clone(),
                message: failure.to_string(),
            });
            self.results.handle_unresolvable(&mut job, &failure).await?;
            self.bus.publish(JobEvent::Failed { job });
            return Ok(());
        };

        let ctx = self.factory.create(&job);
        for mw in &self.middleware {
            mw.before_execute(&job, &ctx)
                .await
                .map_err(|source| ProcessError::Middleware { id: job.id, source })?;
        }

        let timeout = effective_timeout(&job, descriptor.timeout);
        let bus = Arc::clone(&self.bus);
        let event_job = job.clone();
        let terminal = self
            .service
            .execute(&descriptor, timeout, ctx, |state| {
                if matches!(state, TaskState::Executing) {
                    bus.publish(JobEvent::Executing {
                        job: event_job.clone(),
                    });
                }
            })
            .await;

        match terminal {
            TaskState::Successful => {
                self.results.handle_successful(&mut job).await?;
                debug!(job_id = %job.id, "job completed");
                self.bus.publish(JobEvent::Completed { job });
            }
            TaskState::Failed(failure) => {
                let strategy = self.strategy_for(&descriptor.retry_strategy);
                self.results
                    .handle_failed(&mut job, &failure, strategy.as_ref())
                    .await?;
                debug!(job_id = %job.id, state = %job.state, kind = failure.kind(), "job failed");
                self.bus.publish(JobEvent::Exception {
                    job: job.clone(),
                    message: failure.to_string(),
                });
                self.bus.publish(JobEvent::Failed { job });
            }
            TaskState::Executing => unreachable!("task service returns terminal states only"),
        }
        Ok(())
    }

    fn strategy_for(&self, name: &str) -> Arc<dyn RetryStrategy> {
        self.strategies.get(name).unwrap_or_else(|| {
            warn!(strategy = name, "unknown retry strategy, using constant backoff");
            Arc::new(ConstantBackoff::default())
        })
    }
}

/// A job that carries no bespoke timeout inherits the descriptor's.
fn effective_timeout(job: &Job, descriptor_timeout: Duration) -> Duration {
    job.timeout.unwrap_or(descriptor_timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{JobState, TaskDescriptor};
    use crate::executor::environment::EnvStore;
    use crate::executor::events::DEFAULT_BUS_CAPACITY;
    use crate::executor::task_executor::{DependencyResolver, TaskExecutor, TaskHandler};
    use crate::storage::{InMemoryJobStore, JobStore};
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct OkHandler;

    #[async_trait]
    impl TaskHandler for OkHandler {
        async fn run(&self, _ctx: Arc<ExecutionContext>) -> std::result::Result<(), BoxError> {
            Ok(())
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl TaskHandler for FailingHandler {
        async fn run(&self, _ctx: Arc<ExecutionContext>) -> std::result::Result<(), BoxError> {
            Err("deliberate failure".into())
        }
    }

    struct MapResolver {
        ok: Arc<dyn TaskHandler>,
        failing: Arc<dyn TaskHandler>,
    }

    impl DependencyResolver for MapResolver {
        fn resolve(&self, owner: &str) -> Option<Arc<dyn TaskHandler>> {
            match owner {
                "ok" => Some(Arc::clone(&self.ok)),
                "failing" => Some(Arc::clone(&self.failing)),
                _ => None,
            }
        }
    }

    struct CountingMiddleware {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Middleware for CountingMiddleware {
        async fn before_execute(
            &self,
            _job: &Job,
            _ctx: &ExecutionContext,
        ) -> std::result::Result<(), BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct RejectingMiddleware;

    #[async_trait]
    impl Middleware for RejectingMiddleware {
        async fn before_execute(
            &self,
            _job: &Job,
            _ctx: &ExecutionContext,
        ) -> std::result::Result<(), BoxError> {
            Err("not allowed".into())
        }
    }

    fn processor(
        store: Arc<InMemoryJobStore>,
        middleware: Vec<Arc<dyn Middleware>>,
    ) -> (JobProcessor, Arc<EventBus>) {
        let mut registry = TaskRegistry::new();
        registry
            .register(TaskDescriptor::new("greet", "ok"))
            .unwrap();
        registry
            .register(TaskDescriptor::new("explode", "failing"))
            .unwrap();

        let resolver = Arc::new(MapResolver {
            ok: Arc::new(OkHandler),
            failing: Arc::new(FailingHandler),
        });
        let store_dyn: Arc<dyn JobStore> = store;
        let bus = Arc::new(EventBus::new(DEFAULT_BUS_CAPACITY));
        let processor = JobProcessor::new(
            Arc::new(registry),
            Arc::new(StrategyRegistry::with_defaults()),
            ContextFactory::new(Arc::new(EnvStore::new()), Arc::clone(&store_dyn)),
            middleware,
            TaskService::new(TaskExecutor::new(resolver)),
            JobResultProcessor::new(Arc::clone(&store_dyn)),
            Arc::clone(&bus),
        );
        (processor, bus)
    }

    async fn claimed_job(store: &Arc<InMemoryJobStore>, handler: &str) -> Job {
        let job = Job::builder(handler).build().unwrap();
        let store: Arc<dyn JobStore> = store.clone();
        let id = store.insert(job).await.unwrap();
        let mut job = store.get(id).await.unwrap().unwrap();
        job.state = JobState::Executing;
        job.executing_at = Some(Utc::now());
        store.save(&job).await.unwrap();
        job
    }

    #[tokio::test]
    async fn test_successful_job_completes_and_publishes() {
        let store = Arc::new(InMemoryJobStore::new());
        let (processor, bus) = processor(store.clone(), Vec::new());
        let mut rx = bus.subscribe();
        let job = claimed_job(&store, "greet").await;
        let id = job.id;

        processor.process(job).await.unwrap();

        let stored = store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.state, JobState::Completed);

        assert!(matches!(rx.recv().await.unwrap(), JobEvent::Executing { .. }));
        match rx.recv().await.unwrap() {
            JobEvent::Completed { job } => assert_eq!(job.id, id),
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failing_job_becomes_retryable_with_events() {
        let store = Arc::new(InMemoryJobStore::new());
        let (processor, bus) = processor(store.clone(), Vec::new());
        let mut rx = bus.subscribe();
        let job = claimed_job(&store, "explode").await;
        let id = job.id;

        processor.process(job).await.unwrap();

        let stored = store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.state, JobState::Retryable);
        assert_eq!(stored.retries, 1);

        assert!(matches!(rx.recv().await.unwrap(), JobEvent::Executing { .. }));
        match rx.recv().await.unwrap() {
            JobEvent::Exception { message, .. } => {
                assert!(message.contains("deliberate failure"))
            }
            other => panic!("expected Exception, got {other:?}"),
        }
        assert!(matches!(rx.recv().await.unwrap(), JobEvent::Failed { .. }));
    }

    #[tokio::test]
    async fn test_unknown_handler_fails_terminally() {
        let store = Arc::new(InMemoryJobStore::new());
        let (processor, bus) = processor(store.clone(), Vec::new());
        let mut rx = bus.subscribe();
        let job = claimed_job(&store, "ghost").await;
        let id = job.id;

        processor.process(job).await.unwrap();

        let stored = store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.state, JobState::Failed);
        assert!(stored.failed_at.is_some());
        assert!(stored.discarded_at.is_some());
        assert_eq!(stored.error.as_ref().unwrap().kind, "unknown-handler");

        assert!(matches!(rx.recv().await.unwrap(), JobEvent::Exception { .. }));
        assert!(matches!(rx.recv().await.unwrap(), JobEvent::Failed { .. }));
    }

    #[tokio::test]
    async fn test_middleware_runs_before_handler() {
        let store = Arc::new(InMemoryJobStore::new());
        let counter = Arc::new(CountingMiddleware {
            calls: AtomicU32::new(0),
        });
        let (processor, _bus) =
            processor(store.clone(), vec![counter.clone() as Arc<dyn Middleware>]);
        let job = claimed_job(&store, "greet").await;

        processor.process(job).await.unwrap();
        assert_eq!(counter.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_middleware_rejection_propagates_and_skips_handler() {
        let store = Arc::new(InMemoryJobStore::new());
        let (processor, _bus) = processor(store.clone(), vec![Arc::new(RejectingMiddleware) as Arc<dyn Middleware>]);
        let job = claimed_job(&store, "greet").await;
        let id = job.id;

        let err = processor.process(job).await.unwrap_err();
        assert!(matches!(err, ProcessError::Middleware { .. }));

        // The job was never resolved; it stays Executing for the stuck sweep.
        let stored = store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.state, JobState::Executing);
    }

    #[test]
    fn test_effective_timeout_prefers_bespoke_job_timeout() {
        let job = Job::builder("h")
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        assert_eq!(
            effective_timeout(&job, Duration::from_secs(30)),
            Duration::from_secs(5)
        );

        let defaulted = Job::builder("h").build().unwrap();
        assert_eq!(
            effective_timeout(&defaulted, Duration::from_secs(30)),
            Duration::from_secs(30)
        );

        // An explicit timeout equal to the crate default is still the
        // job's own choice, not an inherited one.
        let pinned = Job::builder("h")
            .timeout(crate::core::DEFAULT_TIMEOUT)
            .build()
            .unwrap();
        assert_eq!(
            effective_timeout(&pinned, Duration::from_secs(30)),
            crate::core::DEFAULT_TIMEOUT
        );
    }
}
