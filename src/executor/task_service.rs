//! Task outcome normalization.
//!
//! [`TaskService`] wraps the executor with lifecycle notifications. Every
//! execution notifies `Executing` first and then exactly one terminal
//! state; failures are always converted into [`TaskState::Failed`] and
//! never escape this boundary as errors.

use std::sync::Arc;
use std::time::Duration;

use super::context::ExecutionContext;
use super::error::ExecutionFailure;
use super::task_executor::TaskExecutor;
use crate::core::TaskDescriptor;

/// Tagged execution outcome.
#[derive(Debug, Clone)]
pub enum TaskState {
    /// The handler is about to run.
    Executing,
    /// The handler completed successfully.
    Successful,
    /// The handler did not complete; carries the normalized failure.
    Failed(ExecutionFailure),
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Successful | TaskState::Failed(_))
    }
}

/// Orchestrates one handler execution and its state notifications.
pub struct TaskService {
    executor: TaskExecutor,
}

impl TaskService {
    pub fn new(executor: TaskExecutor) -> Self {
        Self { executor }
    }

    /// Executes the descriptor's handler under `timeout`.
    ///
    /// `notify` observes `Executing` before the handler starts and the
    /// terminal state afterwards; the terminal state is also returned so
    /// the caller can resolve the job.
    pub async fn execute(
        &self,
        descriptor: &TaskDescriptor,
        timeout: Duration,
        ctx: Arc<ExecutionContext>,
        mut notify: impl FnMut(&TaskState),
    ) -> TaskState {
        notify(&TaskState::Executing);
        let terminal = match self.executor.execute(descriptor, timeout, ctx).await {
            Ok(()) => TaskState::Successful,
            Err(failure) => TaskState::Failed(failure),
        };
        notify(&terminal);
        terminal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Job;
    use crate::executor::context::ContextFactory;
    use crate::executor::environment::EnvStore;
    use crate::executor::task_executor::{DependencyResolver, TaskHandler};
    use crate::executor::BoxError;
    use crate::storage::InMemoryJobStore;
    use async_trait::async_trait;

    struct FixedResolver {
        handler: Option<Arc<dyn TaskHandler>>,
    }

    impl DependencyResolver for FixedResolver {
        fn resolve(&self, _owner: &str) -> Option<Arc<dyn TaskHandler>> {
            self.handler.clone()
        }
    }

    struct OkHandler;

    #[async_trait]
    impl TaskHandler for OkHandler {
        async fn run(&self, _ctx: Arc<ExecutionContext>) -> Result<(), BoxError> {
            Ok(())
        }
    }

    struct ErrHandler;

    #[async_trait]
    impl TaskHandler for ErrHandler {
        async fn run(&self, _ctx: Arc<ExecutionContext>) -> Result<(), BoxError> {
            Err("no can do".into())
        }
    }

    fn service(handler: Option<Arc<dyn TaskHandler>>) -> TaskService {
        TaskService::new(TaskExecutor::new(Arc::new(FixedResolver { handler })))
    }

    fn ctx() -> Arc<ExecutionContext> {
        let job = Job::builder("t").build().unwrap();
        ContextFactory::new(Arc::new(EnvStore::new()), Arc::new(InMemoryJobStore::new()))
            .create(&job)
    }

    #[tokio::test]
    async fn test_success_notifies_executing_then_successful() {
        let service = service(Some(Arc::new(OkHandler)));
        let descriptor = TaskDescriptor::new("t", "Owner");
        let mut seen = Vec::new();

        let terminal = service
            .execute(&descriptor, Duration::from_secs(1), ctx(), |state| {
                seen.push(format!("{:?}", state))
            })
            .await;

        assert!(matches!(terminal, TaskState::Successful));
        assert_eq!(seen.len(), 2);
        assert!(seen[0].starts_with("Executing"));
        assert!(seen[1].starts_with("Successful"));
    }

    #[tokio::test]
    async fn test_failure_is_a_state_value_not_an_error() {
        let service = service(Some(Arc::new(ErrHandler)));
        let descriptor = TaskDescriptor::new("t", "Owner");
        let mut states = Vec::new();

        let terminal = service
            .execute(&descriptor, Duration::from_secs(1), ctx(), |state| {
                states.push(state.clone())
            })
            .await;

        match terminal {
            TaskState::Failed(failure) => assert!(failure.to_string().contains("no can do")),
            other => panic!("expected Failed, got {:?}", other),
        }
        assert!(matches!(states[0], TaskState::Executing));
        assert!(matches!(states[1], TaskState::Failed(_)));
    }

    #[tokio::test]
    async fn test_resolution_failure_also_lands_in_failed_state() {
        let service = service(None);
        let descriptor = TaskDescriptor::new("t", "Owner");

        let terminal = service
            .execute(&descriptor, Duration::from_secs(1), ctx(), |_| {})
            .await;

        assert!(matches!(
            terminal,
            TaskState::Failed(ExecutionFailure::Resolution { .. })
        ));
    }
}
