//! Timeout-bounded handler execution.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::context::ExecutionContext;
use super::error::{BoxError, ExecutionFailure, Result};
use crate::core::TaskDescriptor;

/// A registered handler a job's `handler` field refers to.
///
/// Handlers receive the execution context; those that declared no interest
/// in it simply ignore the argument. Long-running handlers should observe
/// [`ExecutionContext::cancellation`] so a timed-out execution can wind
/// down instead of leaking its task.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn run(&self, ctx: Arc<ExecutionContext>) -> std::result::Result<(), BoxError>;
}

/// Resolves a handler-owning instance for a descriptor's owner type.
///
/// An injected capability, not global state: wiring decides what "owner
/// type name → instance" means for the application.
pub trait DependencyResolver: Send + Sync {
    fn resolve(&self, owner: &str) -> Option<Arc<dyn TaskHandler>>;
}

/// Runs a resolved handler with a hard timeout and failure normalization.
///
/// The handler runs on a dedicated tokio task. On timeout the execution's
/// cancellation token is cancelled, but the task is not forcibly
/// terminated: cancellation is cooperative, and non-cooperative handler
/// code can leak its task until it returns on its own. This is inherited
/// risk of enforcing timeouts over arbitrary code.
pub struct TaskExecutor {
    resolver: Arc<dyn DependencyResolver>,
}

impl TaskExecutor {
    pub fn new(resolver: Arc<dyn DependencyResolver>) -> Self {
        Self { resolver }
    }

    /// Executes `descriptor`'s handler, bounded by `timeout`.
    pub async fn execute(
        &self,
        descriptor: &TaskDescriptor,
        timeout: Duration,
        ctx: Arc<ExecutionContext>,
    ) -> Result<()> {
        let Some(handler) = self.resolver.resolve(&descriptor.owner) else {
            return Err(ExecutionFailure::Resolution {
                task: descriptor.name.clone(),
                owner: descriptor.owner.clone(),
            });
        };

        let cancel = ctx.cancellation().clone();
        let worker = tokio::spawn(async move { handler.run(ctx).await });

        match tokio::time::timeout(timeout, worker).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(error))) => Err(ExecutionFailure::from_handler_error(error)),
            Ok(Err(join_error)) => {
                if join_error.is_panic() {
                    Err(ExecutionFailure::Panic(join_error.to_string()))
                } else {
                    Err(ExecutionFailure::Handler {
                        message: format!("task aborted: {}", join_error),
                        cause_chain: Vec::new(),
                    })
                }
            }
            Err(_elapsed) => {
                // Best-effort cancellation; the abandoned task keeps its
                // resources until the handler observes the token.
                cancel.cancel();
                warn!(
                    task = %descriptor.name,
                    timeout_ms = timeout.as_millis() as u64,
                    "task timed out, cancellation requested"
                );
                Err(ExecutionFailure::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }
}
