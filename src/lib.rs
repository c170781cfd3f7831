//! Jobforge: durable background job processing for Rust.
//!
//! `jobforge` moves jobs through a persistent state machine
//! (Scheduled → Executing → Completed / Retryable / Failed), executing
//! each one with a bounded timeout and resolving every outcome through a
//! configurable retry policy. A circuit breaker isolates the engine from
//! a struggling storage backend.
//!
//! # Features
//!
//! - **Durable state machine**: every transition is persisted; a crashed
//!   worker leaves a reclaimable trail, never a lost job
//! - **Bounded execution**: per-job timeouts with cooperative
//!   cancellation
//! - **Retry policies**: constant, linear, squared, and full-jitter
//!   backoff, selected per task
//! - **Backpressure**: admission control before claiming, so exhausted
//!   workers never strand jobs in Executing
//! - **Storage protection**: claim traffic routes through a circuit
//!   breaker that sheds load while the backend recovers
//! - **Events**: broadcast notifications for every pipeline stage
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use jobforge::core::{Job, StrategyRegistry, TaskDescriptor, TaskRegistry};
//! use jobforge::executor::*;
//! use jobforge::storage::{InMemoryJobStore, JobStore};
//!
//! struct Mailer;
//!
//! #[async_trait::async_trait]
//! impl TaskHandler for Mailer {
//!     async fn run(&self, ctx: Arc<ExecutionContext>) -> Result<(), BoxError> {
//!         let to = ctx.argument("to");
//!         println!("sending mail to {:?}", to.as_str());
//!         Ok(())
//!     }
//! }
//!
//! # async fn wiring(resolver: Arc<dyn DependencyResolver>) -> Result<(), BoxError> {
//! let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
//! let mut tasks = TaskRegistry::new();
//! tasks.register(TaskDescriptor::new("send-mail", "Mailer"))?;
//!
//! store
//!     .insert(Job::builder("send-mail").arg("to", "ada@example.com").build()?)
//!     .await?;
//!
//! let bus = Arc::new(EventBus::new(DEFAULT_BUS_CAPACITY));
//! let processor = Arc::new(JobProcessor::new(
//!     Arc::new(tasks),
//!     Arc::new(StrategyRegistry::with_defaults()),
//!     ContextFactory::new(Arc::new(EnvStore::new()), Arc::clone(&store)),
//!     Vec::new(),
//!     TaskService::new(TaskExecutor::new(resolver)),
//!     JobResultProcessor::new(Arc::clone(&store)),
//!     Arc::clone(&bus),
//! ));
//! let runner = JobRunner::new(
//!     Picker::new(store, Arc::new(CircuitBreaker::default()), bus),
//!     processor,
//! )
//! .with_concurrency(8);
//!
//! runner.tick().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Module Organization
//!
//! - [`core`]: domain model: jobs, states, descriptors, retry strategies
//! - [`storage`]: persistence seam ([`storage::JobStore`]) and the
//!   in-memory backend
//! - [`executor`]: the dispatch pipeline: picker, processor, task
//!   execution, result resolution, breaker, events

pub mod core;
pub mod executor;
pub mod storage;

// Re-export commonly used types for convenience
pub use crate::core::{
    CoreError, FailureRecord, Job, JobBuilder, JobState, Result as CoreResult, RetryStrategy,
    StrategyRegistry, TaskDescriptor, TaskRegistry,
};

pub use executor::{
    BoxError, CircuitBreaker, ContextFactory, DependencyResolver, EnvStore, EventBus,
    ExecutionContext, ExecutionFailure, JobEvent, JobProcessor, JobResultProcessor, JobRunner,
    Middleware, Picker, TaskExecutor, TaskHandler, TaskService, TaskState, TickOutcome,
};

pub use storage::{
    InMemoryJobStore, JobStore, LogLevel, LogRecord, Result as StorageResult, StorageError,
};

// Re-export dependencies used in the public API so downstream crates
// cannot drift onto mismatched versions.
pub use async_trait;
pub use serde_json;
pub use tokio;
pub use uuid;
