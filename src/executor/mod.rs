//! The execution engine: from a claimed job to a resolved one.
//!
//! # Pipeline
//!
//! A dispatch tick moves a job through four stages:
//!
//! 1. [`JobRunner::tick`] checks worker capacity, then asks the picker
//!    for work.
//! 2. [`Picker::pick`] claims the next due job from storage through the
//!    [`CircuitBreaker`], so a struggling backend sheds claim traffic
//!    instead of being hammered.
//! 3. [`JobProcessor::process`] resolves the job's descriptor, builds an
//!    [`ExecutionContext`], runs middleware, and hands off to the
//!    [`TaskService`].
//! 4. [`TaskService::execute`] runs the handler under its timeout via
//!    the [`TaskExecutor`] and reports a terminal [`TaskState`], which
//!    the [`JobResultProcessor`] turns into the job's next persisted
//!    state.
//!
//! # Failure Model
//!
//! Handler failures are data, not control flow: every fault is
//! normalized into an [`ExecutionFailure`] and resolved through the
//! retry state machine. Only storage faults and middleware rejections
//! propagate as errors from the pipeline.
//!
//! # Observability
//!
//! Every stage publishes [`JobEvent`]s on the shared [`EventBus`];
//! subscribers get a fire-and-forget broadcast feed of selections,
//! executions, completions, and failures.

pub mod breaker;
pub mod context;
pub mod environment;
pub mod error;
pub mod events;
pub mod picker;
pub mod processor;
pub mod result_processor;
pub mod runner;
pub mod task_executor;
pub mod task_service;

pub use breaker::{BreakerConfig, BreakerError, BreakerState, CircuitBreaker};
pub use context::{
    ArgumentValue, ContextFactory, ExecutionContext, JobLogger, ProgressReporter,
};
pub use environment::EnvStore;
pub use error::{BoxError, ExecutionFailure, Result as ExecutionResult, MAX_CAUSE_CHAIN};
pub use events::{EventBus, JobEvent, DEFAULT_BUS_CAPACITY};
pub use picker::Picker;
pub use processor::{JobProcessor, Middleware, ProcessError};
pub use result_processor::{JobResultProcessor, JobRetryer};
pub use runner::{JobRunner, TickOutcome};
pub use task_executor::{DependencyResolver, TaskExecutor, TaskHandler};
pub use task_service::{TaskService, TaskState};
