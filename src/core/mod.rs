//! Core types for the jobforge engine.
//!
//! This module provides the domain model the rest of the crate is built on:
//!
//! # Domain Model
//! - [`Job`]: one durable unit of scheduled work bound to a handler
//! - [`JobState`]: the finite state machine jobs move through
//! - [`TaskDescriptor`] / [`TaskRegistry`]: registered handler metadata
//!
//! # Retry Behavior
//! - [`RetryStrategy`]: pure backoff function from attempt count to interval
//! - [`StrategyRegistry`]: name-keyed strategy set (constant, linear,
//!   squared, jitter)
//!
//! # Error Handling
//! - [`CoreError`]: validation failures with proper error context
//! - [`Result<T>`]: type alias for Results using CoreError

mod error;
mod job;
pub mod retry;
mod task;

pub use error::{CoreError, Result};
pub use job::{
    EncryptionMetadata, FailureRecord, Job, JobBuilder, JobPayload, JobProgress, JobState,
    DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT, STUCK_FACTOR,
};
pub use retry::{
    ConstantBackoff, JitterBackoff, LinearBackoff, RetryStrategy, SquaredBackoff, StrategyRegistry,
};
pub use task::{TaskDescriptor, TaskRegistry};
