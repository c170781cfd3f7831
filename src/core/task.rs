//! Registered handler metadata.
//!
//! A [`TaskDescriptor`] describes one named handler: which owner type holds
//! the code, whether it wants the execution context injected, which retry
//! strategy backs it off, and its default timeout. Descriptors are built
//! once at startup (by an external discovery component) and are immutable
//! afterwards; the [`TaskRegistry`] is the process-wide lookup table the
//! dispatch pipeline resolves `job.handler` against.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::error::{CoreError, Result};
use super::job::DEFAULT_TIMEOUT;

/// Metadata of a registered handler.
#[derive(Debug, Clone)]
pub struct TaskDescriptor {
    /// Unique handler name jobs refer to.
    pub name: String,
    /// Human-readable description for the admin surface.
    pub description: String,
    /// Name of the type that owns the handler code, resolved through the
    /// dependency resolver at execution time.
    pub owner: String,
    /// Whether the handler declared interest in the execution context.
    pub wants_context: bool,
    /// Name of the retry strategy applied on recoverable failure.
    pub retry_strategy: String,
    /// Default execution timeout for jobs that do not carry their own.
    pub timeout: Duration,
}

impl TaskDescriptor {
    /// Creates a descriptor with the default timeout, `constant` backoff
    /// and no context injection.
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            owner: owner.into(),
            wants_context: false,
            retry_strategy: "constant".to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn wants_context(mut self, wants_context: bool) -> Self {
        self.wants_context = wants_context;
        self
    }

    pub fn retry_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.retry_strategy = strategy.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Process-wide registry of task descriptors, keyed by handler name.
pub struct TaskRegistry {
    descriptors: HashMap<String, Arc<TaskDescriptor>>,
}

impl TaskRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            descriptors: HashMap::new(),
        }
    }

    /// Registers a descriptor. Registering a name twice is a validation
    /// failure: two handlers under one name would make dispatch ambiguous.
    pub fn register(&mut self, descriptor: TaskDescriptor) -> Result<()> {
        if self.descriptors.contains_key(&descriptor.name) {
            return Err(CoreError::DuplicateRegistration {
                kind: "task",
                name: descriptor.name,
            });
        }
        self.descriptors
            .insert(descriptor.name.clone(), Arc::new(descriptor));
        Ok(())
    }

    /// Looks up a descriptor by handler name.
    pub fn lookup(&self, handler: &str) -> Option<Arc<TaskDescriptor>> {
        self.descriptors.get(handler).cloned()
    }

    /// Returns the number of registered tasks.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Returns true if no tasks are registered.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}
