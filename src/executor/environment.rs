//! Shared baseline environment for task executions.
//!
//! The environment is process-wide, read-mostly state. It is never handed
//! to task code directly: every execution context takes a private snapshot
//! at creation time, so concurrent executions cannot observe each other's
//! writes and late mutations of the baseline do not leak into running
//! tasks.

use std::collections::HashMap;
use std::sync::RwLock;

/// Read-mostly store of baseline environment entries.
pub struct EnvStore {
    entries: RwLock<HashMap<String, String>>,
}

impl EnvStore {
    /// Creates an empty environment.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Sets a baseline entry. Visible only to contexts created afterwards.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.write().insert(key.into(), value.into());
    }

    /// Reads a baseline entry.
    pub fn get(&self, key: &str) -> Option<String> {
        self.read().get(key).cloned()
    }

    /// Clones the current entries for one execution.
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.read().clone()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, String>> {
        self.entries
            .read()
            .expect("environment RwLock poisoned - unrecoverable state")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, String>> {
        self.entries
            .write()
            .expect("environment RwLock poisoned - unrecoverable state")
    }
}

impl Default for EnvStore {
    fn default() -> Self {
        Self::new()
    }
}
