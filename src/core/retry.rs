//! Retry backoff strategies.
//!
//! A [`RetryStrategy`] is a pure function from a failure count to the
//! interval to wait before the next attempt. Strategies are held in a
//! name-keyed [`StrategyRegistry`] so task descriptors can reference them
//! by name; the registry ships with `constant`, `linear`, `squared` and
//! `jitter` curves.
//!
//! Jitter output is derived independently for every attempt and never feeds
//! back into subsequent calculations, so delays cannot drift downward over
//! time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use super::error::{CoreError, Result};

/// Pure backoff function from attempt count to wait interval.
///
/// `attempt` is the number of failures so far (0 for the first retry).
/// Implementations must be side-effect free apart from randomness and must
/// always return a non-negative, bounded duration.
pub trait RetryStrategy: Send + Sync {
    /// Unique strategy name used for registry lookup.
    fn name(&self) -> &str;

    /// Computes the delay before the next attempt.
    fn delay(&self, attempt: u32) -> Duration;
}

/// Fixed delay regardless of the attempt count.
#[derive(Debug, Clone, Copy)]
pub struct ConstantBackoff {
    pub delay: Duration,
}

impl Default for ConstantBackoff {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(10),
        }
    }
}

impl RetryStrategy for ConstantBackoff {
    fn name(&self) -> &str {
        "constant"
    }

    fn delay(&self, _attempt: u32) -> Duration {
        self.delay
    }
}

/// Delay grows linearly: `base × (attempt + 1)`, clamped to `max`.
#[derive(Debug, Clone, Copy)]
pub struct LinearBackoff {
    pub base: Duration,
    pub max: Duration,
}

impl Default for LinearBackoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(5),
            max: Duration::from_secs(600),
        }
    }
}

impl RetryStrategy for LinearBackoff {
    fn name(&self) -> &str {
        "linear"
    }

    fn delay(&self, attempt: u32) -> Duration {
        self.base
            .saturating_mul(attempt.saturating_add(1))
            .min(self.max)
    }
}

/// Delay grows quadratically: `base × (attempt + 1)²`, clamped to `max`.
#[derive(Debug, Clone, Copy)]
pub struct SquaredBackoff {
    pub base: Duration,
    pub max: Duration,
}

impl Default for SquaredBackoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(3),
            max: Duration::from_secs(3600),
        }
    }
}

impl RetryStrategy for SquaredBackoff {
    fn name(&self) -> &str {
        "squared"
    }

    fn delay(&self, attempt: u32) -> Duration {
        let n = attempt.saturating_add(1);
        self.base.saturating_mul(n.saturating_mul(n)).min(self.max)
    }
}

/// Full jitter over an exponential base: random in `[0, base × 2^attempt]`,
/// with the upper bound clamped to `max`.
///
/// Randomizing the whole interval spreads retries from many failed jobs
/// apart, avoiding a thundering herd against a recovering dependency.
#[derive(Debug, Clone, Copy)]
pub struct JitterBackoff {
    pub base: Duration,
    pub max: Duration,
}

impl Default for JitterBackoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(600),
        }
    }
}

impl RetryStrategy for JitterBackoff {
    fn name(&self) -> &str {
        "jitter"
    }

    fn delay(&self, attempt: u32) -> Duration {
        let max_ms = self.max.as_millis() as u64;
        let exp = attempt.min(62);
        let bound_ms = (self.base.as_millis() as u64)
            .saturating_mul(1u64 << exp)
            .min(max_ms);
        if bound_ms == 0 {
            return Duration::ZERO;
        }
        let mut rng = rand::rng();
        Duration::from_millis(rng.random_range(0..=bound_ms))
    }
}

/// Name-keyed registry of retry strategies.
///
/// Built once at startup. Registering a duplicate name is a validation
/// failure; lookups by unknown name return `None` so the caller decides the
/// fallback.
pub struct StrategyRegistry {
    strategies: HashMap<String, Arc<dyn RetryStrategy>>,
}

impl StrategyRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    /// Creates a registry pre-populated with the default strategy set.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        // Defaults cannot collide in a fresh registry.
        let defaults: [Arc<dyn RetryStrategy>; 4] = [
            Arc::new(ConstantBackoff::default()),
            Arc::new(LinearBackoff::default()),
            Arc::new(SquaredBackoff::default()),
            Arc::new(JitterBackoff::default()),
        ];
        for strategy in defaults {
            registry
                .register(strategy)
                .unwrap_or_else(|_| unreachable!("default strategy names are unique"));
        }
        registry
    }

    /// Registers a strategy under its own name.
    pub fn register(&mut self, strategy: Arc<dyn RetryStrategy>) -> Result<()> {
        let name = strategy.name().to_string();
        if self.strategies.contains_key(&name) {
            return Err(CoreError::DuplicateRegistration {
                kind: "retry strategy",
                name,
            });
        }
        self.strategies.insert(name, strategy);
        Ok(())
    }

    /// Looks up a strategy by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn RetryStrategy>> {
        self.strategies.get(name).cloned()
    }

    /// Returns the number of registered strategies.
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Returns true if no strategies are registered.
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
