//! Circuit breaker around the storage dependency.
//!
//! The picker routes every storage claim through a [`CircuitBreaker`].
//! After a run of consecutive failures the breaker opens and rejects calls
//! without touching storage, shedding load from a degraded backend. Once
//! the cooldown elapses a single probe call is let through: success closes
//! the circuit, failure reopens it with a fresh cooldown.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Breaker tuning.
#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// Consecutive failures that trip the circuit open.
    pub failure_threshold: u32,
    /// How long the circuit stays open before allowing a probe.
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
        }
    }
}

/// Error returned by [`CircuitBreaker::call`].
#[derive(Debug, Error)]
pub enum BreakerError<E: std::error::Error> {
    /// The circuit is open; the operation was never invoked.
    #[error("circuit open: storage calls suspended during cooldown")]
    Open,

    /// The operation ran and failed.
    #[error(transparent)]
    Inner(#[from] E),
}

enum State {
    Closed { failures: u32 },
    Open { until: Instant },
    HalfOpen,
}

/// Closed/open/half-open resilience wrapper over a fallible async call.
///
/// State is shared across all ticks and synchronized internally; overlapping
/// ticks observe one consistent counter. Created once at startup, never torn
/// down during normal operation.
pub struct CircuitBreaker {
    config: BreakerConfig,
    state: Mutex<State>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State::Closed { failures: 0 }),
        }
    }

    /// Runs `operation` under the breaker.
    ///
    /// When the circuit is open (or a half-open probe is already in flight)
    /// the operation is never invoked and [`BreakerError::Open`] is
    /// returned immediately. Otherwise the operation's own outcome is
    /// recorded and passed through.
    ///
    /// Cancel safety: the probe slot is held by a guard, so a `call`
    /// future dropped mid-operation (a driver racing the tick against a
    /// timeout or `select!`) releases the slot and reopens the circuit
    /// with a fresh cooldown instead of wedging it half-open.
    pub async fn call<T, E, F, Fut>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        E: std::error::Error,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(admission) = self.admit() else {
            return Err(BreakerError::Open);
        };
        match operation().await {
            Ok(value) => {
                admission.success();
                Ok(value)
            }
            Err(error) => {
                admission.failure();
                Err(BreakerError::Inner(error))
            }
        }
    }

    /// Returns the current observable state.
    pub fn state(&self) -> BreakerState {
        let state = self.lock();
        match *state {
            State::Closed { .. } => BreakerState::Closed,
            State::Open { .. } => BreakerState::Open,
            State::HalfOpen => BreakerState::HalfOpen,
        }
    }

    /// Decides whether a call may proceed, transitioning Open → HalfOpen
    /// when the cooldown has elapsed. The caller that wins the transition
    /// becomes the probe; everyone else is rejected until its admission
    /// resolves or is dropped.
    fn admit(&self) -> Option<Admission<'_>> {
        let mut state = self.lock();
        match *state {
            State::Closed { .. } => Some(Admission {
                breaker: self,
                probe: false,
                resolved: false,
            }),
            State::Open { until } => {
                if Instant::now() < until {
                    None
                } else {
                    debug!("circuit cooldown elapsed, allowing one probe");
                    *state = State::HalfOpen;
                    Some(Admission {
                        breaker: self,
                        probe: true,
                        resolved: false,
                    })
                }
            }
            State::HalfOpen => None,
        }
    }

    fn record_success(&self) {
        let mut state = self.lock();
        if matches!(*state, State::HalfOpen) {
            debug!("probe succeeded, closing circuit");
        }
        *state = State::Closed { failures: 0 };
    }

    fn record_failure(&self) {
        let mut state = self.lock();
        match *state {
            State::Closed { failures } => {
                let failures = failures + 1;
                if failures >= self.config.failure_threshold {
                    warn!(
                        failures,
                        cooldown_secs = self.config.cooldown.as_secs(),
                        "failure threshold crossed, opening circuit"
                    );
                    *state = State::Open {
                        until: Instant::now() + self.config.cooldown,
                    };
                } else {
                    *state = State::Closed { failures };
                }
            }
            State::HalfOpen => {
                warn!("probe failed, reopening circuit");
                *state = State::Open {
                    until: Instant::now() + self.config.cooldown,
                };
            }
            // A late failure report while already open changes nothing.
            State::Open { .. } => {}
        }
    }

    /// Releases a probe slot whose outcome was never reported. The circuit
    /// goes back to Open with a fresh cooldown; the next probe must wait.
    fn abandon_probe(&self) {
        let mut state = self.lock();
        if matches!(*state, State::HalfOpen) {
            warn!("probe abandoned before resolving, reopening circuit");
            *state = State::Open {
                until: Instant::now() + self.config.cooldown,
            };
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state
            .lock()
            .expect("circuit breaker mutex poisoned - unrecoverable state")
    }
}

/// Permission for one call, tied to the breaker's admission bookkeeping.
///
/// Dropping an unresolved probe admission reverts HalfOpen to Open so a
/// cancelled probe cannot hold the slot forever.
struct Admission<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    resolved: bool,
}

impl Admission<'_> {
    fn success(mut self) {
        self.resolved = true;
        self.breaker.record_success();
    }

    fn failure(mut self) {
        self.resolved = true;
        self.breaker.record_failure();
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if self.probe && !self.resolved {
            self.breaker.abandon_probe();
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}
