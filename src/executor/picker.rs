//! Claiming the next due job, with the breaker between us and storage.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, warn};

use super::breaker::{BreakerError, CircuitBreaker};
use super::events::{EventBus, JobEvent};
use crate::core::Job;
use crate::storage::JobStore;

/// Claims due jobs from storage through the circuit breaker.
///
/// Storage trouble never escapes a pick: a breaker rejection or a storage
/// error is logged and reported as "nothing to do", so the dispatch loop
/// keeps ticking while the breaker sheds load.
pub struct Picker {
    store: Arc<dyn JobStore>,
    breaker: Arc<CircuitBreaker>,
    bus: Arc<EventBus>,
}

impl Picker {
    pub fn new(store: Arc<dyn JobStore>, breaker: Arc<CircuitBreaker>, bus: Arc<EventBus>) -> Self {
        Self {
            store,
            breaker,
            bus,
        }
    }

    /// Claims the next due job, if any.
    ///
    /// Publishes `Selected` with the storage round-trip time on a
    /// successful claim.
    pub async fn pick(&self) -> Option<Job> {
        let started = Instant::now();
        let claimed = self
            .breaker
            .call(|| self.store.claim_due_job())
            .await;
        let elapsed = started.elapsed();

        match claimed {
            Ok(Some(job)) => {
                debug!(job_id = %job.id, handler = %job.handler, ?elapsed, "claimed job");
                self.bus.publish(JobEvent::Selected {
                    job: job.clone(),
                    elapsed,
                });
                Some(job)
            }
            Ok(None) => None,
            Err(BreakerError::Open) => {
                warn!("job claim rejected, circuit breaker open");
                None
            }
            Err(BreakerError::Inner(error)) => {
                warn!(%error, "job claim failed");
                None
            }
        }
    }
}
