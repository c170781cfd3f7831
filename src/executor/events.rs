//! Telemetry events for the dispatch pipeline.
//!
//! [`EventBus`] is a thin wrapper around [`tokio::sync::broadcast`].
//! Publishing is fire-and-forget: subscribers get a copy of each
//! [`JobEvent`], and having no subscribers is not an error. Nothing in the
//! pipeline ever waits on a subscriber.

use std::time::Duration;

use tokio::sync::broadcast;

use crate::core::Job;

/// Default broadcast channel capacity.
pub const DEFAULT_BUS_CAPACITY: usize = 256;

/// Fire-and-forget notification emitted by the dispatch pipeline.
#[derive(Debug, Clone)]
pub enum JobEvent {
    /// The picker claimed a job; `elapsed` is the storage round-trip time.
    Selected { job: Job, elapsed: Duration },
    /// The task service is about to run the handler.
    Executing { job: Job },
    /// The job resolved successfully.
    Completed { job: Job },
    /// The job resolved as Retryable or Failed.
    Failed { job: Job },
    /// An execution fault occurred; carries the failure detail.
    Exception { job: Job, message: String },
}

impl JobEvent {
    /// The job this event concerns.
    pub fn job(&self) -> &Job {
        match self {
            JobEvent::Selected { job, .. }
            | JobEvent::Executing { job }
            | JobEvent::Completed { job }
            | JobEvent::Failed { job }
            | JobEvent::Exception { job, .. } => job,
        }
    }
}

/// Broadcast channel for pipeline telemetry.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<JobEvent>,
}

impl EventBus {
    /// Creates a bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Errors are ignored when there are no active subscribers.
    pub fn publish(&self, event: JobEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribes to the bus and returns a new receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let job = Job::builder("h").build().unwrap();
        bus.publish(JobEvent::Executing { job: job.clone() });

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, JobEvent::Executing { .. }));
        assert_eq!(event.job().handler, "h");
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::default();
        let job = Job::builder("h").build().unwrap();
        // Must not panic or error.
        bus.publish(JobEvent::Completed { job });
    }
}
