//! Broadcast hub for [`JobEvent`]s.
//!
//! One bus is shared as `Arc<EventBus>` by the API, the reconciliation
//! worker and the persistence task. Receivers that fall more than the
//! channel capacity behind see `RecvError::Lagged` and skip ahead.

use tokio::sync::broadcast;

use crate::event::JobEvent;

const CAPACITY: usize = 1024;

pub struct EventBus {
    tx: broadcast::Sender<JobEvent>,
}

impl EventBus {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tx: broadcast::channel(capacity).0,
        }
    }

    /// Returns how many receivers got the event. Zero is not an error.
    pub fn publish(&self, event: JobEvent) -> usize {
        tracing::debug!(kind = %event.kind, job_id = event.job_id, "Job event");
        self.tx.send(event).unwrap_or(0)
    }

    /// Sees only events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_capacity(CAPACITY)
    }
}
