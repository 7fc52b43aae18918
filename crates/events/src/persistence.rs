//! Writes every bus event to `job_events`.

use atelier_db::models::event::CreateJobEvent;
use atelier_db::repositories::EventRepo;
use atelier_db::DbPool;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;
use tokio_util::sync::CancellationToken;

use crate::event::JobEvent;

pub struct EventPersistence;

impl EventPersistence {
    /// Runs until `stop` fires or every sender is gone. A failed insert is
    /// logged and the event dropped; the job row stays authoritative.
    pub async fn run(pool: DbPool, mut events: Receiver<JobEvent>, stop: CancellationToken) {
        let mut written = 0u64;
        loop {
            let next = tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                next = events.recv() => next,
            };
            match next {
                Ok(event) => match Self::write(&pool, &event).await {
                    Ok(_) => written += 1,
                    Err(e) => tracing::error!(
                        error = %e,
                        kind = %event.kind,
                        job_id = event.job_id,
                        "Dropping job event"
                    ),
                },
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Job event log fell behind the bus");
                }
                Err(RecvError::Closed) => break,
            }
        }
        tracing::info!(written, "Job event log stopped");
    }

    async fn write(pool: &DbPool, event: &JobEvent) -> Result<i64, sqlx::Error> {
        EventRepo::insert(
            pool,
            &CreateJobEvent {
                job_id: event.job_id,
                user_id: event.user_id,
                kind: event.kind.as_str(),
                payload: &event.payload,
            },
        )
        .await
    }
}
