use atelier_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// One lifecycle transition of a job, as logged in `job_events`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct JobEventRecord {
    pub id: DbId,
    pub job_id: DbId,
    pub user_id: DbId,
    /// `job.submitted`, `job.processing`, `job.completed` or `job.failed`.
    pub kind: String,
    pub payload: serde_json::Value,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone)]
pub struct CreateJobEvent<'a> {
    pub job_id: DbId,
    pub user_id: DbId,
    pub kind: &'a str,
    pub payload: &'a serde_json::Value,
}
