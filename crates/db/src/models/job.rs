//! Generation job model and DTOs.

use atelier_core::error::CoreError;
use atelier_core::job_kind::JobKind;
use atelier_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::{JobStatus, StatusId};

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: DbId,
    pub user_id: DbId,
    pub kind: String,
    pub status_id: StatusId,
    /// Engine backlog estimate taken once at submission. Never refreshed.
    pub queue_position: Option<i32>,
    /// Engine-assigned job id. Written once, after a successful submit.
    pub prompt_id: Option<String>,
    pub parameters: serde_json::Value,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

impl Job {
    pub fn job_kind(&self) -> Result<JobKind, CoreError> {
        JobKind::from_name(&self.kind)
    }

    pub fn status(&self) -> Option<JobStatus> {
        JobStatus::from_id(self.status_id)
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_some_and(JobStatus::is_terminal)
    }
}

/// Insert payload for a new job.
#[derive(Debug, Clone)]
pub struct CreateJob {
    pub user_id: DbId,
    pub kind: JobKind,
    /// `Queued` when the engine reported a backlog, `Processing` otherwise.
    pub status: JobStatus,
    pub queue_position: Option<i32>,
    pub parameters: serde_json::Value,
}

/// Admin listing filters for `GET /api/v1/admin/jobs`.
#[derive(Debug, Default, Deserialize)]
pub struct JobFilter {
    pub user_id: Option<DbId>,
    /// Status name (`queued`, `processing`, `completed`, `failed`).
    pub status: Option<String>,
    pub kind: Option<String>,
    pub limit: Option<i64>,
}
