use atelier_core::types::{DbId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Which transition a [`JobEvent`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobEventKind {
    /// Row created and workflow accepted by the engine.
    #[serde(rename = "job.submitted")]
    Submitted,
    #[serde(rename = "job.processing")]
    Processing,
    /// Outputs persisted.
    #[serde(rename = "job.completed")]
    Completed,
    /// Engine error, or the submission itself failed.
    #[serde(rename = "job.failed")]
    Failed,
}

impl JobEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "job.submitted",
            Self::Processing => "job.processing",
            Self::Completed => "job.completed",
            Self::Failed => "job.failed",
        }
    }

    /// Completed and failed end a job's history.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for JobEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    pub kind: JobEventKind,
    pub job_id: DbId,
    /// Owner of the job.
    pub user_id: DbId,
    pub payload: serde_json::Value,
    pub at: Timestamp,
}

impl JobEvent {
    pub fn new(kind: JobEventKind, job_id: DbId, user_id: DbId) -> Self {
        Self {
            kind,
            job_id,
            user_id,
            payload: serde_json::json!({}),
            at: Utc::now(),
        }
    }

    pub fn with_payload(self, payload: serde_json::Value) -> Self {
        Self { payload, ..self }
    }
}
