//! Persisted generation outputs.

use atelier_core::job_kind::ArtifactKind;
use atelier_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `images` table.
///
/// `(job_id, comfy_filename)` is unique: one row per engine output per job.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Image {
    pub id: DbId,
    pub job_id: DbId,
    pub user_id: DbId,
    /// Display name.
    pub filename: String,
    /// Name the engine reported for the output.
    pub comfy_filename: String,
    pub kind: String,
    /// Object store key.
    pub storage_path: String,
    pub created_at: Timestamp,
}

/// Insert payload for an image row.
#[derive(Debug, Clone)]
pub struct CreateImage {
    pub job_id: DbId,
    pub user_id: DbId,
    pub filename: String,
    pub comfy_filename: String,
    pub kind: ArtifactKind,
    pub storage_path: String,
}
