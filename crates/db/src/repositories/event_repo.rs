//! Append-only log of job lifecycle events.

use atelier_core::types::DbId;
use sqlx::PgPool;

use crate::models::event::{CreateJobEvent, JobEventRecord};

const COLUMNS: &str = "id, job_id, user_id, kind, payload, created_at";

pub struct EventRepo;

impl EventRepo {
    pub async fn insert(pool: &PgPool, event: &CreateJobEvent<'_>) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO job_events (job_id, user_id, kind, payload) \
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(event.job_id)
        .bind(event.user_id)
        .bind(event.kind)
        .bind(event.payload)
        .fetch_one(pool)
        .await
    }

    /// Newest first across all jobs.
    pub async fn list_recent(
        pool: &PgPool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<JobEventRecord>, sqlx::Error> {
        let sql = format!(
            "SELECT {COLUMNS} FROM job_events ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2"
        );
        sqlx::query_as(&sql).bind(limit).bind(offset).fetch_all(pool).await
    }

    /// One job's history in the order it happened.
    pub async fn list_for_job(
        pool: &PgPool,
        job_id: DbId,
    ) -> Result<Vec<JobEventRecord>, sqlx::Error> {
        let sql = format!("SELECT {COLUMNS} FROM job_events WHERE job_id = $1 ORDER BY id");
        sqlx::query_as(&sql).bind(job_id).fetch_all(pool).await
    }
}
