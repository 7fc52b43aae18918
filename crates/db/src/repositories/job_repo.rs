//! Repository for the `jobs` table.
//!
//! Every status write is conditional on the current status so that
//! transitions stay monotonic under concurrent writers. Callers use the
//! returned `bool` to learn whether *they* performed the transition.

use atelier_core::types::DbId;
use sqlx::PgPool;

use crate::models::job::{CreateJob, Job, JobFilter};
use crate::models::status::{JobStatus, StatusId};

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, user_id, kind, status_id, queue_position, prompt_id, parameters, \
    error_message, created_at, started_at, completed_at, updated_at";

/// Maximum page size for job listing.
const MAX_LIMIT: i64 = 100;

/// Default page size for job listing.
const DEFAULT_LIMIT: i64 = 50;

/// Terminal statuses: completed, failed.
const TERMINAL_STATUSES: [StatusId; 2] = [
    JobStatus::Completed as StatusId,
    JobStatus::Failed as StatusId,
];

/// Provides CRUD operations and guarded transitions for generation jobs.
pub struct JobRepo;

impl JobRepo {
    /// Insert a job before it is handed to the engine.
    ///
    /// `started_at` is stamped immediately when the job starts out in
    /// `Processing`.
    pub async fn create(pool: &PgPool, input: &CreateJob) -> Result<Job, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs (user_id, kind, status_id, queue_position, parameters, started_at) \
             VALUES ($1, $2, $3, $4, $5, CASE WHEN $3 = $6 THEN NOW() END) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(input.user_id)
            .bind(input.kind.as_str())
            .bind(input.status.id())
            .bind(input.queue_position)
            .bind(&input.parameters)
            .bind(JobStatus::Processing.id())
            .fetch_one(pool)
            .await
    }

    /// Record the engine's job id. Only succeeds the first time.
    pub async fn attach_prompt_id(
        pool: &PgPool,
        job_id: DbId,
        prompt_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs SET prompt_id = $2 WHERE id = $1 AND prompt_id IS NULL",
        )
        .bind(job_id)
        .bind(prompt_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_prompt_id(
        pool: &PgPool,
        prompt_id: &str,
    ) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE prompt_id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(prompt_id)
            .fetch_optional(pool)
            .await
    }

    /// A user's jobs, newest first.
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: DbId,
        limit: Option<i64>,
    ) -> Result<Vec<Job>, sqlx::Error> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let query = format!(
            "SELECT {COLUMNS} FROM jobs WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(user_id)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Admin listing. `status_id` is the resolved form of `filter.status`.
    pub async fn list_filtered(
        pool: &PgPool,
        filter: &JobFilter,
        status_id: Option<StatusId>,
    ) -> Result<Vec<Job>, sqlx::Error> {
        let limit = filter.limit.unwrap_or(MAX_LIMIT).clamp(1, MAX_LIMIT);
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE ($1::BIGINT IS NULL OR user_id = $1) \
               AND ($2::SMALLINT IS NULL OR status_id = $2) \
               AND ($3::TEXT IS NULL OR kind = $3) \
             ORDER BY created_at DESC \
             LIMIT $4"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(filter.user_id)
            .bind(status_id)
            .bind(filter.kind.as_deref())
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Non-terminal jobs that have reached the engine, oldest first.
    pub async fn list_open(pool: &PgPool, limit: i64) -> Result<Vec<Job>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE status_id NOT IN ($1, $2) AND prompt_id IS NOT NULL \
             ORDER BY created_at ASC \
             LIMIT $3"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(TERMINAL_STATUSES[0])
            .bind(TERMINAL_STATUSES[1])
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Non-terminal jobs created more than `older_than_mins` minutes ago.
    pub async fn list_stale(
        pool: &PgPool,
        older_than_mins: i32,
        limit: i64,
    ) -> Result<Vec<Job>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE status_id NOT IN ($1, $2) \
               AND created_at < NOW() - make_interval(mins => $3::INT) \
             ORDER BY created_at ASC \
             LIMIT $4"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(TERMINAL_STATUSES[0])
            .bind(TERMINAL_STATUSES[1])
            .bind(older_than_mins)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// `queued -> processing`. Returns `false` if the job had already moved on.
    pub async fn mark_processing(pool: &PgPool, job_id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET status_id = $2, started_at = COALESCE(started_at, NOW()) \
             WHERE id = $1 AND status_id = $3",
        )
        .bind(job_id)
        .bind(JobStatus::Processing.id())
        .bind(JobStatus::Queued.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Complete a job unless it is already terminal.
    ///
    /// Returns `true` only for the caller that performed the transition.
    pub async fn mark_completed(pool: &PgPool, job_id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET status_id = $2, completed_at = NOW(), \
                 started_at = COALESCE(started_at, NOW()) \
             WHERE id = $1 AND status_id NOT IN ($3, $4)",
        )
        .bind(job_id)
        .bind(JobStatus::Completed.id())
        .bind(TERMINAL_STATUSES[0])
        .bind(TERMINAL_STATUSES[1])
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Fail a job unless it is already terminal.
    pub async fn mark_failed(
        pool: &PgPool,
        job_id: DbId,
        error: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET status_id = $2, error_message = $3, completed_at = NOW() \
             WHERE id = $1 AND status_id NOT IN ($4, $5)",
        )
        .bind(job_id)
        .bind(JobStatus::Failed.id())
        .bind(error)
        .bind(TERMINAL_STATUSES[0])
        .bind(TERMINAL_STATUSES[1])
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
