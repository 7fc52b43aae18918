//! Repository for the `images` table.

use atelier_core::types::DbId;
use sqlx::PgPool;

use crate::models::image::{CreateImage, Image};

/// Column list for `images` queries.
const COLUMNS: &str =
    "id, job_id, user_id, filename, comfy_filename, kind, storage_path, created_at";

/// Default page size for a user's gallery.
const USER_LIMIT: i64 = 100;

/// Page size for the admin listing.
const ADMIN_LIMIT: i64 = 200;

/// Provides read/write operations for persisted outputs.
pub struct ImageRepo;

impl ImageRepo {
    /// Whether an image row already exists for this engine output.
    pub async fn exists(
        pool: &PgPool,
        job_id: DbId,
        comfy_filename: &str,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM images WHERE job_id = $1 AND comfy_filename = $2)",
        )
        .bind(job_id)
        .bind(comfy_filename)
        .fetch_one(pool)
        .await
    }

    /// Insert unless `(job_id, comfy_filename)` is already present.
    ///
    /// Returns `None` when a concurrent writer got there first.
    pub async fn insert_if_absent(
        pool: &PgPool,
        input: &CreateImage,
    ) -> Result<Option<Image>, sqlx::Error> {
        let query = format!(
            "INSERT INTO images (job_id, user_id, filename, comfy_filename, kind, storage_path) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT ON CONSTRAINT uq_images_job_comfy_filename DO NOTHING \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Image>(&query)
            .bind(input.job_id)
            .bind(input.user_id)
            .bind(&input.filename)
            .bind(&input.comfy_filename)
            .bind(input.kind.as_str())
            .bind(&input.storage_path)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Image>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM images WHERE id = $1");
        sqlx::query_as::<_, Image>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_for_job(pool: &PgPool, job_id: DbId) -> Result<Vec<Image>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM images WHERE job_id = $1 ORDER BY id ASC");
        sqlx::query_as::<_, Image>(&query)
            .bind(job_id)
            .fetch_all(pool)
            .await
    }

    /// A user's images, newest first.
    pub async fn list_for_user(pool: &PgPool, user_id: DbId) -> Result<Vec<Image>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM images WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2"
        );
        sqlx::query_as::<_, Image>(&query)
            .bind(user_id)
            .bind(USER_LIMIT)
            .fetch_all(pool)
            .await
    }

    /// Admin listing, optionally narrowed to one user.
    pub async fn list_filtered(
        pool: &PgPool,
        user_id: Option<DbId>,
    ) -> Result<Vec<Image>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM images \
             WHERE ($1::BIGINT IS NULL OR user_id = $1) \
             ORDER BY created_at DESC LIMIT $2"
        );
        sqlx::query_as::<_, Image>(&query)
            .bind(user_id)
            .bind(ADMIN_LIMIT)
            .fetch_all(pool)
            .await
    }

    /// Delete the given rows and return them, so callers can remove the
    /// stored objects as well.
    pub async fn delete_many(pool: &PgPool, ids: &[DbId]) -> Result<Vec<Image>, sqlx::Error> {
        let query = format!("DELETE FROM images WHERE id = ANY($1) RETURNING {COLUMNS}");
        sqlx::query_as::<_, Image>(&query)
            .bind(ids)
            .fetch_all(pool)
            .await
    }
}
