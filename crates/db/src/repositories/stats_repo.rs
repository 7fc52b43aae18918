//! Aggregate counters across profiles, jobs and images.

use sqlx::PgPool;

use crate::models::stats::PlatformStats;
use crate::models::status::JobStatus;

pub struct StatsRepo;

impl StatsRepo {
    pub async fn platform(pool: &PgPool) -> Result<PlatformStats, sqlx::Error> {
        let (users, jobs, completed, failed, images): (i64, i64, i64, i64, i64) = sqlx::query_as(
            "SELECT \
                (SELECT COUNT(*) FROM profiles), \
                (SELECT COUNT(*) FROM jobs), \
                (SELECT COUNT(*) FROM jobs WHERE status_id = $1), \
                (SELECT COUNT(*) FROM jobs WHERE status_id = $2), \
                (SELECT COUNT(*) FROM images)",
        )
        .bind(JobStatus::Completed.id())
        .bind(JobStatus::Failed.id())
        .fetch_one(pool)
        .await?;

        Ok(PlatformStats::from_counts(users, jobs, completed, failed, images))
    }
}
