//! Job and image persistence seen by the pipeline.
//!
//! [`PgJobStore`] forwards to the repositories. [`MemoryJobStore`] keeps the
//! same guarded-transition and uniqueness rules in memory so the protocol
//! can be exercised without a database.

use std::sync::Mutex;

use async_trait::async_trait;
use atelier_core::types::DbId;
use atelier_db::models::image::{CreateImage, Image};
use atelier_db::models::job::{CreateJob, Job};
use atelier_db::models::status::JobStatus;
use atelier_db::repositories::{ImageRepo, JobRepo};
use chrono::{Duration, Utc};
use sqlx::PgPool;

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(&self, input: &CreateJob) -> Result<Job, sqlx::Error>;

    /// Write the engine job id once. `false` when one was already set.
    async fn attach_prompt_id(&self, job_id: DbId, prompt_id: &str) -> Result<bool, sqlx::Error>;

    async fn find_job(&self, job_id: DbId) -> Result<Option<Job>, sqlx::Error>;

    async fn find_by_prompt_id(&self, prompt_id: &str) -> Result<Option<Job>, sqlx::Error>;

    /// A user's jobs, newest first.
    async fn list_for_user(&self, user_id: DbId, limit: Option<i64>) -> Result<Vec<Job>, sqlx::Error>;

    /// Non-terminal jobs with an engine id, oldest first.
    async fn list_open(&self, limit: i64) -> Result<Vec<Job>, sqlx::Error>;

    /// Non-terminal jobs older than `older_than_mins`, oldest first.
    async fn list_stale(&self, older_than_mins: i32, limit: i64) -> Result<Vec<Job>, sqlx::Error>;

    async fn mark_processing(&self, job_id: DbId) -> Result<bool, sqlx::Error>;

    /// `true` only for the caller that performed the transition.
    async fn mark_completed(&self, job_id: DbId) -> Result<bool, sqlx::Error>;

    /// `true` only for the caller that performed the transition.
    async fn mark_failed(&self, job_id: DbId, message: &str) -> Result<bool, sqlx::Error>;

    async fn image_exists(&self, job_id: DbId, comfy_filename: &str) -> Result<bool, sqlx::Error>;

    /// `None` when the `(job, comfy_filename)` row already exists.
    async fn insert_image(&self, input: &CreateImage) -> Result<Option<Image>, sqlx::Error>;

    async fn list_images(&self, job_id: DbId) -> Result<Vec<Image>, sqlx::Error>;
}

// ---------------------------------------------------------------------------
// Postgres
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create_job(&self, input: &CreateJob) -> Result<Job, sqlx::Error> {
        JobRepo::create(&self.pool, input).await
    }

    async fn attach_prompt_id(&self, job_id: DbId, prompt_id: &str) -> Result<bool, sqlx::Error> {
        JobRepo::attach_prompt_id(&self.pool, job_id, prompt_id).await
    }

    async fn find_job(&self, job_id: DbId) -> Result<Option<Job>, sqlx::Error> {
        JobRepo::find_by_id(&self.pool, job_id).await
    }

    async fn find_by_prompt_id(&self, prompt_id: &str) -> Result<Option<Job>, sqlx::Error> {
        JobRepo::find_by_prompt_id(&self.pool, prompt_id).await
    }

    async fn list_for_user(&self, user_id: DbId, limit: Option<i64>) -> Result<Vec<Job>, sqlx::Error> {
        JobRepo::list_for_user(&self.pool, user_id, limit).await
    }

    async fn list_open(&self, limit: i64) -> Result<Vec<Job>, sqlx::Error> {
        JobRepo::list_open(&self.pool, limit).await
    }

    async fn list_stale(&self, older_than_mins: i32, limit: i64) -> Result<Vec<Job>, sqlx::Error> {
        JobRepo::list_stale(&self.pool, older_than_mins, limit).await
    }

    async fn mark_processing(&self, job_id: DbId) -> Result<bool, sqlx::Error> {
        JobRepo::mark_processing(&self.pool, job_id).await
    }

    async fn mark_completed(&self, job_id: DbId) -> Result<bool, sqlx::Error> {
        JobRepo::mark_completed(&self.pool, job_id).await
    }

    async fn mark_failed(&self, job_id: DbId, message: &str) -> Result<bool, sqlx::Error> {
        JobRepo::mark_failed(&self.pool, job_id, message).await
    }

    async fn image_exists(&self, job_id: DbId, comfy_filename: &str) -> Result<bool, sqlx::Error> {
        ImageRepo::exists(&self.pool, job_id, comfy_filename).await
    }

    async fn insert_image(&self, input: &CreateImage) -> Result<Option<Image>, sqlx::Error> {
        ImageRepo::insert_if_absent(&self.pool, input).await
    }

    async fn list_images(&self, job_id: DbId) -> Result<Vec<Image>, sqlx::Error> {
        ImageRepo::list_for_job(&self.pool, job_id).await
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Tables {
    jobs: Vec<Job>,
    images: Vec<Image>,
}

/// In-process [`JobStore`] with the same conditional-write semantics as the
/// database.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    tables: Mutex<Tables>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Shift a job's creation time into the past.
    pub fn backdate(&self, job_id: DbId, minutes: i64) {
        let mut tables = self.lock();
        if let Some(job) = tables.jobs.iter_mut().find(|j| j.id == job_id) {
            job.created_at -= Duration::minutes(minutes);
        }
    }

    /// Apply `update` to a non-terminal job. Returns whether it ran.
    fn transition(&self, job_id: DbId, allowed: &[JobStatus], update: impl FnOnce(&mut Job)) -> bool {
        let mut tables = self.lock();
        match tables.jobs.iter_mut().find(|j| j.id == job_id) {
            Some(job) if job.status().is_some_and(|s| allowed.contains(&s)) => {
                update(job);
                job.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }
}

const OPEN_STATUSES: [JobStatus; 2] = [JobStatus::Queued, JobStatus::Processing];

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create_job(&self, input: &CreateJob) -> Result<Job, sqlx::Error> {
        let mut tables = self.lock();
        let now = Utc::now();
        let job = Job {
            id: tables.jobs.len() as DbId + 1,
            user_id: input.user_id,
            kind: input.kind.as_str().to_string(),
            status_id: input.status.id(),
            queue_position: input.queue_position,
            prompt_id: None,
            parameters: input.parameters.clone(),
            error_message: None,
            created_at: now,
            started_at: (input.status == JobStatus::Processing).then_some(now),
            completed_at: None,
            updated_at: now,
        };
        tables.jobs.push(job.clone());
        Ok(job)
    }

    async fn attach_prompt_id(&self, job_id: DbId, prompt_id: &str) -> Result<bool, sqlx::Error> {
        let mut tables = self.lock();
        match tables.jobs.iter_mut().find(|j| j.id == job_id) {
            Some(job) if job.prompt_id.is_none() => {
                job.prompt_id = Some(prompt_id.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_job(&self, job_id: DbId) -> Result<Option<Job>, sqlx::Error> {
        Ok(self.lock().jobs.iter().find(|j| j.id == job_id).cloned())
    }

    async fn find_by_prompt_id(&self, prompt_id: &str) -> Result<Option<Job>, sqlx::Error> {
        Ok(self
            .lock()
            .jobs
            .iter()
            .find(|j| j.prompt_id.as_deref() == Some(prompt_id))
            .cloned())
    }

    async fn list_for_user(&self, user_id: DbId, limit: Option<i64>) -> Result<Vec<Job>, sqlx::Error> {
        let limit = limit.unwrap_or(50).clamp(1, 100) as usize;
        Ok(self
            .lock()
            .jobs
            .iter()
            .rev()
            .filter(|j| j.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_open(&self, limit: i64) -> Result<Vec<Job>, sqlx::Error> {
        Ok(self
            .lock()
            .jobs
            .iter()
            .filter(|j| !j.is_terminal() && j.prompt_id.is_some())
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn list_stale(&self, older_than_mins: i32, limit: i64) -> Result<Vec<Job>, sqlx::Error> {
        let cutoff = Utc::now() - Duration::minutes(i64::from(older_than_mins));
        Ok(self
            .lock()
            .jobs
            .iter()
            .filter(|j| !j.is_terminal() && j.created_at < cutoff)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn mark_processing(&self, job_id: DbId) -> Result<bool, sqlx::Error> {
        Ok(self.transition(job_id, &[JobStatus::Queued], |job| {
            job.status_id = JobStatus::Processing.id();
            job.started_at.get_or_insert_with(Utc::now);
        }))
    }

    async fn mark_completed(&self, job_id: DbId) -> Result<bool, sqlx::Error> {
        Ok(self.transition(job_id, &OPEN_STATUSES, |job| {
            let now = Utc::now();
            job.status_id = JobStatus::Completed.id();
            job.completed_at = Some(now);
            job.started_at.get_or_insert(now);
        }))
    }

    async fn mark_failed(&self, job_id: DbId, message: &str) -> Result<bool, sqlx::Error> {
        Ok(self.transition(job_id, &OPEN_STATUSES, |job| {
            job.status_id = JobStatus::Failed.id();
            job.error_message = Some(message.to_string());
            job.completed_at = Some(Utc::now());
        }))
    }

    async fn image_exists(&self, job_id: DbId, comfy_filename: &str) -> Result<bool, sqlx::Error> {
        Ok(self
            .lock()
            .images
            .iter()
            .any(|i| i.job_id == job_id && i.comfy_filename == comfy_filename))
    }

    async fn insert_image(&self, input: &CreateImage) -> Result<Option<Image>, sqlx::Error> {
        let mut tables = self.lock();
        let duplicate = tables
            .images
            .iter()
            .any(|i| i.job_id == input.job_id && i.comfy_filename == input.comfy_filename);
        if duplicate {
            return Ok(None);
        }
        let image = Image {
            id: tables.images.len() as DbId + 1,
            job_id: input.job_id,
            user_id: input.user_id,
            filename: input.filename.clone(),
            comfy_filename: input.comfy_filename.clone(),
            kind: input.kind.as_str().to_string(),
            storage_path: input.storage_path.clone(),
            created_at: Utc::now(),
        };
        tables.images.push(image.clone());
        Ok(Some(image))
    }

    async fn list_images(&self, job_id: DbId) -> Result<Vec<Image>, sqlx::Error> {
        Ok(self
            .lock()
            .images
            .iter()
            .filter(|i| i.job_id == job_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_core::job_kind::{ArtifactKind, JobKind};
    use serde_json::json;

    fn new_job(status: JobStatus) -> CreateJob {
        CreateJob {
            user_id: 7,
            kind: JobKind::Edit,
            status,
            queue_position: None,
            parameters: json!({}),
        }
    }

    #[tokio::test]
    async fn prompt_id_is_written_once() {
        let store = MemoryJobStore::new();
        let job = store.create_job(&new_job(JobStatus::Processing)).await.unwrap();
        assert!(job.started_at.is_some());

        assert!(store.attach_prompt_id(job.id, "abc").await.unwrap());
        assert!(!store.attach_prompt_id(job.id, "xyz").await.unwrap());
        let job = store.find_job(job.id).await.unwrap().unwrap();
        assert_eq!(job.prompt_id.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn terminal_status_is_final() {
        let store = MemoryJobStore::new();
        let job = store.create_job(&new_job(JobStatus::Queued)).await.unwrap();

        assert!(store.mark_processing(job.id).await.unwrap());
        assert!(!store.mark_processing(job.id).await.unwrap());
        assert!(store.mark_completed(job.id).await.unwrap());
        assert!(!store.mark_completed(job.id).await.unwrap());
        assert!(!store.mark_failed(job.id, "late").await.unwrap());

        let job = store.find_job(job.id).await.unwrap().unwrap();
        assert_eq!(job.status(), Some(JobStatus::Completed));
        assert_eq!(job.error_message, None);
    }

    #[tokio::test]
    async fn duplicate_image_is_not_inserted() {
        let store = MemoryJobStore::new();
        let input = CreateImage {
            job_id: 1,
            user_id: 7,
            filename: "result1.png".into(),
            comfy_filename: "result1.png".into(),
            kind: ArtifactKind::Generated,
            storage_path: "7/abc/result1.png".into(),
        };
        assert!(store.insert_image(&input).await.unwrap().is_some());
        assert!(store.insert_image(&input).await.unwrap().is_none());
        assert_eq!(store.list_images(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn open_and_stale_listings() {
        let store = MemoryJobStore::new();
        let submitted = store.create_job(&new_job(JobStatus::Queued)).await.unwrap();
        store.attach_prompt_id(submitted.id, "abc").await.unwrap();
        let unsubmitted = store.create_job(&new_job(JobStatus::Processing)).await.unwrap();

        let open: Vec<DbId> = store.list_open(10).await.unwrap().iter().map(|j| j.id).collect();
        assert_eq!(open, vec![submitted.id]);

        assert!(store.list_stale(30, 10).await.unwrap().is_empty());
        store.backdate(unsubmitted.id, 45);
        let stale: Vec<DbId> = store.list_stale(30, 10).await.unwrap().iter().map(|j| j.id).collect();
        assert_eq!(stale, vec![unsubmitted.id]);
    }

    #[tokio::test]
    async fn user_listing_is_newest_first_and_scoped() {
        let store = MemoryJobStore::new();
        let first = store.create_job(&new_job(JobStatus::Queued)).await.unwrap();
        let mut other = new_job(JobStatus::Queued);
        other.user_id = 8;
        store.create_job(&other).await.unwrap();
        let second = store.create_job(&new_job(JobStatus::Queued)).await.unwrap();

        let ids: Vec<DbId> = store.list_for_user(7, None).await.unwrap().iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
        assert_eq!(store.list_for_user(7, Some(1)).await.unwrap().len(), 1);
    }
}
