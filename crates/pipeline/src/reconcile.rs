//! Exactly-once persistence of completed engine jobs.
//!
//! Any number of callers (the worker loop, an orchestrator, the explicit
//! reconcile endpoint) may reconcile the same job at the same time. Image
//! rows are guarded by an existence check plus the unique
//! `(job_id, comfy_filename)` constraint, and the completion write is
//! conditional, so only one caller ever observes the transition and
//! publishes `job.completed`.

use std::fmt;

use atelier_comfyui::history::OutputAsset;
use atelier_core::error::CoreError;
use atelier_core::types::DbId;
use atelier_db::models::image::CreateImage;
use atelier_db::models::job::Job;
use atelier_db::models::status::JobStatus;
use atelier_events::{JobEvent, JobEventKind};
use atelier_storage::storage_key;
use serde::Serialize;
use serde_json::json;

use crate::PipelineContext;

/// What one reconcile call did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub job_id: DbId,
    /// Assets written by this call.
    pub stored: usize,
    /// Assets another call had already persisted.
    pub skipped_existing: usize,
    /// Assets that could not be fetched or stored.
    pub skipped_failed: usize,
    /// Whether this call moved the job to `completed`.
    pub transitioned: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("No job found for prompt id {0}")]
    UnknownJob(String),

    #[error("Job {0} has no engine job id")]
    NotSubmitted(DbId),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Why a single asset was skipped.
#[derive(Debug)]
enum AssetFailure {
    Fetch(String),
    Store(atelier_storage::StorageError),
    Insert(sqlx::Error),
}

impl fmt::Display for AssetFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetFailure::Fetch(e) => write!(f, "fetch failed: {e}"),
            AssetFailure::Store(e) => write!(f, "object store write failed: {e}"),
            AssetFailure::Insert(e) => write!(f, "image insert failed: {e}"),
        }
    }
}

enum AssetOutcome {
    Stored,
    AlreadyPresent,
}

pub struct Reconciler {
    ctx: PipelineContext,
}

impl Reconciler {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }

    /// Reconcile the job the engine knows as `prompt_id`.
    pub async fn reconcile_prompt(
        &self,
        prompt_id: &str,
        assets: &[OutputAsset],
    ) -> Result<ReconcileReport, ReconcileError> {
        let Some(job) = self.ctx.store.find_by_prompt_id(prompt_id).await? else {
            tracing::warn!(prompt_id = %prompt_id, "Completed prompt has no job row, dropping");
            return Err(ReconcileError::UnknownJob(prompt_id.to_string()));
        };
        self.reconcile(&job, assets).await
    }

    /// Persist `assets` for `job` and mark it completed.
    ///
    /// Only call this once the engine has reported completion. Per-asset
    /// failures are logged and counted; the job is still completed.
    pub async fn reconcile(
        &self,
        job: &Job,
        assets: &[OutputAsset],
    ) -> Result<ReconcileReport, ReconcileError> {
        let mut report = ReconcileReport {
            job_id: job.id,
            ..Default::default()
        };
        let Some(prompt_id) = job.prompt_id.as_deref() else {
            return Err(ReconcileError::NotSubmitted(job.id));
        };
        if job.status() == Some(JobStatus::Failed) {
            tracing::debug!(job_id = job.id, "Job already failed, not reconciling");
            return Ok(report);
        }
        let artifact_kind = job.job_kind()?.policy().artifact_kind;

        for asset in assets {
            let input = CreateImage {
                job_id: job.id,
                user_id: job.user_id,
                filename: asset.filename.clone(),
                comfy_filename: asset.filename.clone(),
                kind: artifact_kind,
                storage_path: storage_key(job.user_id, prompt_id, &asset.filename),
            };
            match self.persist_asset(asset, &input).await {
                Ok(AssetOutcome::Stored) => report.stored += 1,
                Ok(AssetOutcome::AlreadyPresent) => report.skipped_existing += 1,
                Err(failure) => {
                    report.skipped_failed += 1;
                    tracing::warn!(
                        job_id = job.id,
                        prompt_id = %prompt_id,
                        filename = %asset.filename,
                        error = %failure,
                        "Skipping output during reconciliation"
                    );
                }
            }
        }

        report.transitioned = self.ctx.store.mark_completed(job.id).await?;
        if report.transitioned {
            tracing::info!(
                job_id = job.id,
                user_id = job.user_id,
                prompt_id = %prompt_id,
                stored = report.stored,
                skipped_failed = report.skipped_failed,
                "Job completed"
            );
            self.ctx.events.publish(
                JobEvent::new(JobEventKind::Completed, job.id, job.user_id).with_payload(
                    json!({
                        "prompt_id": prompt_id,
                        "images": report.stored + report.skipped_existing,
                        "skipped": report.skipped_failed,
                    }),
                ),
            );
        }
        Ok(report)
    }

    async fn persist_asset(
        &self,
        asset: &OutputAsset,
        input: &CreateImage,
    ) -> Result<AssetOutcome, AssetFailure> {
        let exists = self
            .ctx
            .store
            .image_exists(input.job_id, &input.comfy_filename)
            .await
            .map_err(AssetFailure::Insert)?;
        if exists {
            return Ok(AssetOutcome::AlreadyPresent);
        }

        let data = self
            .ctx
            .engine
            .fetch_asset(asset)
            .await
            .map_err(|e| AssetFailure::Fetch(e.to_string()))?;
        self.ctx
            .objects
            .put(&input.storage_path, data)
            .await
            .map_err(AssetFailure::Store)?;

        match self.ctx.store.insert_image(input).await {
            Ok(Some(_)) => Ok(AssetOutcome::Stored),
            Ok(None) => Ok(AssetOutcome::AlreadyPresent),
            Err(e) => Err(AssetFailure::Insert(e)),
        }
    }

    /// `queued -> processing` once the engine has started executing.
    pub async fn mark_started(&self, job: &Job) -> Result<bool, ReconcileError> {
        let transitioned = self.ctx.store.mark_processing(job.id).await?;
        if transitioned {
            tracing::debug!(job_id = job.id, prompt_id = ?job.prompt_id, "Job started");
            self.ctx.events.publish(
                JobEvent::new(JobEventKind::Processing, job.id, job.user_id)
                    .with_payload(json!({ "prompt_id": job.prompt_id })),
            );
        }
        Ok(transitioned)
    }

    /// Fail `job` after the engine reported an error. Returns whether this
    /// call performed the transition.
    pub async fn fail(&self, job: &Job, message: &str) -> Result<bool, ReconcileError> {
        let transitioned = self.ctx.store.mark_failed(job.id, message).await?;
        if transitioned {
            tracing::warn!(
                job_id = job.id,
                user_id = job.user_id,
                prompt_id = ?job.prompt_id,
                error = %message,
                "Job failed"
            );
            self.ctx.events.publish(
                JobEvent::new(JobEventKind::Failed, job.id, job.user_id)
                    .with_payload(json!({ "prompt_id": job.prompt_id, "error": message })),
            );
        }
        Ok(transitioned)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::request::{GenerationRequest, JobParameters};
    use crate::store::JobStore;
    use crate::submit::submit_job;
    use crate::testing::{asset, harness, FakeEngine, Harness};
    use assert_matches::assert_matches;
    use atelier_core::job_kind::JobKind;
    use atelier_storage::ObjectStore;

    async fn submitted(h: &Harness) -> Job {
        let request = GenerationRequest::new(
            JobKind::Edit,
            JobParameters::new().with("image1", "cat.png").with("image2", "dog.png"),
        );
        submit_job(&h.ctx, 7, request).await.unwrap()
    }

    #[tokio::test]
    async fn second_reconcile_is_a_no_op() {
        let h = harness(FakeEngine::new());
        let job = submitted(&h).await;
        let reconciler = Reconciler::new(h.ctx.clone());
        let mut events = h.ctx.events.subscribe();
        let assets = [asset("202", "result1.png")];

        let first = reconciler.reconcile(&job, &assets).await.unwrap();
        assert_eq!(first.stored, 1);
        assert!(first.transitioned);
        let completed_at = h.store.find_job(job.id).await.unwrap().unwrap().completed_at;

        let second = reconciler.reconcile(&job, &assets).await.unwrap();
        assert_eq!(second.stored, 0);
        assert_eq!(second.skipped_existing, 1);
        assert!(!second.transitioned);

        let job = h.store.find_job(job.id).await.unwrap().unwrap();
        assert_eq!(job.status(), Some(JobStatus::Completed));
        assert_eq!(job.completed_at, completed_at);
        assert_eq!(h.store.list_images(job.id).await.unwrap().len(), 1);

        assert_eq!(events.recv().await.unwrap().kind, JobEventKind::Completed);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn outputs_land_under_user_and_prompt() {
        let h = harness(FakeEngine::new());
        let job = submitted(&h).await;
        Reconciler::new(h.ctx.clone())
            .reconcile(&job, &[asset("202", "result1.png"), asset("1326", "closeup.png")])
            .await
            .unwrap();

        assert_eq!(h.objects.keys(), vec!["7/abc/closeup.png", "7/abc/result1.png"]);
        assert_eq!(
            h.objects.get("7/abc/result1.png").await.unwrap(),
            bytes::Bytes::from_static(b"png:result1.png")
        );
        let images = h.store.list_images(job.id).await.unwrap();
        assert_eq!(images[0].kind, "generated");
        assert_eq!(images[0].storage_path, "7/abc/result1.png");
    }

    #[tokio::test]
    async fn concurrent_reconciles_insert_one_row() {
        let engine = FakeEngine::new();
        let h = harness(engine.clone());
        let job = submitted(&h).await;
        let reconciler = Arc::new(Reconciler::new(h.ctx.clone()));
        let assets = vec![asset("202", "result1.png")];

        let tasks: Vec<_> = (0..2)
            .map(|_| {
                let reconciler = reconciler.clone();
                let job = job.clone();
                let assets = assets.clone();
                tokio::spawn(async move { reconciler.reconcile(&job, &assets).await.unwrap() })
            })
            .collect();
        let mut reports = Vec::new();
        for task in tasks {
            reports.push(task.await.unwrap());
        }

        assert_eq!(h.store.list_images(job.id).await.unwrap().len(), 1);
        assert_eq!(reports.iter().filter(|r| r.transitioned).count(), 1);
        assert_eq!(reports.iter().map(|r| r.stored).sum::<usize>(), 1);
    }

    #[tokio::test]
    async fn failed_asset_is_skipped_and_job_still_completes() {
        let engine = FakeEngine::new().with_broken_asset("missing.png");
        let h = harness(engine);
        let job = submitted(&h).await;

        let report = Reconciler::new(h.ctx.clone())
            .reconcile(&job, &[asset("202", "missing.png"), asset("1326", "ok.png")])
            .await
            .unwrap();

        assert_eq!(report.skipped_failed, 1);
        assert_eq!(report.stored, 1);
        assert!(report.transitioned);
        let images = h.store.list_images(job.id).await.unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].comfy_filename, "ok.png");
    }

    #[tokio::test]
    async fn unknown_prompt_is_dropped() {
        let h = harness(FakeEngine::new());
        let result = Reconciler::new(h.ctx.clone())
            .reconcile_prompt("nope", &[asset("9", "x.png")])
            .await;
        assert_matches!(result, Err(ReconcileError::UnknownJob(id)) if id == "nope");
        assert!(h.objects.keys().is_empty());
    }

    #[tokio::test]
    async fn failed_job_is_not_completed() {
        let h = harness(FakeEngine::new());
        let job = submitted(&h).await;
        let reconciler = Reconciler::new(h.ctx.clone());

        assert!(reconciler.fail(&job, "CUDA out of memory").await.unwrap());
        assert!(!reconciler.fail(&job, "again").await.unwrap());

        let failed = h.store.find_job(job.id).await.unwrap().unwrap();
        let report = reconciler.reconcile(&failed, &[asset("202", "late.png")]).await.unwrap();
        assert!(!report.transitioned);
        assert_eq!(report.stored, 0);

        let job = h.store.find_job(job.id).await.unwrap().unwrap();
        assert_eq!(job.status(), Some(JobStatus::Failed));
        assert_eq!(job.error_message.as_deref(), Some("CUDA out of memory"));
    }
}
