//! Handlers for the `/jobs` resource.
//!
//! All endpoints require authentication via [`AuthUser`]. Users see their
//! own jobs; admins may read any job.

use atelier_comfyui::history::{progress_step, PollResult, PollState};
use atelier_core::error::CoreError;
use atelier_core::types::DbId;
use atelier_db::models::job::Job;
use atelier_pipeline::submit::submit_job;
use atelier_pipeline::{GenerationRequest, ReconcileReport};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::query::PaginationParams;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// A job row plus its status name.
#[derive(Debug, Serialize)]
pub struct JobResponse {
    #[serde(flatten)]
    pub job: Job,
    pub status: &'static str,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        let status = job.status().map(|s| s.name()).unwrap_or("unknown");
        Self { job, status }
    }
}

/// `GET /jobs/{id}/status` payload.
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: DbId,
    /// Persisted status.
    pub status: &'static str,
    pub prompt_id: Option<String>,
    pub queue_position: Option<i32>,
    pub error_message: Option<String>,
    /// Live engine answer; absent once the job is terminal.
    pub engine: Option<PollResult>,
    /// Stage label for multi-stage kinds.
    pub step: Option<&'static str>,
}

/// `POST /jobs/{id}/reconcile` payload.
#[derive(Debug, Serialize)]
pub struct ReconcileResponse {
    pub job: JobResponse,
    /// Absent when the engine reported an error and the job was failed.
    pub report: Option<ReconcileReport>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Fetch a job by id and verify the caller owns it (or is admin).
async fn find_and_authorize(state: &AppState, job_id: DbId, auth: &AuthUser) -> AppResult<Job> {
    let job = state
        .pipeline
        .store
        .find_job(job_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Job",
            id: job_id,
        }))?;
    auth.ensure_can_access(job.user_id, "job")?;
    Ok(job)
}

async fn reload(state: &AppState, job_id: DbId) -> AppResult<Job> {
    state
        .pipeline
        .store
        .find_job(job_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Job",
            id: job_id,
        }))
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
///
/// Build the workflow for `kind`, submit it and record the job. Returns
/// 201 with the job; a tracking loop then drives it to a terminal state in
/// the background.
pub async fn create_job(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(request): Json<GenerationRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<JobResponse>>)> {
    let job = submit_job(&state.pipeline, auth.user_id, request).await?;

    // The handle is dropped; the loop runs until the job settles, times
    // out or the server shuts down.
    let _ = state
        .orchestrator
        .spawn(job.clone(), state.shutdown.child_token());

    Ok((StatusCode::CREATED, Json(DataResponse { data: job.into() })))
}

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs
///
/// The caller's jobs, newest first (`?limit=`, default 50, max 100).
pub async fn list_jobs(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<DataResponse<Vec<JobResponse>>>> {
    let jobs = state
        .pipeline
        .store
        .list_for_user(auth.user_id, params.limit)
        .await?;
    Ok(Json(DataResponse {
        data: jobs.into_iter().map(JobResponse::from).collect(),
    }))
}

/// GET /api/v1/jobs/{id}
pub async fn get_job(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<Json<DataResponse<JobResponse>>> {
    let job = find_and_authorize(&state, job_id, &auth).await?;
    Ok(Json(DataResponse { data: job.into() }))
}

/// GET /api/v1/jobs/{id}/status
///
/// Report the persisted status together with a live engine query. Nothing
/// is written: completed outputs are persisted by the tracking loop, the
/// worker or `POST /jobs/{id}/reconcile`.
pub async fn job_status(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<Json<DataResponse<JobStatusResponse>>> {
    let job = find_and_authorize(&state, job_id, &auth).await?;

    let engine = match job.prompt_id.as_deref() {
        Some(prompt_id) if !job.is_terminal() => Some(state.pipeline.engine.poll(prompt_id).await?),
        _ => None,
    };
    let step = match (&engine, job.job_kind()) {
        (Some(result), Ok(kind)) => progress_step(kind, &result.assets),
        _ => None,
    };

    Ok(Json(DataResponse {
        data: JobStatusResponse {
            job_id: job.id,
            status: job.status().map(|s| s.name()).unwrap_or("unknown"),
            prompt_id: job.prompt_id,
            queue_position: job.queue_position,
            error_message: job.error_message,
            engine,
            step,
        },
    }))
}

// ---------------------------------------------------------------------------
// Reconcile
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/{id}/reconcile
///
/// Query the engine once and persist the outcome. Safe to repeat: outputs
/// already stored are skipped, and the status only moves forward. Returns
/// 409 while the engine is still working on the job.
pub async fn reconcile_job(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<Json<DataResponse<ReconcileResponse>>> {
    let job = find_and_authorize(&state, job_id, &auth).await?;
    let Some(prompt_id) = job.prompt_id.as_deref() else {
        return Err(AppError::Core(CoreError::Conflict(format!(
            "Job {job_id} was never accepted by the engine"
        ))));
    };

    let result = state.pipeline.engine.poll(prompt_id).await?;
    let reconciler = state.orchestrator.reconciler();
    let report = match result.state {
        PollState::Completed => Some(reconciler.reconcile(&job, &result.assets).await?),
        PollState::Error { messages } => {
            reconciler.fail(&job, &messages.join("; ")).await?;
            None
        }
        PollState::Pending | PollState::Running => {
            return Err(AppError::Core(CoreError::Conflict(
                "Job has not finished on the engine yet".into(),
            )));
        }
    };

    tracing::info!(job_id, user_id = auth.user_id, ?report, "Explicit reconcile");
    let job = reload(&state, job_id).await?;
    Ok(Json(DataResponse {
        data: ReconcileResponse {
            job: job.into(),
            report,
        },
    }))
}
