//! Route definitions for the `/jobs` resource.
//!
//! All endpoints require authentication.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Routes mounted at `/jobs`.
///
/// ```text
/// GET    /                  -> list_jobs
/// POST   /                  -> create_job
/// GET    /{id}              -> get_job
/// GET    /{id}/status       -> job_status
/// POST   /{id}/reconcile    -> reconcile_job
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(jobs::list_jobs).post(jobs::create_job))
        .route("/{id}", get(jobs::get_job))
        .route("/{id}/status", get(jobs::job_status))
        .route("/{id}/reconcile", post(jobs::reconcile_job))
}
