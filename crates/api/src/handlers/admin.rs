//! Admin-only handlers: profiles, jobs, images, platform stats and the
//! event log.
//!
//! Every handler takes [`RequireAdmin`].

use atelier_core::error::CoreError;
use atelier_core::job_kind::JobKind;
use atelier_core::roles::VALID_ROLES;
use atelier_core::types::DbId;
use atelier_db::models::event::JobEventRecord;
use atelier_db::models::image::Image;
use atelier_db::models::job::JobFilter;
use atelier_db::models::profile::{ProfileResponse, UpdateProfile};
use atelier_db::models::stats::PlatformStats;
use atelier_db::models::status::JobStatus;
use atelier_db::repositories::{EventRepo, ImageRepo, JobRepo, ProfileRepo, StatsRepo};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::handlers::jobs::JobResponse;
use crate::middleware::auth::RequireAdmin;
use crate::query::{PaginationParams, UserFilterParams};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// GET /api/v1/admin/users
pub async fn list_users(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<ProfileResponse>>>> {
    let profiles = ProfileRepo::list(&state.pool).await?;
    Ok(Json(DataResponse {
        data: profiles.iter().map(ProfileResponse::from).collect(),
    }))
}

/// PATCH /api/v1/admin/users/{id}
///
/// Change credits and/or role.
pub async fn update_user(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(user_id): Path<DbId>,
    Json(input): Json<UpdateProfile>,
) -> AppResult<Json<DataResponse<ProfileResponse>>> {
    validate_update(&input)?;

    let profile = ProfileRepo::update(&state.pool, user_id, &input)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Profile",
            id: user_id,
        }))?;

    tracing::info!(
        admin_id = admin.user_id,
        user_id,
        credits = ?input.credits,
        role = ?input.role,
        "Profile updated by admin"
    );
    Ok(Json(DataResponse {
        data: ProfileResponse::from(&profile),
    }))
}

/// DELETE /api/v1/admin/users/{id}
///
/// Removes the profile together with its jobs and image rows. Admins
/// cannot delete themselves.
pub async fn delete_user(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(user_id): Path<DbId>,
) -> AppResult<StatusCode> {
    if user_id == admin.user_id {
        return Err(AppError::Core(CoreError::Conflict(
            "Admins cannot delete their own profile".into(),
        )));
    }
    if !ProfileRepo::delete(&state.pool, user_id).await? {
        return Err(AppError::Core(CoreError::NotFound {
            entity: "Profile",
            id: user_id,
        }));
    }
    tracing::info!(admin_id = admin.user_id, user_id, "Profile deleted by admin");
    Ok(StatusCode::NO_CONTENT)
}

fn validate_update(input: &UpdateProfile) -> Result<(), AppError> {
    if let Some(credits) = input.credits {
        if credits < 0 {
            return Err(AppError::Core(CoreError::Validation(
                "credits must not be negative".into(),
            )));
        }
    }
    if let Some(role) = input.role.as_deref() {
        if !VALID_ROLES.contains(&role) {
            return Err(AppError::Core(CoreError::Validation(format!(
                "role must be one of: {}",
                VALID_ROLES.join(", ")
            ))));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

/// GET /api/v1/admin/jobs
///
/// Filters: `user_id`, `status` (name), `kind`, `limit` (max 100).
pub async fn list_jobs(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Query(filter): Query<JobFilter>,
) -> AppResult<Json<DataResponse<Vec<JobResponse>>>> {
    let status_id = parse_status_filter(filter.status.as_deref())?;
    if let Some(kind) = filter.kind.as_deref() {
        JobKind::from_name(kind)?;
    }

    let jobs = JobRepo::list_filtered(&state.pool, &filter, status_id).await?;
    Ok(Json(DataResponse {
        data: jobs.into_iter().map(JobResponse::from).collect(),
    }))
}

fn parse_status_filter(status: Option<&str>) -> Result<Option<i16>, AppError> {
    status
        .map(|name| {
            JobStatus::from_name(name).map(JobStatus::id).ok_or_else(|| {
                AppError::Core(CoreError::Validation(format!("Unknown job status '{name}'")))
            })
        })
        .transpose()
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

/// GET /api/v1/admin/images
///
/// Optionally narrowed with `?user_id=` (at most 200 rows).
pub async fn list_images(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Query(params): Query<UserFilterParams>,
) -> AppResult<Json<DataResponse<Vec<Image>>>> {
    let images = ImageRepo::list_filtered(&state.pool, params.user_id).await?;
    Ok(Json(DataResponse { data: images }))
}

#[derive(Debug, Deserialize)]
pub struct DeleteImagesRequest {
    pub image_ids: Vec<DbId>,
}

#[derive(Debug, Serialize)]
pub struct DeleteImagesResponse {
    pub deleted: usize,
}

/// DELETE /api/v1/admin/images
///
/// Deletes the rows first, then the stored objects. An object that cannot
/// be removed is logged and left behind.
pub async fn delete_images(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Json(input): Json<DeleteImagesRequest>,
) -> AppResult<Json<DataResponse<DeleteImagesResponse>>> {
    if input.image_ids.is_empty() {
        return Err(AppError::Core(CoreError::Validation(
            "image_ids must not be empty".into(),
        )));
    }

    let deleted = ImageRepo::delete_many(&state.pool, &input.image_ids).await?;
    for image in &deleted {
        if let Err(e) = state.pipeline.objects.delete(&image.storage_path).await {
            tracing::warn!(image_id = image.id, key = %image.storage_path, error = %e, "Failed to delete stored object");
        }
    }

    tracing::info!(admin_id = admin.user_id, deleted = deleted.len(), "Images deleted by admin");
    Ok(Json(DataResponse {
        data: DeleteImagesResponse {
            deleted: deleted.len(),
        },
    }))
}

// ---------------------------------------------------------------------------
// Stats & events
// ---------------------------------------------------------------------------

/// GET /api/v1/admin/stats
pub async fn stats(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<PlatformStats>>> {
    let stats = StatsRepo::platform(&state.pool).await?;
    Ok(Json(DataResponse { data: stats }))
}

/// `?job_id=` narrows the event log to one job.
#[derive(Debug, Default, Deserialize)]
pub struct EventLogParams {
    pub job_id: Option<DbId>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// GET /api/v1/admin/events
///
/// The whole log newest first (`?limit=` max 200, `?offset=`), or with
/// `?job_id=` that job's full history oldest first.
pub async fn list_events(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Query(params): Query<EventLogParams>,
) -> AppResult<Json<DataResponse<Vec<JobEventRecord>>>> {
    let events = match params.job_id {
        Some(job_id) => EventRepo::list_for_job(&state.pool, job_id).await?,
        None => {
            let page = PaginationParams {
                limit: params.limit,
                offset: params.offset,
            };
            EventRepo::list_recent(&state.pool, page.limit_or(50, 200), page.offset()).await?
        }
    };
    Ok(Json(DataResponse { data: events }))
}
