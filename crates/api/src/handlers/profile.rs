//! Handler for `GET /profile`.

use atelier_core::error::CoreError;
use atelier_db::models::profile::ProfileResponse;
use atelier_db::repositories::ProfileRepo;
use axum::extract::State;
use axum::Json;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/profile
///
/// The caller's own profile.
pub async fn get_profile(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<ProfileResponse>>> {
    let profile = ProfileRepo::find_by_id(&state.pool, auth.user_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Profile",
            id: auth.user_id,
        }))?;
    Ok(Json(DataResponse {
        data: ProfileResponse::from(&profile),
    }))
}
