//! Handlers for the `/images` resource.

use atelier_core::error::CoreError;
use atelier_core::types::DbId;
use atelier_db::models::image::Image;
use atelier_db::repositories::ImageRepo;
use axum::extract::{Path, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::response::IntoResponse;
use axum::Json;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/images
///
/// The caller's images, newest first (at most 100).
pub async fn list_images(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<Image>>>> {
    let images = ImageRepo::list_for_user(&state.pool, auth.user_id).await?;
    Ok(Json(DataResponse { data: images }))
}

/// GET /api/v1/images/{id}/content
///
/// Stream the stored bytes of one image (owner or admin).
pub async fn image_content(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(image_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let image = ImageRepo::find_by_id(&state.pool, image_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Image",
            id: image_id,
        }))?;
    auth.ensure_can_access(image.user_id, "image")?;

    let data = state.pipeline.objects.get(&image.storage_path).await?;
    Ok((
        [
            (CONTENT_TYPE, content_type_for(&image.filename)),
            (CACHE_CONTROL, "private, max-age=86400"),
        ],
        data,
    ))
}

fn content_type_for(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_follows_extension() {
        assert_eq!(content_type_for("ComfyUI_00001_.png"), "image/png");
        assert_eq!(content_type_for("photo.JPEG"), "image/jpeg");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }
}
