//! Handler for `POST /uploads`: forward an input image to the engine.

use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    /// The name the engine stored the image under. Job parameters must use
    /// this rather than the original filename.
    pub name: String,
}

/// POST /api/v1/uploads
///
/// Multipart form with a required `image` file field.
pub async fn upload_image(
    auth: AuthUser,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<DataResponse<UploadResponse>>)> {
    let mut image = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(multipart_error)?
    {
        if field.name() != Some("image") {
            continue;
        }
        let filename = sanitize_filename(field.file_name().unwrap_or("upload.png"));
        let data = field
            .bytes()
            .await
            .map_err(multipart_error)?;
        image = Some((filename, data));
    }

    let (filename, data) =
        image.ok_or_else(|| AppError::BadRequest("Missing required 'image' field".into()))?;
    if data.is_empty() {
        return Err(AppError::BadRequest("Uploaded image is empty".into()));
    }

    let size = data.len();
    let name = state.pipeline.engine.upload_image(data, &filename).await?;
    tracing::info!(user_id = auth.user_id, filename = %filename, name = %name, size, "Image uploaded to engine");

    Ok((StatusCode::CREATED, Json(DataResponse { data: UploadResponse { name } })))
}

/// Oversized bodies keep their 413; every other multipart failure is a 400.
fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(err.body_text())
    } else {
        AppError::BadRequest(err.body_text())
    }
}

/// Strip any client-supplied directory components.
fn sanitize_filename(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw).trim();
    if base.is_empty() || base == "." || base == ".." {
        "upload.png".to_string()
    } else {
        base.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directories_are_stripped() {
        assert_eq!(sanitize_filename("../../etc/cat.png"), "cat.png");
        assert_eq!(sanitize_filename("C:\\photos\\dog.jpg"), "dog.jpg");
        assert_eq!(sanitize_filename(".."), "upload.png");
        assert_eq!(sanitize_filename("plain.webp"), "plain.webp");
    }
}
