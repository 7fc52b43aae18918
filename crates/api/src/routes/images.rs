use axum::routing::get;
use axum::Router;

use crate::handlers::images;
use crate::state::AppState;

/// Routes mounted at `/images`.
///
/// ```text
/// GET /                -> list_images
/// GET /{id}/content    -> image_content
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(images::list_images))
        .route("/{id}/content", get(images::image_content))
}
