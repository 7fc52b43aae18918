pub mod admin;
pub mod auth;
pub mod health;
pub mod images;
pub mod jobs;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::config::ServerConfig;
use crate::handlers;
use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /auth/signup                     signup (public)
/// /auth/login                      login (public)
///
/// /profile                         caller's profile
/// /uploads                         forward an input image to the engine
///                                  (body limit `upload_max_bytes`)
/// /translate                       prompt translation
///
/// /jobs                            list, create
/// /jobs/{id}                       get
/// /jobs/{id}/status                live status (read only)
/// /jobs/{id}/reconcile             persist a finished job (POST)
///
/// /images                          caller's images
/// /images/{id}/content             stored bytes
///
/// /admin/users                     list (admin only)
/// /admin/users/{id}                update, delete
/// /admin/jobs                      filtered listing
/// /admin/images                    list, bulk delete
/// /admin/stats                     platform counters
/// /admin/events                    persisted event log
/// ```
pub fn api_routes(config: &ServerConfig) -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .route("/profile", get(handlers::profile::get_profile))
        .route(
            "/uploads",
            post(handlers::uploads::upload_image)
                .layer(DefaultBodyLimit::max(config.upload_max_bytes)),
        )
        .route("/translate", post(handlers::translate::translate))
        .nest("/jobs", jobs::router())
        .nest("/images", images::router())
        .nest("/admin", admin::router())
}
