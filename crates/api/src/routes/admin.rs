//! Route definitions for `/admin`. Every handler requires the admin role.

use axum::routing::{get, patch};
use axum::Router;

use crate::handlers::admin;
use crate::state::AppState;

/// Routes mounted at `/admin`.
///
/// ```text
/// GET    /users          -> list_users
/// PATCH  /users/{id}     -> update_user
/// DELETE /users/{id}     -> delete_user
/// GET    /jobs           -> list_jobs
/// GET    /images         -> list_images
/// DELETE /images         -> delete_images
/// GET    /stats          -> stats
/// GET    /events         -> list_events
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(admin::list_users))
        .route(
            "/users/{id}",
            patch(admin::update_user).delete(admin::delete_user),
        )
        .route("/jobs", get(admin::list_jobs))
        .route(
            "/images",
            get(admin::list_images).delete(admin::delete_images),
        )
        .route("/stats", get(admin::stats))
        .route("/events", get(admin::list_events))
}
