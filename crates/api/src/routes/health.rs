use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` while the database is unreachable.
    pub status: &'static str,
    pub version: &'static str,
    pub db_healthy: bool,
    pub object_store: &'static str,
    /// Jobs currently followed by in-process tracking loops.
    pub tracked_jobs: usize,
}

/// GET /health. Always 200 so load balancers can tell "up but degraded"
/// from "down".
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_healthy = match atelier_db::health_check(&state.pool).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Health check could not reach the database");
            false
        }
    };

    Json(HealthResponse {
        status: if db_healthy { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        db_healthy,
        object_store: state.pipeline.objects.backend_name(),
        tracked_jobs: state.orchestrator.active_count(),
    })
}

/// Mounted at the root, outside `/api/v1`.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
