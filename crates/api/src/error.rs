use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use atelier_comfyui::poller::PollError;
use atelier_comfyui::submission::SubmitError;
use atelier_core::error::CoreError;
use atelier_pipeline::{PipelineError, ReconcileError};
use atelier_storage::StorageError;

/// Application-level error type for HTTP handlers.
///
/// Wraps the domain errors of every crate the handlers call into and
/// renders them as `{ "error", "code" }` JSON bodies. Engine rejections
/// additionally carry the engine's raw response in `details`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Submitting or uploading to the engine failed.
    #[error(transparent)]
    Submit(#[from] SubmitError),

    /// A status query against the engine failed.
    #[error(transparent)]
    Poll(#[from] PollError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Core(e) => AppError::Core(e),
            PipelineError::Submit(e) => AppError::Submit(e),
            PipelineError::Database(e) => AppError::Database(e),
        }
    }
}

impl From<ReconcileError> for AppError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::UnknownJob(prompt_id) => {
                AppError::BadRequest(format!("No job found for prompt id {prompt_id}"))
            }
            ReconcileError::NotSubmitted(id) => AppError::Core(CoreError::Conflict(format!(
                "Job {id} was never accepted by the engine"
            ))),
            ReconcileError::Core(e) => AppError::Core(e),
            ReconcileError::Database(e) => AppError::Database(e),
        }
    }
}

/// JSON body of every error response.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
    /// Raw engine response, only for engine rejections.
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

struct Reply {
    status: StatusCode,
    body: ErrorBody,
}

impl Reply {
    fn new(status: StatusCode, code: &'static str, error: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                error: error.into(),
                code,
                details: None,
            },
        }
    }

    fn with_details(mut self, details: &str) -> Self {
        self.body.details = Some(details.to_string());
        self
    }

    /// 500 with a fixed message; the cause only goes to the log.
    fn internal(cause: &dyn std::fmt::Display) -> Self {
        tracing::error!(error = %cause, "Request failed with an internal error");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "An internal error occurred",
        )
    }

    fn bad_gateway(code: &'static str, error: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, code, error)
    }
}

impl AppError {
    fn reply(&self) -> Reply {
        match self {
            AppError::Core(core) => core_reply(core),
            AppError::Database(err) => database_reply(err),

            AppError::Submit(SubmitError::EngineRejected { status, body }) => Reply::bad_gateway(
                "ENGINE_REJECTED",
                format!("Engine rejected the request with status {status}"),
            )
            .with_details(body),
            AppError::Submit(SubmitError::NoJobId) => Reply::bad_gateway(
                "ENGINE_NO_JOB_ID",
                "Engine accepted the workflow but returned no job id",
            ),
            AppError::Submit(SubmitError::Request(e)) => {
                tracing::warn!(error = %e, "Engine unreachable");
                Reply::bad_gateway(
                    "ENGINE_UNAVAILABLE",
                    "The generation engine could not be reached",
                )
            }
            AppError::Poll(PollError::EngineQueryFailed(msg)) => {
                tracing::warn!(error = %msg, "Engine status query failed");
                Reply::bad_gateway(
                    "ENGINE_QUERY_FAILED",
                    "The engine status query failed; try again",
                )
            }

            AppError::Storage(StorageError::NotFound(key)) => Reply::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("Stored object {key} not found"),
            ),
            AppError::Storage(other) => Reply::internal(other),

            AppError::BadRequest(msg) => Reply::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            AppError::PayloadTooLarge(msg) => {
                Reply::new(StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE", msg)
            }
            AppError::InternalError(msg) => Reply::internal(msg),
        }
    }
}

fn core_reply(err: &CoreError) -> Reply {
    let (status, code) = match err {
        CoreError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        CoreError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
        CoreError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
        CoreError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
        CoreError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
        CoreError::Internal(msg) => return Reply::internal(msg),
    };
    let message = match err {
        CoreError::NotFound { entity, id } => format!("{entity} with id {id} not found"),
        CoreError::Validation(msg)
        | CoreError::Conflict(msg)
        | CoreError::Unauthorized(msg)
        | CoreError::Forbidden(msg)
        | CoreError::Internal(msg) => msg.clone(),
    };
    Reply::new(status, code, message)
}

/// `RowNotFound` is a 404 and a unique violation on a `uq_`-named
/// constraint is a 409 (Postgres SQLSTATE 23505). Anything else is a 500.
fn database_reply(err: &sqlx::Error) -> Reply {
    match err {
        sqlx::Error::RowNotFound => {
            Reply::new(StatusCode::NOT_FOUND, "NOT_FOUND", "Resource not found")
        }
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            match db.constraint().filter(|c| c.starts_with("uq_")) {
                Some(constraint) => Reply::new(
                    StatusCode::CONFLICT,
                    "CONFLICT",
                    format!("Duplicate value violates unique constraint: {constraint}"),
                ),
                None => Reply::internal(db),
            }
        }
        other => Reply::internal(other),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let Reply { status, body } = self.reply();
        (status, Json(body)).into_response()
    }
}
