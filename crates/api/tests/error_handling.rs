//! `AppError` to HTTP response mapping.
//!
//! These call `IntoResponse` directly; no router is involved.

use atelier_api::error::AppError;
use atelier_comfyui::poller::PollError;
use atelier_comfyui::submission::SubmitError;
use atelier_core::error::CoreError;
use atelier_pipeline::{PipelineError, ReconcileError};
use atelier_storage::StorageError;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use http_body_util::BodyExt;

async fn error_to_response(err: AppError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

#[tokio::test]
async fn not_found_returns_404() {
    let err = AppError::Core(CoreError::NotFound {
        entity: "Job",
        id: 42,
    });

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
    assert_eq!(json["error"], "Job with id 42 not found");
}

#[tokio::test]
async fn pipeline_validation_error_returns_400() {
    let err: AppError = PipelineError::Core(CoreError::Validation("prompt is required".into())).into();

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(json["error"], "prompt is required");
    assert!(json.get("details").is_none());
}

#[tokio::test]
async fn engine_rejection_carries_raw_body() {
    let err = AppError::Submit(SubmitError::EngineRejected {
        status: 400,
        body: r#"{"node_errors":{"9":"bad"}}"#.into(),
    });

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["code"], "ENGINE_REJECTED");
    assert_eq!(json["error"], "Engine rejected the request with status 400");
    assert_eq!(json["details"], r#"{"node_errors":{"9":"bad"}}"#);
}

#[tokio::test]
async fn missing_engine_job_id_returns_502() {
    let (status, json) = error_to_response(AppError::Submit(SubmitError::NoJobId)).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["code"], "ENGINE_NO_JOB_ID");
}

#[tokio::test]
async fn poll_failure_hides_the_transport_message() {
    let err = AppError::Poll(PollError::EngineQueryFailed("tcp reset by 10.0.0.3".into()));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["code"], "ENGINE_QUERY_FAILED");
    assert!(!json["error"].as_str().unwrap().contains("10.0.0.3"));
}

#[tokio::test]
async fn unsubmitted_job_reconcile_is_a_conflict() {
    let err: AppError = ReconcileError::NotSubmitted(9).into();

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "Job 9 was never accepted by the engine");
}

#[tokio::test]
async fn missing_object_returns_404_and_other_storage_errors_500() {
    let (status, _) =
        error_to_response(AppError::Storage(StorageError::NotFound("7/p/a.png".into()))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, json) =
        error_to_response(AppError::Storage(StorageError::Config("bucket missing".into()))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "An internal error occurred");
}

#[tokio::test]
async fn internal_error_is_sanitized() {
    let err = AppError::InternalError("secret database credentials leaked".into());

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "INTERNAL_ERROR");
    assert_eq!(json["error"], "An internal error occurred");
}

#[tokio::test]
async fn row_not_found_maps_to_404() {
    let (status, json) = error_to_response(AppError::Database(sqlx::Error::RowNotFound)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
}

#[tokio::test]
async fn payload_too_large_maps_to_413() {
    let (status, json) =
        error_to_response(AppError::PayloadTooLarge("length limit exceeded".into())).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json["code"], "PAYLOAD_TOO_LARGE");
}
