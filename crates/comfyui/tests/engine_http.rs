//! Submission and polling against a stand-in engine served by axum.

use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use atelier_comfyui::history::PollState;
use atelier_comfyui::submission::SubmitError;
use atelier_comfyui::{ComfyUIConfig, ComfyUIEngine, GenerationEngine};
use atelier_core::workflow_template::WorkflowGraph;
use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

#[derive(Clone, Default)]
struct FakeEngine {
    pending: usize,
    /// Raw response for `POST /prompt`: status and body.
    prompt_reply: Arc<Mutex<Option<(StatusCode, String)>>>,
    /// History document returned for every id.
    history: Arc<Mutex<Value>>,
    submitted: Arc<Mutex<Vec<Value>>>,
}

async fn queue(State(engine): State<FakeEngine>) -> Json<Value> {
    let pending: Vec<Value> = (0..engine.pending).map(|i| json!([i, "p"])).collect();
    Json(json!({ "queue_running": [], "queue_pending": pending }))
}

async fn prompt(State(engine): State<FakeEngine>, Json(body): Json<Value>) -> impl IntoResponse {
    engine.submitted.lock().unwrap().push(body);
    let (status, body) = engine
        .prompt_reply
        .lock()
        .unwrap()
        .clone()
        .unwrap_or((StatusCode::OK, r#"{"prompt_id":"abc","number":1}"#.into()));
    (status, body)
}

async fn history(
    State(engine): State<FakeEngine>,
    Path(_id): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if headers.get("cache-control").map(|v| v.as_bytes()) != Some(b"no-cache".as_slice()) {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "cacheable request" })));
    }
    (StatusCode::OK, Json(engine.history.lock().unwrap().clone()))
}

async fn upload(mut multipart: Multipart) -> impl IntoResponse {
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("image") {
            let name = field.file_name().unwrap_or("upload.png").to_string();
            return (
                StatusCode::OK,
                Json(json!({ "name": format!("stored_{name}"), "subfolder": "", "type": "input" })),
            );
        }
    }
    (StatusCode::BAD_REQUEST, Json(json!({ "error": "no image field" })))
}

async fn spawn_engine(engine: FakeEngine) -> ComfyUIEngine {
    let app = Router::new()
        .route("/queue", get(queue))
        .route("/prompt", post(prompt))
        .route("/history/{id}", get(history))
        .route("/upload/image", post(upload))
        .with_state(engine);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    ComfyUIEngine::new(&ComfyUIConfig::with_base_url(format!("http://{addr}"))).unwrap()
}

fn graph() -> WorkflowGraph {
    WorkflowGraph::from_value(json!({
        "9": { "class_type": "SaveImage", "inputs": { "filename_prefix": "test" } }
    }))
    .unwrap()
}

#[tokio::test]
async fn submit_reports_prompt_id_and_queue_position() {
    let fake = FakeEngine {
        pending: 2,
        ..Default::default()
    };
    let submitted = fake.submitted.clone();
    let engine = spawn_engine(fake).await;

    let job = engine.submit(&graph()).await.unwrap();
    assert_eq!(job.prompt_id, "abc");
    assert_eq!(job.queue_position, Some(3));

    let bodies = submitted.lock().unwrap();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["prompt"]["9"]["class_type"], "SaveImage");
    assert!(bodies[0]["client_id"].is_string());
}

#[tokio::test]
async fn rejection_body_is_passed_through() {
    let fake = FakeEngine::default();
    let raw = r#"{"error":{"type":"prompt_outputs_failed_validation"},"node_errors":{"9":{}}}"#;
    *fake.prompt_reply.lock().unwrap() = Some((StatusCode::BAD_REQUEST, raw.to_string()));
    let engine = spawn_engine(fake).await;

    let err = engine.submit(&graph()).await.unwrap_err();
    assert_matches!(err, SubmitError::EngineRejected { status: 400, body } if body == raw);
}

#[tokio::test]
async fn success_without_job_id_is_an_error() {
    let fake = FakeEngine::default();
    *fake.prompt_reply.lock().unwrap() = Some((StatusCode::OK, r#"{"number":4}"#.to_string()));
    let engine = spawn_engine(fake).await;

    assert_matches!(engine.submit(&graph()).await, Err(SubmitError::NoJobId));
}

#[tokio::test]
async fn poll_moves_from_pending_to_completed() {
    let fake = FakeEngine::default();
    let history = fake.history.clone();
    *history.lock().unwrap() = json!({});
    let engine = spawn_engine(fake).await;

    let first = engine.poll("abc").await.unwrap();
    assert_eq!(first.state, PollState::Pending);

    *history.lock().unwrap() = json!({
        "abc": {
            "status": { "status_str": "success", "completed": true },
            "outputs": { "9": { "images": [
                { "filename": "result1.png", "subfolder": "", "type": "output" }
            ] } }
        }
    });
    let second = engine.poll("abc").await.unwrap();
    assert_eq!(second.state, PollState::Completed);
    assert_eq!(second.filenames(), vec!["result1.png"]);
}

#[tokio::test]
async fn upload_returns_engine_side_name() {
    let engine = spawn_engine(FakeEngine::default()).await;
    let name = engine
        .upload_image(bytes::Bytes::from_static(b"\x89PNG"), "cat.png")
        .await
        .unwrap();
    assert_eq!(name, "stored_cat.png");
}
