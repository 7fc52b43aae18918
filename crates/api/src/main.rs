use std::sync::Arc;
use std::time::Duration;

use atelier_api::config::ServerConfig;
use atelier_api::router::build_app_router;
use atelier_api::state::AppState;
use atelier_comfyui::{ComfyUIConfig, ComfyUIEngine};
use atelier_events::{EventBus, EventPersistence};
use atelier_pipeline::{PgJobStore, PipelineContext};
use atelier_storage::StorageConfig;
use atelier_worker::process::{init_tracing, wait_for_signal};
use atelier_worker::{ReconcileWorker, WorkerConfig};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing("atelier_api=debug,atelier_pipeline=debug,tower_http=debug");

    let config = ServerConfig::from_env();
    let engine_config = ComfyUIConfig::from_env();
    let storage_config = StorageConfig::from_env();
    if let Err(e) = storage_config.validate() {
        panic!("Invalid storage configuration: {e}");
    }
    let worker_config = WorkerConfig::from_env();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = atelier_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    atelier_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database ready");

    let engine = ComfyUIEngine::new(&engine_config).expect("Failed to build ComfyUI client");
    let objects = atelier_storage::from_config(&storage_config)
        .await
        .expect("Failed to initialise object store");
    tracing::info!(
        engine = %engine_config.base_url,
        objects = objects.backend_name(),
        "Collaborators ready"
    );

    let events = Arc::new(EventBus::default());
    let pipeline = PipelineContext {
        engine: Arc::new(engine),
        store: Arc::new(PgJobStore::new(pool.clone())),
        objects,
        events: events.clone(),
    };
    let state = AppState::new(
        pool.clone(),
        config.clone(),
        pipeline.clone(),
        engine_config.poll_interval,
    );
    let shutdown = state.shutdown.clone();

    // Persistence has its own token: it must outlive the tracking tasks and
    // the worker so their final events are written.
    let persistence_stop = CancellationToken::new();
    let persistence = tokio::spawn(EventPersistence::run(
        pool,
        events.subscribe(),
        persistence_stop.clone(),
    ));

    let worker = ReconcileWorker::new(pipeline, worker_config);
    let worker_stop = shutdown.child_token();
    let worker_task = tokio::spawn(async move { worker.run(worker_stop).await });

    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .expect("Failed to bind listener");
    tracing::info!(addr = %config.bind_addr(), "Listening");

    axum::serve(listener, build_app_router(state, &config))
        .with_graceful_shutdown(wait_for_signal())
        .await
        .expect("Server error");

    shutdown.cancel();
    if tokio::time::timeout(Duration::from_secs(config.shutdown_timeout_secs), worker_task)
        .await
        .is_err()
    {
        tracing::warn!("Reconcile worker did not stop within the grace period");
    }
    persistence_stop.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), persistence).await;
    tracing::info!("Shutdown complete");
}
