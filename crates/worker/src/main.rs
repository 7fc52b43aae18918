use std::sync::Arc;
use std::time::Duration;

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
    init_tracing("atelier_worker=debug,atelier_pipeline=debug");

    let worker_config = WorkerConfig::from_env();
    let engine_config = ComfyUIConfig::from_env();
    let storage_config = StorageConfig::from_env();
    if let Err(e) = storage_config.validate() {
        panic!("Invalid storage configuration: {e}");
    }

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = atelier_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    atelier_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    let engine = ComfyUIEngine::new(&engine_config).expect("Failed to build ComfyUI client");
    let objects = atelier_storage::from_config(&storage_config)
        .await
        .expect("Failed to initialise object store");
    tracing::info!(
        engine = %engine_config.base_url,
        objects = objects.backend_name(),
        interval_secs = worker_config.interval.as_secs(),
        "Worker configured"
    );

    let events = Arc::new(EventBus::default());
    let persistence_stop = CancellationToken::new();
    let persistence = tokio::spawn(EventPersistence::run(
        pool.clone(),
        events.subscribe(),
        persistence_stop.clone(),
    ));

    let worker = ReconcileWorker::new(
        PipelineContext {
            engine: Arc::new(engine),
            store: Arc::new(PgJobStore::new(pool)),
            objects,
            events,
        },
        worker_config,
    );
    let stop = CancellationToken::new();
    let worker_stop = stop.clone();
    let worker_task = tokio::spawn(async move { worker.run(worker_stop).await });

    wait_for_signal().await;
    stop.cancel();

    // A cycle in flight completes before the token is observed.
    let _ = tokio::time::timeout(Duration::from_secs(10), worker_task).await;
    persistence_stop.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), persistence).await;
    tracing::info!("Worker stopped");
}
