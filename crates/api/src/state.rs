use std::sync::Arc;
use std::time::Duration;

use atelier_pipeline::{Orchestrator, PipelineContext};
use tokio_util::sync::CancellationToken;

use crate::auth::token::TokenSigner;
use crate::config::ServerConfig;
use crate::translate::Translator;

/// Handler state. Every field is an `Arc`, a pool handle or a token, so
/// cloning per request is cheap.
#[derive(Clone)]
pub struct AppState {
    pub pool: atelier_db::DbPool,
    pub config: Arc<ServerConfig>,
    /// Engine, job store, object store and event bus.
    pub pipeline: PipelineContext,
    /// Tracks jobs created through the API until they settle.
    pub orchestrator: Arc<Orchestrator>,
    pub tokens: Arc<TokenSigner>,
    pub translator: Arc<Translator>,
    /// Parent of every tracking task's token; cancelled at shutdown.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        pool: atelier_db::DbPool,
        config: ServerConfig,
        pipeline: PipelineContext,
        poll_interval: Duration,
    ) -> Self {
        Self {
            pool,
            orchestrator: Arc::new(Orchestrator::new(pipeline.clone(), poll_interval)),
            tokens: Arc::new(TokenSigner::new(&config.jwt)),
            translator: Arc::new(Translator::new(config.translate.clone())),
            config: Arc::new(config),
            pipeline,
            shutdown: CancellationToken::new(),
        }
    }
}
