//! The generation engine seam.
//!
//! The pipeline talks to the engine only through [`GenerationEngine`], so
//! orchestration and reconciliation can be exercised against an in-memory
//! engine in tests.

use async_trait::async_trait;
use atelier_core::workflow_template::WorkflowGraph;
use bytes::Bytes;

use crate::api::{ComfyUIApi, ComfyUIApiError};
use crate::config::ComfyUIConfig;
use crate::history::{OutputAsset, PollResult};
use crate::poller::{self, PollError};
use crate::submission::{self, SubmitError, SubmittedJob};

#[async_trait]
pub trait GenerationEngine: Send + Sync {
    /// Submit a fully built workflow.
    async fn submit(&self, graph: &WorkflowGraph) -> Result<SubmittedJob, SubmitError>;

    /// Store an input image, returning the name graph slots must use.
    async fn upload_image(&self, data: Bytes, filename: &str) -> Result<String, SubmitError>;

    /// Copy a previous output into the input folder.
    async fn reupload_output(&self, filename: &str) -> Result<String, SubmitError>;

    /// One status query.
    async fn poll(&self, prompt_id: &str) -> Result<PollResult, PollError>;

    /// Download the bytes of a produced asset.
    async fn fetch_asset(&self, asset: &OutputAsset) -> Result<Bytes, PollError>;

    /// Drop the pending backlog.
    async fn clear_queue(&self) -> Result<(), SubmitError>;
}

/// [`GenerationEngine`] backed by a ComfyUI HTTP server.
#[derive(Debug, Clone)]
pub struct ComfyUIEngine {
    api: ComfyUIApi,
}

impl ComfyUIEngine {
    pub fn new(config: &ComfyUIConfig) -> Result<Self, ComfyUIApiError> {
        Ok(Self {
            api: ComfyUIApi::new(config)?,
        })
    }

    pub fn api(&self) -> &ComfyUIApi {
        &self.api
    }
}

#[async_trait]
impl GenerationEngine for ComfyUIEngine {
    async fn submit(&self, graph: &WorkflowGraph) -> Result<SubmittedJob, SubmitError> {
        submission::submit(&self.api, graph).await
    }

    async fn upload_image(&self, data: Bytes, filename: &str) -> Result<String, SubmitError> {
        submission::upload_image(&self.api, data, filename).await
    }

    async fn reupload_output(&self, filename: &str) -> Result<String, SubmitError> {
        submission::reupload_output(&self.api, filename).await
    }

    async fn poll(&self, prompt_id: &str) -> Result<PollResult, PollError> {
        poller::poll(&self.api, prompt_id).await
    }

    async fn fetch_asset(&self, asset: &OutputAsset) -> Result<Bytes, PollError> {
        Ok(self
            .api
            .view(&asset.filename, &asset.subfolder, &asset.folder_type)
            .await?)
    }

    async fn clear_queue(&self) -> Result<(), SubmitError> {
        submission::clear_queue(&self.api).await
    }
}
