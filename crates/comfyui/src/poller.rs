//! Single status query for a submitted job.

use crate::api::{ComfyUIApi, ComfyUIApiError};
use crate::history::{classify, PollResult};

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    /// The history endpoint could not be read. Callers retry on their next
    /// tick; this never changes job state.
    #[error("Engine status query failed: {0}")]
    EngineQueryFailed(String),
}

impl From<ComfyUIApiError> for PollError {
    fn from(err: ComfyUIApiError) -> Self {
        PollError::EngineQueryFailed(err.to_string())
    }
}

/// Query the engine once and classify the answer.
pub async fn poll(api: &ComfyUIApi, prompt_id: &str) -> Result<PollResult, PollError> {
    let history = api.get_history(prompt_id).await?;
    let result = classify(prompt_id, &history);
    tracing::debug!(
        prompt_id = %prompt_id,
        state = ?result.state,
        assets = result.assets.len(),
        "Polled engine history"
    );
    Ok(result)
}
