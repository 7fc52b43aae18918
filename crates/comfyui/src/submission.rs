//! Workflow submission, input upload and queue inspection.

use atelier_core::workflow_template::WorkflowGraph;
use bytes::Bytes;

use crate::api::{ComfyUIApi, ComfyUIApiError, QueueResponse};

/// Result of a successful submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedJob {
    /// Engine-assigned job id used for every later status query.
    pub prompt_id: String,
    /// Backlog estimate taken just before submitting. `None` when the
    /// engine was idle or the queue could not be read.
    pub queue_position: Option<i32>,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// The engine answered non-2xx. `body` is passed through untouched so
    /// node validation errors reach the caller.
    #[error("Engine rejected the request ({status}): {body}")]
    EngineRejected { status: u16, body: String },

    /// 2xx response carrying neither `prompt_id` nor `queue_id`.
    #[error("Engine accepted the workflow but returned no job id")]
    NoJobId,

    #[error("Engine request failed: {0}")]
    Request(#[source] reqwest::Error),
}

impl From<ComfyUIApiError> for SubmitError {
    fn from(err: ComfyUIApiError) -> Self {
        match err {
            ComfyUIApiError::Status { status, body } => SubmitError::EngineRejected { status, body },
            ComfyUIApiError::Request(e) => SubmitError::Request(e),
        }
    }
}

/// Position a newly submitted job would take: one past the pending
/// backlog when anything is running or pending, otherwise `None`.
pub fn queue_position_from(queue: &QueueResponse) -> Option<i32> {
    let busy = !queue.queue_running.is_empty() || !queue.queue_pending.is_empty();
    busy.then(|| i32::try_from(queue.queue_pending.len()).unwrap_or(i32::MAX - 1) + 1)
}

/// Read the engine queue and derive the position of the next submission.
pub async fn queue_position(api: &ComfyUIApi) -> Result<Option<i32>, SubmitError> {
    let queue = api.get_queue().await?;
    Ok(queue_position_from(&queue))
}

/// Submit `graph`. The queue position is sampled once beforehand; failing
/// to read it does not fail the submission.
pub async fn submit(api: &ComfyUIApi, graph: &WorkflowGraph) -> Result<SubmittedJob, SubmitError> {
    let queue_position = match queue_position(api).await {
        Ok(position) => position,
        Err(e) => {
            tracing::warn!(error = %e, "Could not read engine queue, omitting position");
            None
        }
    };

    let client_id = uuid::Uuid::new_v4().to_string();
    let workflow = serde_json::Value::Object(graph.as_json().clone());
    let response = api.submit_workflow(&workflow, &client_id).await?;
    let prompt_id = response.job_id().ok_or(SubmitError::NoJobId)?.to_string();

    tracing::info!(
        prompt_id = %prompt_id,
        queue_position = ?queue_position,
        nodes = graph.as_json().len(),
        "Workflow submitted to engine"
    );

    Ok(SubmittedJob {
        prompt_id,
        queue_position,
    })
}

/// Upload an input image. Returns the name the engine stored it under,
/// which is what graph slots must reference.
pub async fn upload_image(
    api: &ComfyUIApi,
    data: Bytes,
    filename: &str,
) -> Result<String, SubmitError> {
    let size = data.len();
    let uploaded = api.upload_image(data, filename).await?;
    tracing::debug!(requested = %filename, stored = %uploaded.name, size, "Uploaded input image");
    Ok(uploaded.name)
}

/// Copy a previous output into the engine's input folder.
pub async fn reupload_output(api: &ComfyUIApi, filename: &str) -> Result<String, SubmitError> {
    let data = api.view(filename, "", "output").await?;
    upload_image(api, data, filename).await
}

/// Best-effort request to drop the engine's pending backlog.
pub async fn clear_queue(api: &ComfyUIApi) -> Result<(), SubmitError> {
    api.clear_queue().await?;
    tracing::info!("Engine queue cleared");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn queue(running: usize, pending: usize) -> QueueResponse {
        QueueResponse {
            queue_running: vec![json!([0, "r"]); running],
            queue_pending: vec![json!([1, "p"]); pending],
        }
    }

    #[test]
    fn idle_engine_has_no_position() {
        assert_eq!(queue_position_from(&queue(0, 0)), None);
    }

    #[test]
    fn position_is_one_past_pending() {
        assert_eq!(queue_position_from(&queue(0, 2)), Some(3));
        assert_eq!(queue_position_from(&queue(1, 2)), Some(3));
    }

    #[test]
    fn running_job_alone_gives_position_one() {
        assert_eq!(queue_position_from(&queue(1, 0)), Some(1));
    }

    #[test]
    fn api_errors_map_to_submit_errors() {
        let err: SubmitError = ComfyUIApiError::Status {
            status: 400,
            body: "{\"error\":\"bad node\"}".into(),
        }
        .into();
        match err {
            SubmitError::EngineRejected { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body, "{\"error\":\"bad node\"}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
