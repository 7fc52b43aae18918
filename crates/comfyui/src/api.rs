//! REST API client for the ComfyUI HTTP endpoints.
//!
//! Each method is one HTTP round trip. Interpretation of the responses
//! (queue position, history classification) lives in [`crate::submission`]
//! and [`crate::history`].

use bytes::Bytes;
use reqwest::header::{CACHE_CONTROL, PRAGMA};
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::config::ComfyUIConfig;

/// HTTP client for a single ComfyUI instance.
#[derive(Debug, Clone)]
pub struct ComfyUIApi {
    client: reqwest::Client,
    base_url: String,
}

/// Body returned by `POST /prompt`.
///
/// Some deployments sit behind a queueing proxy that answers with
/// `queue_id` instead of `prompt_id`; either is accepted as the job id.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    pub prompt_id: Option<String>,
    pub queue_id: Option<String>,
    /// Engine-side sequence number.
    pub number: Option<i64>,
}

impl SubmitResponse {
    pub fn job_id(&self) -> Option<&str> {
        self.prompt_id
            .as_deref()
            .or(self.queue_id.as_deref())
            .filter(|id| !id.trim().is_empty())
    }
}

/// Body returned by `GET /queue`. Entries are opaque.
#[derive(Debug, Default, Deserialize)]
pub struct QueueResponse {
    #[serde(default)]
    pub queue_running: Vec<serde_json::Value>,
    #[serde(default)]
    pub queue_pending: Vec<serde_json::Value>,
}

/// Body returned by `POST /upload/image`.
#[derive(Debug, Deserialize)]
pub struct UploadResponse {
    /// Name to reference from `LoadImage` nodes. May differ from the name
    /// that was uploaded.
    pub name: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(rename = "type", default)]
    pub folder_type: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ComfyUIApiError {
    /// Connect, TLS, timeout or body decoding failure.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-2xx answer. `body` is passed through untouched.
    #[error("ComfyUI answered {status}: {body}")]
    Status { status: u16, body: String },
}

impl ComfyUIApi {
    pub fn new(config: &ComfyUIConfig) -> Result<Self, ComfyUIApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self::with_client(client, config.base_url.clone()))
    }

    /// Share a client (and its connection pool) with other callers.
    pub fn with_client(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.trim_end_matches('/'))
    }

    /// `POST /prompt`.
    pub async fn submit_workflow(
        &self,
        workflow: &serde_json::Value,
        client_id: &str,
    ) -> Result<SubmitResponse, ComfyUIApiError> {
        let request = self
            .client
            .post(self.endpoint("prompt"))
            .json(&json!({ "prompt": workflow, "client_id": client_id }));
        read_json(request).await
    }

    pub async fn get_queue(&self) -> Result<QueueResponse, ComfyUIApiError> {
        read_json(self.client.get(self.endpoint("queue"))).await
    }

    /// Drops every pending entry. Running prompts are not interrupted.
    pub async fn clear_queue(&self) -> Result<(), ComfyUIApiError> {
        let request = self
            .client
            .post(self.endpoint("queue"))
            .json(&json!({ "clear": true }));
        send(request).await.map(drop)
    }

    /// Multipart upload with the file in the `image` field, overwriting any
    /// input of the same name.
    pub async fn upload_image(
        &self,
        data: Bytes,
        filename: &str,
    ) -> Result<UploadResponse, ComfyUIApiError> {
        let file = Part::bytes(data.to_vec()).file_name(filename.to_string());
        let form = Form::new().part("image", file).text("overwrite", "true");
        read_json(self.client.post(self.endpoint("upload/image")).multipart(form)).await
    }

    /// Raw bytes of an input, temp or output file.
    pub async fn view(
        &self,
        filename: &str,
        subfolder: &str,
        folder_type: &str,
    ) -> Result<Bytes, ComfyUIApiError> {
        let request = self.client.get(self.endpoint("view")).query(&[
            ("filename", filename),
            ("subfolder", subfolder),
            ("type", folder_type),
        ]);
        Ok(send(request).await?.bytes().await?)
    }

    /// History entry for one prompt. Sent with no-cache headers since a
    /// cached empty answer would stall polling.
    pub async fn get_history(&self, prompt_id: &str) -> Result<serde_json::Value, ComfyUIApiError> {
        let request = self
            .client
            .get(self.endpoint(&format!("history/{prompt_id}")))
            .header(CACHE_CONTROL, "no-cache")
            .header(PRAGMA, "no-cache");
        read_json(request).await
    }
}

async fn send(request: RequestBuilder) -> Result<Response, ComfyUIApiError> {
    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ComfyUIApiError::Status {
        status: status.as_u16(),
        body,
    })
}

async fn read_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ComfyUIApiError> {
    Ok(send(request).await?.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_prefers_prompt_id() {
        let r: SubmitResponse =
            serde_json::from_str(r#"{"prompt_id":"abc","queue_id":"q1","number":3}"#).unwrap();
        assert_eq!(r.job_id(), Some("abc"));
    }

    #[test]
    fn job_id_falls_back_to_queue_id() {
        let r: SubmitResponse = serde_json::from_str(r#"{"queue_id":"q1"}"#).unwrap();
        assert_eq!(r.job_id(), Some("q1"));
    }

    #[test]
    fn blank_job_id_counts_as_missing() {
        let r: SubmitResponse = serde_json::from_str(r#"{"prompt_id":"","number":0}"#).unwrap();
        assert_eq!(r.job_id(), None);
    }

    #[test]
    fn endpoint_tolerates_trailing_slash() {
        let api = ComfyUIApi::with_client(reqwest::Client::new(), "http://gpu:8188/".into());
        assert_eq!(api.endpoint("history/abc"), "http://gpu:8188/history/abc");
    }

    #[test]
    fn queue_lists_default_to_empty() {
        let q: QueueResponse = serde_json::from_str("{}").unwrap();
        assert!(q.queue_running.is_empty() && q.queue_pending.is_empty());
    }
}
