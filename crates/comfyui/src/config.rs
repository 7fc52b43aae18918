use std::time::Duration;

/// Engine connection settings.
#[derive(Debug, Clone)]
pub struct ComfyUIConfig {
    /// Base HTTP URL of the engine, without a trailing slash.
    pub base_url: String,
    /// Interval between status queries for one job.
    pub poll_interval: Duration,
    /// Per-request timeout for engine calls.
    pub request_timeout: Duration,
}

impl ComfyUIConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default                 |
    /// |------------------------------|-------------------------|
    /// | `COMFYUI_BASE_URL`           | `http://127.0.0.1:8188` |
    /// | `COMFYUI_POLL_INTERVAL_SECS` | `3`                     |
    /// | `COMFYUI_REQUEST_TIMEOUT_SECS` | `60`                  |
    pub fn from_env() -> Self {
        let base_url = std::env::var("COMFYUI_BASE_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8188".into())
            .trim_end_matches('/')
            .to_string();

        let poll_interval_secs: u64 = std::env::var("COMFYUI_POLL_INTERVAL_SECS")
            .unwrap_or_else(|_| "3".into())
            .parse()
            .expect("COMFYUI_POLL_INTERVAL_SECS must be a valid u64");

        let request_timeout_secs: u64 = std::env::var("COMFYUI_REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "60".into())
            .parse()
            .expect("COMFYUI_REQUEST_TIMEOUT_SECS must be a valid u64");

        Self {
            base_url,
            poll_interval: Duration::from_secs(poll_interval_secs.max(1)),
            request_timeout: Duration::from_secs(request_timeout_secs),
        }
    }

    /// Configuration pointing at `base_url` with default timings.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            poll_interval: Duration::from_secs(3),
            request_timeout: Duration::from_secs(60),
        }
    }
}
