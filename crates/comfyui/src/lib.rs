//! HTTP client for a ComfyUI generation engine.
//!
//! - [`api`]: thin wrapper over the engine's REST endpoints.
//! - [`submission`]: workflow submission, asset upload and queue inspection.
//! - [`history`]: pure classification of history documents and output
//!   extraction.
//! - [`poller`]: one status query per call.
//! - [`engine`]: the [`GenerationEngine`](engine::GenerationEngine) seam the
//!   pipeline depends on, and its ComfyUI implementation.

pub mod api;
pub mod config;
pub mod engine;
pub mod history;
pub mod poller;
pub mod submission;

pub use config::ComfyUIConfig;
pub use engine::{ComfyUIEngine, GenerationEngine};
