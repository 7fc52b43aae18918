use atelier_comfyui::submission::SubmitError;
use atelier_core::error::CoreError;

/// Failure to turn a request into a submitted job.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Missing or malformed parameters, or a broken template.
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Submit(#[from] SubmitError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}
