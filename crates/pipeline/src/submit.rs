//! Request → engine → job row.

use atelier_comfyui::submission::SubmitError;
use atelier_core::types::DbId;
use atelier_db::models::job::{CreateJob, Job};
use atelier_db::models::status::JobStatus;
use atelier_events::{JobEvent, JobEventKind};
use serde_json::json;

use crate::error::PipelineError;
use crate::request::GenerationRequest;
use crate::templates;
use crate::PipelineContext;

/// Validate, build and submit `request` on behalf of `user_id`.
///
/// Parameter errors are returned before anything is persisted. Once the
/// engine has been contacted a job row always exists: a successful submit
/// yields a `queued` or `processing` job carrying the engine id, a failed
/// one a `failed` job carrying the engine's diagnostic.
pub async fn submit_job(
    ctx: &PipelineContext,
    user_id: DbId,
    mut request: GenerationRequest,
) -> Result<Job, PipelineError> {
    let spec = templates::spec_for(request.kind);
    templates::validate(&request)?;

    let submitted = match prepare_and_submit(ctx, &mut request, spec.reupload_param).await {
        Ok(submitted) => submitted,
        Err(PipelineError::Submit(err)) => {
            record_failed_submit(ctx, user_id, &request, &err).await?;
            return Err(err.into());
        }
        Err(err) => return Err(err),
    };

    let status = if submitted.queue_position.is_some() {
        JobStatus::Queued
    } else {
        JobStatus::Processing
    };
    let mut job = ctx
        .store
        .create_job(&CreateJob {
            user_id,
            kind: request.kind,
            status,
            queue_position: submitted.queue_position,
            parameters: request.parameters.to_value(),
        })
        .await?;
    ctx.store.attach_prompt_id(job.id, &submitted.prompt_id).await?;
    job.prompt_id = Some(submitted.prompt_id.clone());

    tracing::info!(
        job_id = job.id,
        user_id,
        kind = %request.kind,
        prompt_id = %submitted.prompt_id,
        queue_position = ?submitted.queue_position,
        "Job submitted"
    );
    ctx.events.publish(
        JobEvent::new(JobEventKind::Submitted, job.id, user_id).with_payload(json!({
            "kind": request.kind,
            "prompt_id": submitted.prompt_id,
            "queue_position": submitted.queue_position,
        })),
    );

    Ok(job)
}

async fn prepare_and_submit(
    ctx: &PipelineContext,
    request: &mut GenerationRequest,
    reupload_param: Option<&'static str>,
) -> Result<atelier_comfyui::submission::SubmittedJob, PipelineError> {
    if let Some(param) = reupload_param {
        if let Some(output) = request.parameters.text(param).map(str::to_string) {
            let input_name = ctx.engine.reupload_output(&output).await?;
            tracing::debug!(output = %output, input = %input_name, "Re-uploaded engine output");
            request.parameters.set(param, input_name);
        }
    }

    let graph = templates::build(request)?;
    Ok(ctx.engine.submit(&graph).await?)
}

async fn record_failed_submit(
    ctx: &PipelineContext,
    user_id: DbId,
    request: &GenerationRequest,
    err: &SubmitError,
) -> Result<(), PipelineError> {
    let job = ctx
        .store
        .create_job(&CreateJob {
            user_id,
            kind: request.kind,
            status: JobStatus::Processing,
            queue_position: None,
            parameters: request.parameters.to_value(),
        })
        .await?;
    let message = err.to_string();
    ctx.store.mark_failed(job.id, &message).await?;

    tracing::warn!(job_id = job.id, user_id, kind = %request.kind, error = %message, "Submission failed");
    ctx.events.publish(
        JobEvent::new(JobEventKind::Failed, job.id, user_id)
            .with_payload(json!({ "error": message, "stage": "submit" })),
    );
    Ok(())
}
