//! Interactive driver for one job: submit, poll on a fixed interval, stop at
//! completion, error, timeout or cancellation.
//!
//! Polling failures are never terminal; the next tick is the retry. The
//! current [`OrchestrationState`] is published on a `watch` channel so a
//! caller can show partial progress while the loop runs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use atelier_comfyui::history::{progress_step, OutputAsset, PollState};
use atelier_core::types::DbId;
use atelier_db::models::job::Job;
use atelier_db::models::status::JobStatus;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::reconcile::{ReconcileReport, Reconciler};
use crate::request::GenerationRequest;
use crate::submit::submit_job;
use crate::PipelineContext;

/// Observable progress of one orchestrated job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum OrchestrationState {
    Idle,
    Submitting,
    Polling {
        job_id: DbId,
        prompt_id: String,
        queue_position: Option<i32>,
        /// Stage label for multi-stage kinds.
        step: Option<&'static str>,
    },
    Completed {
        job_id: DbId,
        prompt_id: String,
        assets: Vec<OutputAsset>,
    },
    TimedOut {
        job_id: DbId,
        prompt_id: String,
    },
    Failed {
        job_id: Option<DbId>,
        message: String,
    },
    Cancelled {
        job_id: Option<DbId>,
    },
}

/// How an orchestrated job ended.
#[derive(Debug)]
pub enum OrchestrationOutcome {
    /// Outputs were reconciled; `job` is the row as read afterwards.
    Completed {
        job: Job,
        assets: Vec<OutputAsset>,
        report: ReconcileReport,
    },
    /// The job is left open for the background worker.
    TimedOut { job_id: DbId, prompt_id: String },
    Failed { job_id: Option<DbId>, message: String },
    Cancelled { job_id: Option<DbId> },
}

impl OrchestrationOutcome {
    fn state(&self) -> OrchestrationState {
        match self {
            OrchestrationOutcome::Completed { job, assets, .. } => OrchestrationState::Completed {
                job_id: job.id,
                prompt_id: job.prompt_id.clone().unwrap_or_default(),
                assets: assets.clone(),
            },
            OrchestrationOutcome::TimedOut { job_id, prompt_id } => OrchestrationState::TimedOut {
                job_id: *job_id,
                prompt_id: prompt_id.clone(),
            },
            OrchestrationOutcome::Failed { job_id, message } => OrchestrationState::Failed {
                job_id: *job_id,
                message: message.clone(),
            },
            OrchestrationOutcome::Cancelled { job_id } => {
                OrchestrationState::Cancelled { job_id: *job_id }
            }
        }
    }
}

/// A tracking loop running on its own task.
pub struct OrchestrationHandle {
    pub state: watch::Receiver<OrchestrationState>,
    pub task: JoinHandle<OrchestrationOutcome>,
}

pub struct Orchestrator {
    ctx: PipelineContext,
    reconciler: Reconciler,
    poll_interval: Duration,
    active: Arc<AtomicUsize>,
}

/// Counts a spawned loop as active until dropped.
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(Arc::clone(counter))
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

impl Orchestrator {
    pub fn new(ctx: PipelineContext, poll_interval: Duration) -> Self {
        Self {
            reconciler: Reconciler::new(ctx.clone()),
            ctx,
            poll_interval,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Spawned tracking loops that have not finished yet.
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Submit `request` and track it to a terminal outcome.
    pub async fn run(
        &self,
        user_id: DbId,
        request: GenerationRequest,
        cancel: &CancellationToken,
        progress: &watch::Sender<OrchestrationState>,
    ) -> OrchestrationOutcome {
        progress.send_replace(OrchestrationState::Submitting);
        match submit_job(&self.ctx, user_id, request).await {
            Ok(job) => self.track(job, cancel, progress).await,
            Err(err) => finish(
                progress,
                OrchestrationOutcome::Failed {
                    job_id: None,
                    message: err.to_string(),
                },
            ),
        }
    }

    /// Track an already submitted job on a new task.
    pub fn spawn(self: &Arc<Self>, job: Job, cancel: CancellationToken) -> OrchestrationHandle {
        let (tx, rx) = watch::channel(OrchestrationState::Idle);
        let this = Arc::clone(self);
        let guard = ActiveGuard::enter(&self.active);
        let task = tokio::spawn(async move {
            let _guard = guard;
            this.track(job, &cancel, &tx).await
        });
        OrchestrationHandle { state: rx, task }
    }

    /// Poll a submitted job until it completes, fails, times out or is
    /// cancelled. Cancellation only stops this loop; the engine keeps
    /// working on the job.
    pub async fn track(
        &self,
        job: Job,
        cancel: &CancellationToken,
        progress: &watch::Sender<OrchestrationState>,
    ) -> OrchestrationOutcome {
        let Some(prompt_id) = job.prompt_id.clone() else {
            return finish(
                progress,
                OrchestrationOutcome::Failed {
                    job_id: Some(job.id),
                    message: "Job was never submitted to the engine".into(),
                },
            );
        };
        let kind = match job.job_kind() {
            Ok(kind) => kind,
            Err(e) => {
                return finish(
                    progress,
                    OrchestrationOutcome::Failed {
                        job_id: Some(job.id),
                        message: e.to_string(),
                    },
                )
            }
        };
        let policy = kind.policy();
        let deadline = Instant::now() + policy.poll_timeout;

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut started = job.status() != Some(JobStatus::Queued);

        progress.send_replace(OrchestrationState::Polling {
            job_id: job.id,
            prompt_id: prompt_id.clone(),
            queue_position: job.queue_position,
            step: progress_step(kind, &[]),
        });

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!(job_id = job.id, prompt_id = %prompt_id, "Polling cancelled");
                    return finish(progress, OrchestrationOutcome::Cancelled { job_id: Some(job.id) });
                }
                _ = tokio::time::sleep_until(deadline) => {
                    tracing::warn!(
                        job_id = job.id,
                        prompt_id = %prompt_id,
                        timeout_secs = policy.poll_timeout.as_secs(),
                        "Polling timed out"
                    );
                    if policy.clear_queue_on_timeout {
                        if let Err(e) = self.ctx.engine.clear_queue().await {
                            tracing::warn!(job_id = job.id, error = %e, "Queue clear failed");
                        }
                    }
                    return finish(progress, OrchestrationOutcome::TimedOut { job_id: job.id, prompt_id });
                }
                _ = ticker.tick() => {}
            }

            let result = match self.ctx.engine.poll(&prompt_id).await {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(job_id = job.id, prompt_id = %prompt_id, error = %e, "Status query failed, retrying");
                    continue;
                }
            };

            match result.state {
                PollState::Completed => match self.reconciler.reconcile(&job, &result.assets).await {
                    Ok(report) => {
                        let job = match self.ctx.store.find_job(job.id).await {
                            Ok(Some(fresh)) => fresh,
                            _ => job,
                        };
                        // Another writer failed the row first; completion never lands.
                        if job.status() == Some(JobStatus::Failed) {
                            let message = job
                                .error_message
                                .clone()
                                .unwrap_or_else(|| "Job was already marked failed".to_string());
                            return finish(
                                progress,
                                OrchestrationOutcome::Failed {
                                    job_id: Some(job.id),
                                    message,
                                },
                            );
                        }
                        return finish(
                            progress,
                            OrchestrationOutcome::Completed {
                                job,
                                assets: result.assets,
                                report,
                            },
                        );
                    }
                    Err(e) => {
                        tracing::warn!(job_id = job.id, error = %e, "Reconciliation failed, retrying");
                    }
                },
                PollState::Error { messages } => {
                    let message = if messages.is_empty() {
                        "Engine reported an execution error".to_string()
                    } else {
                        messages.join("; ")
                    };
                    if let Err(e) = self.reconciler.fail(&job, &message).await {
                        tracing::warn!(job_id = job.id, error = %e, "Could not record job failure");
                    }
                    return finish(
                        progress,
                        OrchestrationOutcome::Failed {
                            job_id: Some(job.id),
                            message,
                        },
                    );
                }
                PollState::Running => {
                    if !started {
                        started = self.reconciler.mark_started(&job).await.is_ok();
                    }
                    progress.send_replace(OrchestrationState::Polling {
                        job_id: job.id,
                        prompt_id: prompt_id.clone(),
                        queue_position: job.queue_position,
                        step: progress_step(kind, &result.assets),
                    });
                }
                PollState::Pending => {}
            }
        }
    }
}

fn finish(
    progress: &watch::Sender<OrchestrationState>,
    outcome: OrchestrationOutcome,
) -> OrchestrationOutcome {
    progress.send_replace(outcome.state());
    outcome
}
