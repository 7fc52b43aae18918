//! Periodic poll → reconcile sweep over open jobs.
//!
//! Every cycle lists the open jobs that carry an engine id, queries the
//! engine once for each and acts on the answer. Jobs nobody is waiting on
//! interactively still reach a terminal state this way. A job the engine
//! has not started is left open however old it is, since an empty history
//! entry is also what a prompt deep in the engine's backlog looks like.

use std::time::Duration;

use atelier_comfyui::history::PollState;
use atelier_db::models::job::Job;
use atelier_db::models::status::JobStatus;
use atelier_pipeline::{PipelineContext, ReconcileError, Reconciler};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;

/// Failure message for jobs that never received an engine id.
pub const NEVER_SUBMITTED: &str = "The job was never accepted by the engine";

/// Counters for one reconciliation cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub polled: usize,
    pub completed: usize,
    pub failed: usize,
    pub started: usize,
    /// Jobs without an engine id failed after the stale window.
    pub swept: usize,
    /// Jobs skipped this cycle because the engine or store call failed.
    pub errors: usize,
}

/// Background reconciliation worker.
pub struct ReconcileWorker {
    ctx: PipelineContext,
    reconciler: Reconciler,
    config: WorkerConfig,
}

impl ReconcileWorker {
    pub fn new(ctx: PipelineContext, config: WorkerConfig) -> Self {
        let reconciler = Reconciler::new(ctx.clone());
        Self {
            ctx,
            reconciler,
            config,
        }
    }

    /// Run the reconciliation loop until the cancellation token is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(
            interval_ms = self.config.interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            stale_after_mins = self.config.stale_after_mins,
            "Reconcile worker started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Reconcile worker shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match self.run_cycle().await {
                        Ok(report) if report != CycleReport::default() => {
                            tracing::debug!(?report, "Reconcile cycle finished");
                        }
                        Ok(_) => {}
                        Err(e) => tracing::error!(error = %e, "Reconcile cycle failed"),
                    }
                }
            }
        }
    }

    /// One cycle: poll every open job, then sweep stale ones.
    pub async fn run_cycle(&self) -> Result<CycleReport, sqlx::Error> {
        let mut report = CycleReport::default();

        let open = self.ctx.store.list_open(self.config.batch_size).await?;
        for job in &open {
            report.polled += 1;
            if let Err(e) = self.advance(job, &mut report).await {
                report.errors += 1;
                tracing::warn!(job_id = job.id, prompt_id = ?job.prompt_id, error = %e, "Failed to advance job");
            }
        }

        let stale = self
            .ctx
            .store
            .list_stale(self.config.stale_after_mins, self.config.batch_size)
            .await?;
        for job in stale.iter().filter(|j| j.prompt_id.is_none()) {
            match self.reconciler.fail(job, NEVER_SUBMITTED).await {
                Ok(true) => report.swept += 1,
                Ok(false) => {}
                Err(e) => {
                    report.errors += 1;
                    tracing::warn!(job_id = job.id, error = %e, "Failed to sweep stale job");
                }
            }
        }

        Ok(report)
    }

    async fn advance(&self, job: &Job, report: &mut CycleReport) -> Result<(), ReconcileError> {
        let Some(prompt_id) = job.prompt_id.as_deref() else {
            return Ok(());
        };

        let result = match self.ctx.engine.poll(prompt_id).await {
            Ok(result) => result,
            Err(e) => {
                report.errors += 1;
                tracing::debug!(job_id = job.id, prompt_id = %prompt_id, error = %e, "Engine query failed, retrying next cycle");
                return Ok(());
            }
        };

        match result.state {
            PollState::Completed => {
                if self.reconciler.reconcile(job, &result.assets).await?.transitioned {
                    report.completed += 1;
                }
            }
            PollState::Error { messages } => {
                if self.reconciler.fail(job, &messages.join("; ")).await? {
                    report.failed += 1;
                }
            }
            PollState::Running => {
                if job.status() == Some(JobStatus::Queued) && self.reconciler.mark_started(job).await? {
                    report.started += 1;
                }
            }
            PollState::Pending => {}
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        self.config.interval
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use atelier_comfyui::history::PollResult;
    use atelier_core::job_kind::JobKind;
    use atelier_db::models::job::CreateJob;
    use atelier_events::JobEventKind;
    use atelier_pipeline::testing::{asset, completed, errored, harness, running, FakeEngine, Harness};
    use atelier_pipeline::JobStore;
    use serde_json::json;

    fn config() -> WorkerConfig {
        WorkerConfig {
            interval: Duration::from_secs(5),
            batch_size: 10,
            stale_after_mins: 30,
        }
    }

    async fn open_job(h: &Harness, status: JobStatus, prompt_id: Option<&str>) -> Job {
        let job = h
            .store
            .create_job(&CreateJob {
                user_id: 7,
                kind: JobKind::Edit,
                status,
                queue_position: None,
                parameters: json!({ "image1": "cat.png", "image2": "dog.png" }),
            })
            .await
            .unwrap();
        if let Some(prompt_id) = prompt_id {
            h.store.attach_prompt_id(job.id, prompt_id).await.unwrap();
        }
        h.store.find_job(job.id).await.unwrap().unwrap()
    }

    async fn status_of(h: &Harness, job: &Job) -> Option<JobStatus> {
        h.store.find_job(job.id).await.unwrap().unwrap().status()
    }

    #[tokio::test]
    async fn completed_jobs_are_reconciled_once() {
        let engine = FakeEngine::new().with_prompt_result("p1", completed(vec![asset("202", "result1.png")]));
        let h = harness(engine.clone());
        let job = open_job(&h, JobStatus::Processing, Some("p1")).await;
        let worker = ReconcileWorker::new(h.ctx.clone(), config());

        let report = worker.run_cycle().await.unwrap();
        assert_eq!(report.polled, 1);
        assert_eq!(report.completed, 1);
        assert_eq!(status_of(&h, &job).await, Some(JobStatus::Completed));
        assert_eq!(h.store.list_images(job.id).await.unwrap().len(), 1);
        assert_eq!(h.objects.keys(), vec!["7/p1/result1.png".to_string()]);

        let report = worker.run_cycle().await.unwrap();
        assert_eq!(report, CycleReport::default());
        assert_eq!(engine.poll_count(), 1);
    }

    #[tokio::test]
    async fn engine_errors_fail_the_job() {
        let engine = FakeEngine::new().with_prompt_result("p1", errored("CUDA out of memory"));
        let h = harness(engine);
        let job = open_job(&h, JobStatus::Processing, Some("p1")).await;
        let worker = ReconcileWorker::new(h.ctx.clone(), config());

        let report = worker.run_cycle().await.unwrap();
        assert_eq!(report.failed, 1);
        let stored = h.store.find_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status(), Some(JobStatus::Failed));
        assert_eq!(stored.error_message.as_deref(), Some("CUDA out of memory"));
    }

    #[tokio::test]
    async fn running_queued_job_moves_to_processing() {
        let h = harness(FakeEngine::new().with_prompt_result("p1", running()));
        let job = open_job(&h, JobStatus::Queued, Some("p1")).await;
        let mut events = h.ctx.events.subscribe();
        let worker = ReconcileWorker::new(h.ctx.clone(), config());

        assert_eq!(worker.run_cycle().await.unwrap().started, 1);
        assert_eq!(status_of(&h, &job).await, Some(JobStatus::Processing));
        assert_eq!(events.recv().await.unwrap().kind, JobEventKind::Processing);

        assert_eq!(worker.run_cycle().await.unwrap().started, 0);
    }

    #[tokio::test]
    async fn old_pending_job_stays_open_until_the_engine_finishes() {
        let engine = FakeEngine::new()
            .then_poll(PollResult::pending())
            .then_poll(completed(vec![asset("202", "late.png")]));
        let h = harness(engine);
        let job = open_job(&h, JobStatus::Queued, Some("p1")).await;
        h.store.backdate(job.id, 45);
        let worker = ReconcileWorker::new(h.ctx.clone(), config());

        let report = worker.run_cycle().await.unwrap();
        assert_eq!(report.polled, 1);
        assert_eq!(report.swept, 0);
        let stored = h.store.find_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status(), Some(JobStatus::Queued));
        assert!(stored.error_message.is_none());

        let report = worker.run_cycle().await.unwrap();
        assert_eq!(report.completed, 1);
        assert_eq!(status_of(&h, &job).await, Some(JobStatus::Completed));
        assert_eq!(h.store.list_images(job.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stale_job_without_engine_id_is_swept() {
        let h = harness(FakeEngine::new());
        let job = open_job(&h, JobStatus::Processing, None).await;
        let worker = ReconcileWorker::new(h.ctx.clone(), config());

        assert_eq!(worker.run_cycle().await.unwrap(), CycleReport::default());

        h.store.backdate(job.id, 31);
        let report = worker.run_cycle().await.unwrap();
        assert_eq!(report.polled, 0);
        assert_eq!(report.swept, 1);
        let stored = h.store.find_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.error_message.as_deref(), Some(NEVER_SUBMITTED));
    }

    #[tokio::test]
    async fn query_failure_leaves_job_open() {
        let h = harness(FakeEngine::new().then_poll_error("connection refused"));
        let job = open_job(&h, JobStatus::Processing, Some("p1")).await;
        h.store.backdate(job.id, 120);
        let worker = ReconcileWorker::new(h.ctx.clone(), config());

        let report = worker.run_cycle().await.unwrap();
        assert_eq!(report.errors, 1);
        assert_eq!(status_of(&h, &job).await, Some(JobStatus::Processing));
    }

    #[tokio::test(start_paused = true)]
    async fn run_polls_each_interval_until_cancelled() {
        let engine = FakeEngine::new().with_prompt_result("p1", running());
        let h = harness(engine.clone());
        open_job(&h, JobStatus::Processing, Some("p1")).await;
        let worker = Arc::new(ReconcileWorker::new(h.ctx.clone(), config()));
        let cancel = CancellationToken::new();

        let task = tokio::spawn({
            let worker = Arc::clone(&worker);
            let cancel = cancel.clone();
            async move { worker.run(cancel).await }
        });

        tokio::time::sleep(worker.interval() * 2 + Duration::from_millis(100)).await;
        cancel.cancel();
        task.await.unwrap();
        assert_eq!(engine.poll_count(), 3);
    }
}
