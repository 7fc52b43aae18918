//! Scripted engine and in-memory collaborators for pipeline tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use atelier_comfyui::history::{OutputAsset, PollResult, PollState};
use atelier_comfyui::poller::PollError;
use atelier_comfyui::submission::{SubmitError, SubmittedJob};
use atelier_comfyui::GenerationEngine;
use atelier_core::workflow_template::WorkflowGraph;
use atelier_events::EventBus;
use atelier_storage::MemoryBackend;
use bytes::Bytes;

use crate::store::MemoryJobStore;
use crate::PipelineContext;

pub fn asset(node_id: &str, filename: &str) -> OutputAsset {
    OutputAsset {
        node_id: node_id.to_string(),
        filename: filename.to_string(),
        subfolder: String::new(),
        folder_type: "output".to_string(),
    }
}

pub fn completed(assets: Vec<OutputAsset>) -> PollResult {
    PollResult {
        state: PollState::Completed,
        assets,
    }
}

pub fn running() -> PollResult {
    PollResult {
        state: PollState::Running,
        assets: Vec::new(),
    }
}

pub fn errored(message: &str) -> PollResult {
    PollResult {
        state: PollState::Error {
            messages: vec![message.to_string()],
        },
        assets: Vec::new(),
    }
}

#[derive(Default)]
struct Script {
    queue_position: Option<i32>,
    reject: Option<(u16, String)>,
    polls: VecDeque<Result<PollResult, String>>,
    last_poll: Option<Result<PollResult, String>>,
    per_prompt: HashMap<String, PollResult>,
    broken_assets: HashSet<String>,
    submitted: Vec<WorkflowGraph>,
}

/// [`GenerationEngine`] answering from a script. Poll answers are consumed
/// in order; the last one repeats.
#[derive(Clone, Default)]
pub struct FakeEngine {
    script: Arc<Mutex<Script>>,
    polls: Arc<AtomicUsize>,
    fetches: Arc<AtomicUsize>,
    clears: Arc<AtomicUsize>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    pub fn with_queue_position(self, position: Option<i32>) -> Self {
        self.script().queue_position = position;
        self
    }

    pub fn rejecting(self, status: u16, body: &str) -> Self {
        self.script().reject = Some((status, body.to_string()));
        self
    }

    pub fn then_poll(self, result: PollResult) -> Self {
        self.script().polls.push_back(Ok(result));
        self
    }

    pub fn then_poll_error(self, message: &str) -> Self {
        self.script().polls.push_back(Err(message.to_string()));
        self
    }

    /// Fixed answer for one prompt id, taking precedence over the script.
    pub fn with_prompt_result(self, prompt_id: &str, result: PollResult) -> Self {
        self.script().per_prompt.insert(prompt_id.to_string(), result);
        self
    }

    pub fn with_broken_asset(self, filename: &str) -> Self {
        self.script().broken_assets.insert(filename.to_string());
        self
    }

    pub fn last_submitted(&self) -> Option<WorkflowGraph> {
        self.script().submitted.last().cloned()
    }

    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn clear_count(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationEngine for FakeEngine {
    async fn submit(&self, graph: &WorkflowGraph) -> Result<SubmittedJob, SubmitError> {
        let mut script = self.script();
        if let Some((status, body)) = script.reject.clone() {
            return Err(SubmitError::EngineRejected { status, body });
        }
        script.submitted.push(graph.clone());
        Ok(SubmittedJob {
            prompt_id: "abc".to_string(),
            queue_position: script.queue_position,
        })
    }

    async fn upload_image(&self, _data: Bytes, filename: &str) -> Result<String, SubmitError> {
        Ok(format!("input_{filename}"))
    }

    async fn reupload_output(&self, filename: &str) -> Result<String, SubmitError> {
        Ok(format!("input_{filename}"))
    }

    async fn poll(&self, prompt_id: &str) -> Result<PollResult, PollError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script();
        if let Some(result) = script.per_prompt.get(prompt_id) {
            return Ok(result.clone());
        }
        let next = match script.polls.pop_front() {
            Some(next) => {
                script.last_poll = Some(next.clone());
                next
            }
            None => script.last_poll.clone().unwrap_or_else(|| Ok(PollResult::pending())),
        };
        next.map_err(PollError::EngineQueryFailed)
    }

    async fn fetch_asset(&self, asset: &OutputAsset) -> Result<Bytes, PollError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.script().broken_assets.contains(&asset.filename) {
            return Err(PollError::EngineQueryFailed(format!("404 for {}", asset.filename)));
        }
        Ok(Bytes::from(format!("png:{}", asset.filename)))
    }

    async fn clear_queue(&self) -> Result<(), SubmitError> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct Harness {
    pub ctx: PipelineContext,
    pub store: Arc<MemoryJobStore>,
    pub objects: Arc<MemoryBackend>,
}

pub fn harness(engine: FakeEngine) -> Harness {
    let store = Arc::new(MemoryJobStore::new());
    let objects = Arc::new(MemoryBackend::new());
    let ctx = PipelineContext {
        engine: Arc::new(engine),
        store: store.clone(),
        objects: objects.clone(),
        events: Arc::new(EventBus::default()),
    };
    Harness { ctx, store, objects }
}

pub fn context(engine: FakeEngine) -> (PipelineContext, Arc<MemoryJobStore>) {
    let h = harness(engine);
    (h.ctx, h.store)
}
