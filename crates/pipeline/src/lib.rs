//! Job submission and reconciliation protocol.
//!
//! A request is turned into a workflow graph ([`templates`]), handed to the
//! engine and recorded as a job row ([`submit`]). From then on the job is
//! driven to a terminal state either by an [`orchestrator::Orchestrator`]
//! polling it interactively or by the background worker; both funnel
//! completed outputs through the same idempotent [`reconcile::Reconciler`].

use std::sync::Arc;

use atelier_comfyui::GenerationEngine;
use atelier_events::EventBus;
use atelier_storage::ObjectStore;

pub mod error;
pub mod orchestrator;
pub mod reconcile;
pub mod request;
pub mod store;
pub mod submit;
pub mod templates;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::PipelineError;
pub use orchestrator::{OrchestrationHandle, OrchestrationOutcome, OrchestrationState, Orchestrator};
pub use reconcile::{ReconcileError, ReconcileReport, Reconciler};
pub use request::{GenerationRequest, JobParameters};
pub use store::{JobStore, MemoryJobStore, PgJobStore};

/// Collaborators shared by submission, orchestration and reconciliation.
#[derive(Clone)]
pub struct PipelineContext {
    pub engine: Arc<dyn GenerationEngine>,
    pub store: Arc<dyn JobStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub events: Arc<EventBus>,
}
