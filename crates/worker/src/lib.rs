//! Background reconciliation of open generation jobs.
//!
//! Jobs submitted through the API are tracked interactively only while a
//! client is waiting. The [`ReconcileWorker`] picks up everything else:
//! it polls every open job on a fixed interval, persists completed outputs
//! through the shared [`Reconciler`](atelier_pipeline::Reconciler), fails
//! jobs the engine reports as errored, and sweeps rows that never got an
//! engine id once they pass the stale window.

pub mod config;
pub mod process;
pub mod reconcile_loop;

pub use config::WorkerConfig;
pub use reconcile_loop::{CycleReport, ReconcileWorker};
