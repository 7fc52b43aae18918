//! Job lifecycle events.
//!
//! Submission and reconciliation publish a [`JobEvent`] on the shared
//! [`EventBus`] for every status transition they perform.
//! [`EventPersistence`] appends each one to the `job_events` table.

pub mod bus;
pub mod event;
pub mod persistence;

pub use bus::EventBus;
pub use event::{JobEvent, JobEventKind};
pub use persistence::EventPersistence;
