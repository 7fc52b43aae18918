//! Domain types and pure logic shared by every Atelier crate.
//!
//! Nothing in here performs I/O: the workflow template engine, the job kind
//! registry and the error taxonomy are all plain data transformations.

pub mod error;
pub mod job_kind;
pub mod roles;
pub mod types;
pub mod workflow_template;
