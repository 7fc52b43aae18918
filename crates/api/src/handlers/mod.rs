//! Request handlers, one module per resource.
//!
//! Handlers delegate to the pipeline (jobs, uploads) or to the
//! repositories in `atelier_db` and map errors via [`AppError`](crate::error::AppError).

pub mod admin;
pub mod auth;
pub mod images;
pub mod jobs;
pub mod profile;
pub mod translate;
pub mod uploads;
