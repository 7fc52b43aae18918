//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&PgPool` as the first argument.

pub mod event_repo;
pub mod image_repo;
pub mod job_repo;
pub mod profile_repo;
pub mod stats_repo;

pub use event_repo::EventRepo;
pub use image_repo::ImageRepo;
pub use job_repo::JobRepo;
pub use profile_repo::ProfileRepo;
pub use stats_repo::StatsRepo;
