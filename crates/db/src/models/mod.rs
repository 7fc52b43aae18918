pub mod event;
pub mod image;
pub mod job;
pub mod profile;
pub mod stats;
pub mod status;
