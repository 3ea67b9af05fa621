//! Database query modules.

pub mod renditions;
pub mod transcode_jobs;
pub mod videos;
