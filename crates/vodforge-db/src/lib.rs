//! vodforge-db: database access and persistence layer.
//!
//! SQLite-backed storage with connection pooling, embedded migrations,
//! typed models, and query modules for videos, transcode jobs and
//! renditions. Job state lives here so that the queue survives restarts.

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;
