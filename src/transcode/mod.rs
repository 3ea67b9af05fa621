//! Asynchronous transcoding pipeline.
//!
//! - [`encoder`]: the external encoder seam and its ffmpeg implementation
//! - [`job`]: per-job state machine with staging, retries and promotion
//! - [`queue`]: durable enqueue with per-video deduplication and recovery
//! - [`worker`]: bounded worker pool draining the queue

pub mod command;
pub mod encoder;
pub mod job;
pub mod queue;
pub mod worker;

pub use encoder::{EncodeRequest, EncodeSettings, Encoder, FfmpegEncoder};
pub use job::{JobRunner, RenditionOutcome, RunnerSettings};
pub use queue::JobQueue;
pub use worker::WorkerPool;
