//! Unified error type for vodforge.
//!
//! All crates funnel their failures into [`Error`], which carries enough context
//! for API handlers to derive an HTTP status code via [`Error::http_status`]
//! and a coarse, path-free error code via [`Error::code`].

use std::fmt;

use crate::ids::{JobId, VideoId};
use crate::resolution::Resolution;

/// Unified error type covering all failure modes in vodforge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "video", "job", "segment").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// The caller is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Request data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A conflicting resource already exists.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A queued or running transcode job already exists for the video.
    #[error("Video {video_id} already has an active transcode job")]
    DuplicateActiveJob {
        /// The video that already has an active job.
        video_id: VideoId,
    },

    /// The encoder failed to produce a usable rendition.
    #[error("Encode failed [{resolution}]: {reason}")]
    EncodeFailed {
        /// The rendition being produced.
        resolution: Resolution,
        /// Exit code, timeout or missing-output description.
        reason: String,
    },

    /// A segment name did not match the segment filename grammar.
    #[error("Invalid segment name")]
    InvalidSegmentName,

    /// A resolution label outside the supported set.
    #[error("Unknown resolution: {0}")]
    UnknownResolution(String),

    /// The rendition exists but is not servable yet (or failed).
    #[error("Rendition not ready: video {video_id} at {resolution}")]
    NotReady {
        video_id: VideoId,
        resolution: Resolution,
    },

    /// A job was found `running` with no live worker after a restart.
    #[error("Job {job_id} was interrupted by a crash")]
    JobCrashRecovered {
        /// The interrupted job.
        job_id: JobId,
    },

    /// An internal invariant did not hold; aborts only the affected job.
    #[error("Invariant violated: {0}")]
    Invariant(String),

    /// A database operation failed.
    #[error("Database error: {source}")]
    Database {
        /// The underlying database error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// An external tool (ffmpeg) could not be run.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::Unauthorized(_) => 401,
            Error::Validation(_) => 400,
            Error::Conflict(_) => 409,
            Error::DuplicateActiveJob { .. } => 409,
            Error::EncodeFailed { .. } => 502,
            Error::InvalidSegmentName => 400,
            Error::UnknownResolution(_) => 400,
            Error::NotReady { .. } => 404,
            Error::JobCrashRecovered { .. } => 500,
            Error::Invariant(_) => 500,
            Error::Database { .. } => 500,
            Error::Io { .. } => 500,
            Error::Tool { .. } => 502,
            Error::Internal(_) => 500,
        }
    }

    /// Stable machine-readable code, safe to expose to clients.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "not_found",
            Error::Unauthorized(_) => "unauthorized",
            Error::Validation(_) => "validation_error",
            Error::Conflict(_) => "conflict",
            Error::DuplicateActiveJob { .. } => "duplicate_active_job",
            Error::EncodeFailed { .. } => "encode_failed",
            Error::InvalidSegmentName => "invalid_segment_name",
            Error::UnknownResolution(_) => "unknown_resolution",
            Error::NotReady { .. } => "not_ready",
            Error::JobCrashRecovered { .. } => "job_crash_recovered",
            Error::Invariant(_) => "invariant_violation",
            Error::Database { .. } => "database_error",
            Error::Io { .. } => "io_error",
            Error::Tool { .. } => "tool_error",
            Error::Internal(_) => "internal_error",
        }
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Database`].
    pub fn database(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Database {
            source: source.into(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::EncodeFailed`].
    pub fn encode_failed(resolution: Resolution, reason: impl Into<String>) -> Self {
        Error::EncodeFailed {
            resolution,
            reason: reason.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
