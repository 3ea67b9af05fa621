//! Rust structs mapping to database tables.
//!
//! Each model implements `from_row` for constructing itself from a
//! `rusqlite::Row` selected with the matching `COLS` list of its query
//! module.

use serde::Serialize;
use std::str::FromStr;
use uuid::Uuid;
use vodforge_core::{
    JobId, JobState, RenditionState, Resolution, VideoCategory, VideoId, VideoStatus,
};

// ---------------------------------------------------------------------------
// helpers
// ---------------------------------------------------------------------------

fn conversion_error(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

/// Parse a UUID-based ID from a text column.
fn parse_id<T: From<Uuid>>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    let uuid = Uuid::parse_str(&s).map_err(|e| conversion_error(idx, e))?;
    Ok(T::from(uuid))
}

fn parse_opt_id<T: From<Uuid>>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<T>> {
    let s: Option<String> = row.get(idx)?;
    match s {
        Some(v) => {
            let uuid = Uuid::parse_str(&v).map_err(|e| conversion_error(idx, e))?;
            Ok(Some(T::from(uuid)))
        }
        None => Ok(None),
    }
}

/// Parse a text column through the type's `FromStr`.
fn parse_text<T>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let s: String = row.get(idx)?;
    s.parse::<T>().map_err(|e| conversion_error(idx, e))
}

// ---------------------------------------------------------------------------
// Video
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct Video {
    pub id: VideoId,
    pub title: String,
    pub description: String,
    pub category: VideoCategory,
    pub source_path: String,
    pub thumbnail_path: Option<String>,
    pub status: VideoStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl Video {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: VideoId::from(row.get::<_, i64>(0)?),
            title: row.get(1)?,
            description: row.get(2)?,
            category: parse_text(row, 3)?,
            source_path: row.get(4)?,
            thumbnail_path: row.get(5)?,
            status: parse_text(row, 6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}

/// Fields supplied when a video is registered.
#[derive(Debug, Clone)]
pub struct NewVideo<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub category: VideoCategory,
    pub source_path: &'a str,
    pub thumbnail_path: Option<&'a str>,
}

// ---------------------------------------------------------------------------
// TranscodeJob
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct TranscodeJob {
    pub id: JobId,
    pub video_id: VideoId,
    pub resolutions: Vec<Resolution>,
    pub state: JobState,
    pub requeue_count: u32,
    pub max_requeues: u32,
    pub locked_by: Option<String>,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl TranscodeJob {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        let resolutions: String = row.get(2)?;
        let resolutions: Vec<Resolution> =
            serde_json::from_str(&resolutions).map_err(|e| conversion_error(2, e))?;
        Ok(Self {
            id: parse_id(row, 0)?,
            video_id: VideoId::from(row.get::<_, i64>(1)?),
            resolutions,
            state: parse_text(row, 3)?,
            requeue_count: row.get(4)?,
            max_requeues: row.get(5)?,
            locked_by: row.get(6)?,
            error: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
            started_at: row.get(10)?,
            completed_at: row.get(11)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Rendition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct Rendition {
    pub video_id: VideoId,
    pub resolution: Resolution,
    pub state: RenditionState,
    /// Failed attempts within the owning job.
    pub retry_count: u32,
    pub job_id: Option<JobId>,
    #[serde(skip)]
    pub manifest_path: String,
    #[serde(skip)]
    pub segment_dir: String,
    pub error: Option<String>,
    pub updated_at: String,
}

impl Rendition {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            video_id: VideoId::from(row.get::<_, i64>(0)?),
            resolution: parse_text(row, 1)?,
            state: parse_text(row, 2)?,
            retry_count: row.get(3)?,
            job_id: parse_opt_id(row, 4)?,
            manifest_path: row.get(5)?,
            segment_dir: row.get(6)?,
            error: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    pub fn is_ready(&self) -> bool {
        self.state == RenditionState::Ready
    }
}
