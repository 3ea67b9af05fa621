//! Rendition state operations.
//!
//! A rendition row is owned by the job that last reset it. Transitions other
//! than [`reset_for_job`] carry that job id in their `WHERE` clause, so a
//! stale worker can never overwrite the state written by a newer job.

use chrono::Utc;
use rusqlite::Connection;
use vodforge_core::{Error, JobId, Resolution, Result, VideoId};

use crate::models::Rendition;

const COLS: &str = "video_id, resolution, state, retry_count, job_id, manifest_path,
    segment_dir, error, updated_at";

/// Create or reset the rendition of `(video_id, resolution)` to `pending`,
/// owned by `job_id`.
pub fn reset_for_job(
    conn: &Connection,
    job_id: JobId,
    video_id: VideoId,
    resolution: Resolution,
    manifest_path: &str,
    segment_dir: &str,
) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO renditions (video_id, resolution, state, retry_count, job_id,
            manifest_path, segment_dir, error, updated_at)
         VALUES (?1, ?2, 'pending', 0, ?3, ?4, ?5, NULL, ?6)
         ON CONFLICT(video_id, resolution) DO UPDATE SET
            state = 'pending', retry_count = 0, job_id = excluded.job_id,
            manifest_path = excluded.manifest_path, segment_dir = excluded.segment_dir,
            error = NULL, updated_at = excluded.updated_at",
        rusqlite::params![
            video_id.as_i64(),
            resolution.label(),
            job_id.to_string(),
            manifest_path,
            segment_dir,
            now
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

fn set_state(
    conn: &Connection,
    job_id: JobId,
    video_id: VideoId,
    resolution: Resolution,
    state: &str,
    error: Option<&str>,
) -> Result<bool> {
    let now = Utc::now().to_rfc3339();
    let n = conn
        .execute(
            "UPDATE renditions SET state = ?1, error = ?2, updated_at = ?3
             WHERE video_id = ?4 AND resolution = ?5 AND job_id = ?6",
            rusqlite::params![
                state,
                error,
                now,
                video_id.as_i64(),
                resolution.label(),
                job_id.to_string()
            ],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Mark an attempt as in progress.
pub fn mark_encoding(
    conn: &Connection,
    job_id: JobId,
    video_id: VideoId,
    resolution: Resolution,
) -> Result<bool> {
    set_state(conn, job_id, video_id, resolution, "encoding", None)
}

/// Mark the rendition servable. Call only after promotion.
pub fn mark_ready(
    conn: &Connection,
    job_id: JobId,
    video_id: VideoId,
    resolution: Resolution,
) -> Result<bool> {
    set_state(conn, job_id, video_id, resolution, "ready", None)
}

/// Mark the rendition permanently failed for this job.
pub fn mark_failed(
    conn: &Connection,
    job_id: JobId,
    video_id: VideoId,
    resolution: Resolution,
    error: &str,
) -> Result<bool> {
    set_state(conn, job_id, video_id, resolution, "failed", Some(error))
}

/// Record a failed attempt and return the new retry count.
pub fn record_failed_attempt(
    conn: &Connection,
    job_id: JobId,
    video_id: VideoId,
    resolution: Resolution,
    error: &str,
) -> Result<u32> {
    let now = Utc::now().to_rfc3339();
    conn.query_row(
        "UPDATE renditions SET retry_count = retry_count + 1, error = ?1, updated_at = ?2
         WHERE video_id = ?3 AND resolution = ?4 AND job_id = ?5
         RETURNING retry_count",
        rusqlite::params![
            error,
            now,
            video_id.as_i64(),
            resolution.label(),
            job_id.to_string()
        ],
        |row| row.get(0),
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => {
            Error::not_found("rendition", format!("{video_id}/{resolution}"))
        }
        other => Error::database(other.to_string()),
    })
}

/// Fail every rendition of `job_id` that has not reached a final state.
///
/// Returns the number of renditions changed.
pub fn fail_unfinished(conn: &Connection, job_id: JobId, error: &str) -> Result<usize> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE renditions SET state = 'failed', error = ?1, updated_at = ?2
         WHERE job_id = ?3 AND state IN ('pending', 'encoding')",
        rusqlite::params![error, now, job_id.to_string()],
    )
    .map_err(|e| Error::database(e.to_string()))
}

/// Get the rendition of `(video_id, resolution)`.
pub fn get_rendition(
    conn: &Connection,
    video_id: VideoId,
    resolution: Resolution,
) -> Result<Option<Rendition>> {
    let q = format!("SELECT {COLS} FROM renditions WHERE video_id = ?1 AND resolution = ?2");
    let result = conn.query_row(
        &q,
        rusqlite::params![video_id.as_i64(), resolution.label()],
        Rendition::from_row,
    );
    match result {
        Ok(r) => Ok(Some(r)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// All renditions of a video.
pub fn list_for_video(conn: &Connection, video_id: VideoId) -> Result<Vec<Rendition>> {
    let q = format!("SELECT {COLS} FROM renditions WHERE video_id = ?1 ORDER BY resolution");
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([video_id.as_i64()], Rendition::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}
