//! Transcode job queue operations.
//!
//! Every state change is a single guarded `UPDATE` (the expected prior state
//! is part of the `WHERE` clause), so a job can never leave a terminal state
//! and two workers can never claim the same job.

use chrono::Utc;
use rusqlite::{Connection, ErrorCode};
use vodforge_core::{Error, JobId, JobState, Resolution, Result, VideoId, VideoStatus};

use crate::models::TranscodeJob;

const COLS: &str = "id, video_id, resolutions, state, requeue_count, max_requeues,
    locked_by, error, created_at, updated_at, started_at, completed_at";

/// Create a new `queued` job for `video_id`.
///
/// Fails with [`Error::DuplicateActiveJob`] if the video already has a
/// queued or running job, and with [`Error::NotFound`] if the video does not
/// exist. Both checks are enforced by the database.
pub fn create_job(
    conn: &Connection,
    video_id: VideoId,
    resolutions: &[Resolution],
    max_requeues: u32,
) -> Result<TranscodeJob> {
    let id = JobId::new();
    let now = Utc::now().to_rfc3339();
    let resolutions_json =
        serde_json::to_string(resolutions).map_err(|e| Error::Internal(e.to_string()))?;

    let q = format!(
        "INSERT INTO transcode_jobs (id, video_id, resolutions, state, max_requeues,
            created_at, updated_at)
         VALUES (?1, ?2, ?3, 'queued', ?4, ?5, ?5)
         RETURNING {COLS}"
    );
    conn.query_row(
        &q,
        rusqlite::params![
            id.to_string(),
            video_id.as_i64(),
            resolutions_json,
            max_requeues,
            &now
        ],
        TranscodeJob::from_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            Error::DuplicateActiveJob { video_id }
        }
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY =>
        {
            Error::not_found("video", video_id)
        }
        rusqlite::Error::SqliteFailure(err, msg) if err.code == ErrorCode::ConstraintViolation => {
            Error::Conflict(msg.unwrap_or_else(|| err.to_string()))
        }
        other => Error::database(other.to_string()),
    })
}

/// Get a job by ID.
pub fn get_job(conn: &Connection, id: JobId) -> Result<Option<TranscodeJob>> {
    let q = format!("SELECT {COLS} FROM transcode_jobs WHERE id = ?1");
    let result = conn.query_row(&q, [id.to_string()], TranscodeJob::from_row);
    match result {
        Ok(j) => Ok(Some(j)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// The queued or running job of a video, if any.
pub fn get_active_job_for_video(conn: &Connection, video_id: VideoId) -> Result<Option<TranscodeJob>> {
    let q = format!(
        "SELECT {COLS} FROM transcode_jobs
         WHERE video_id = ?1 AND state IN ('queued', 'running')"
    );
    let result = conn.query_row(&q, [video_id.as_i64()], TranscodeJob::from_row);
    match result {
        Ok(j) => Ok(Some(j)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// List jobs with optional state filter and pagination, oldest first.
pub fn list_jobs(
    conn: &Connection,
    state: Option<JobState>,
    offset: i64,
    limit: i64,
) -> Result<Vec<TranscodeJob>> {
    let q = format!(
        "SELECT {COLS} FROM transcode_jobs
         WHERE (?1 IS NULL OR state = ?1)
         ORDER BY created_at ASC LIMIT ?2 OFFSET ?3"
    );
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map(
            rusqlite::params![state.map(|s| s.as_str()), limit, offset],
            TranscodeJob::from_row,
        )
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Atomically claim the oldest queued job for `worker`.
///
/// Sets `state='running'`, `locked_by` and `started_at`, and moves the
/// video to `processing` in the same transaction.
pub fn dequeue_next(conn: &Connection, worker: &str) -> Result<Option<TranscodeJob>> {
    let now = Utc::now().to_rfc3339();
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;

    let q = format!(
        "UPDATE transcode_jobs
         SET state = 'running', locked_by = ?1, started_at = ?2, updated_at = ?2
         WHERE id = (
             SELECT id FROM transcode_jobs WHERE state = 'queued'
             ORDER BY created_at ASC LIMIT 1
         ) AND state = 'queued'
         RETURNING {COLS}"
    );
    let job = match tx.query_row(&q, rusqlite::params![worker, &now], TranscodeJob::from_row) {
        Ok(j) => j,
        Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
        Err(e) => return Err(Error::database(e.to_string())),
    };

    tx.execute(
        "UPDATE videos SET status = ?1, updated_at = ?2 WHERE id = ?3",
        rusqlite::params![VideoStatus::Processing.as_str(), &now, job.video_id.as_i64()],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    tx.commit().map_err(|e| Error::database(e.to_string()))?;
    Ok(Some(job))
}

/// Move a running job to a terminal state and record the matching video
/// status in one transaction.
///
/// Returns `false` (and changes nothing) if the job was not `running`.
pub fn finish_job(
    conn: &Connection,
    id: JobId,
    state: JobState,
    error: Option<&str>,
) -> Result<bool> {
    let Some(video_status) = VideoStatus::for_outcome(state) else {
        return Err(Error::Invariant(format!(
            "finish_job called with non-terminal state {state}"
        )));
    };

    let now = Utc::now().to_rfc3339();
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;

    let video_id: Option<i64> = match tx.query_row(
        "UPDATE transcode_jobs
         SET state = ?1, error = ?2, completed_at = ?3, updated_at = ?3, locked_by = NULL
         WHERE id = ?4 AND state = 'running'
         RETURNING video_id",
        rusqlite::params![state.as_str(), error, &now, id.to_string()],
        |row| row.get(0),
    ) {
        Ok(v) => Some(v),
        Err(rusqlite::Error::QueryReturnedNoRows) => None,
        Err(e) => return Err(Error::database(e.to_string())),
    };

    let Some(video_id) = video_id else {
        return Ok(false);
    };

    tx.execute(
        "UPDATE videos SET status = ?1, updated_at = ?2 WHERE id = ?3",
        rusqlite::params![video_status.as_str(), &now, video_id],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    tx.commit().map_err(|e| Error::database(e.to_string()))?;
    Ok(true)
}

// ---------------------------------------------------------------------------
// Crash recovery
// ---------------------------------------------------------------------------

/// What happened to a job found `running` at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// Put back in the queue; carries the new requeue count.
    Requeued { requeue_count: u32 },
    /// Requeue budget exhausted; job and video marked failed.
    Abandoned,
}

#[derive(Debug, Clone)]
pub struct RecoveredJob {
    pub job_id: JobId,
    pub video_id: VideoId,
    pub outcome: RecoveryOutcome,
}

/// Resolve every job left `running` by a previous process.
///
/// Must run before any worker starts. Jobs under their requeue budget are
/// requeued (and their renditions reset to `pending`); the rest are failed
/// with their video, and their unfinished renditions are marked failed.
pub fn recover_orphans(conn: &Connection, error: &str) -> Result<Vec<RecoveredJob>> {
    let now = Utc::now().to_rfc3339();
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;

    let orphans = {
        let q = format!("SELECT {COLS} FROM transcode_jobs WHERE state = 'running'");
        let mut stmt = tx.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
        let rows = stmt
            .query_map([], TranscodeJob::from_row)
            .map_err(|e| Error::database(e.to_string()))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::database(e.to_string()))?;
        rows
    };

    let mut recovered = Vec::with_capacity(orphans.len());
    for job in orphans {
        let outcome = if job.requeue_count < job.max_requeues {
            tx.execute(
                "UPDATE transcode_jobs
                 SET state = 'queued', requeue_count = requeue_count + 1,
                     locked_by = NULL, started_at = NULL, updated_at = ?1
                 WHERE id = ?2 AND state = 'running'",
                rusqlite::params![&now, job.id.to_string()],
            )
            .map_err(|e| Error::database(e.to_string()))?;
            tx.execute(
                "UPDATE renditions
                 SET state = 'pending', retry_count = 0, error = NULL, updated_at = ?1
                 WHERE job_id = ?2",
                rusqlite::params![&now, job.id.to_string()],
            )
            .map_err(|e| Error::database(e.to_string()))?;
            RecoveryOutcome::Requeued {
                requeue_count: job.requeue_count + 1,
            }
        } else {
            tx.execute(
                "UPDATE transcode_jobs
                 SET state = 'failed', error = ?1, locked_by = NULL,
                     completed_at = ?2, updated_at = ?2
                 WHERE id = ?3 AND state = 'running'",
                rusqlite::params![error, &now, job.id.to_string()],
            )
            .map_err(|e| Error::database(e.to_string()))?;
            tx.execute(
                "UPDATE renditions
                 SET state = 'failed', error = ?1, updated_at = ?2
                 WHERE job_id = ?3 AND state IN ('pending', 'encoding')",
                rusqlite::params![error, &now, job.id.to_string()],
            )
            .map_err(|e| Error::database(e.to_string()))?;
            tx.execute(
                "UPDATE videos SET status = 'failed', updated_at = ?1 WHERE id = ?2",
                rusqlite::params![&now, job.video_id.as_i64()],
            )
            .map_err(|e| Error::database(e.to_string()))?;
            RecoveryOutcome::Abandoned
        };

        recovered.push(RecoveredJob {
            job_id: job.id,
            video_id: job.video_id,
            outcome,
        });
    }

    tx.commit().map_err(|e| Error::database(e.to_string()))?;
    Ok(recovered)
}
