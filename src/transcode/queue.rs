//! Durable job queue: enqueue with per-video deduplication, inspection, and
//! crash recovery. State lives in the database; this type adds event
//! publication and wakes idle workers.

use std::sync::Arc;

use tokio::sync::Notify;
use vodforge_core::events::{EventBus, EventPayload};
use vodforge_core::{Error, JobId, JobState, Resolution, Result, VideoId};
use vodforge_db::models::TranscodeJob;
use vodforge_db::pool::{get_conn, DbPool};
use vodforge_db::queries::transcode_jobs::{self, RecoveredJob, RecoveryOutcome};
use vodforge_db::queries::videos;

/// Error recorded on jobs that exhausted their requeue budget.
const CRASH_LIMIT_REASON: &str = "interrupted by a crash; requeue limit reached";

pub struct JobQueue {
    db: DbPool,
    events: Arc<EventBus>,
    notify: Arc<Notify>,
    resolutions: Vec<Resolution>,
    max_requeues: u32,
}

impl JobQueue {
    pub fn new(
        db: DbPool,
        events: Arc<EventBus>,
        resolutions: Vec<Resolution>,
        max_requeues: u32,
    ) -> Self {
        Self {
            db,
            events,
            notify: Arc::new(Notify::new()),
            resolutions,
            max_requeues,
        }
    }

    /// Handle that idle workers wait on; signalled on every enqueue.
    pub fn notifier(&self) -> Arc<Notify> {
        Arc::clone(&self.notify)
    }

    /// Queue a transcode of every configured resolution for `video_id`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the video does not exist.
    /// - [`Error::DuplicateActiveJob`] if the video already has a queued or
    ///   running job. This holds under concurrent callers.
    pub fn enqueue(&self, video_id: VideoId) -> Result<TranscodeJob> {
        let conn = get_conn(&self.db)?;
        if videos::get_video(&conn, video_id)?.is_none() {
            return Err(Error::not_found("video", video_id));
        }

        match transcode_jobs::create_job(&conn, video_id, &self.resolutions, self.max_requeues) {
            Ok(job) => {
                tracing::info!(job_id = %job.id, video_id = %video_id, "Transcode job queued");
                self.events.broadcast(EventPayload::JobQueued {
                    job_id: job.id,
                    video_id,
                });
                self.notify.notify_one();
                Ok(job)
            }
            Err(e @ Error::DuplicateActiveJob { .. }) => {
                tracing::info!(video_id = %video_id, outcome = "duplicate", "Enqueue rejected: job already active");
                self.events
                    .broadcast(EventPayload::DuplicateRejected { video_id });
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    pub fn get_job(&self, job_id: JobId) -> Result<TranscodeJob> {
        let conn = get_conn(&self.db)?;
        transcode_jobs::get_job(&conn, job_id)?.ok_or_else(|| Error::not_found("job", job_id))
    }

    pub fn list_jobs(&self, state: Option<JobState>, offset: i64, limit: i64) -> Result<Vec<TranscodeJob>> {
        let conn = get_conn(&self.db)?;
        transcode_jobs::list_jobs(&conn, state, offset, limit)
    }

    pub fn active_job_for(&self, video_id: VideoId) -> Result<Option<TranscodeJob>> {
        let conn = get_conn(&self.db)?;
        transcode_jobs::get_active_job_for_video(&conn, video_id)
    }

    /// Resolve jobs left `running` by a previous process. Call once at
    /// startup, before any worker runs.
    pub fn recover_orphans(&self) -> Result<Vec<RecoveredJob>> {
        let conn = get_conn(&self.db)?;
        let recovered = transcode_jobs::recover_orphans(&conn, CRASH_LIMIT_REASON)?;

        for job in &recovered {
            match job.outcome {
                RecoveryOutcome::Requeued { requeue_count } => {
                    tracing::warn!(
                        job_id = %job.job_id,
                        video_id = %job.video_id,
                        requeue_count,
                        error = %Error::JobCrashRecovered { job_id: job.job_id },
                        "Requeued job interrupted by a crash"
                    );
                    self.events.broadcast(EventPayload::JobRecovered {
                        job_id: job.job_id,
                        video_id: job.video_id,
                        requeue_count,
                    });
                }
                RecoveryOutcome::Abandoned => {
                    tracing::error!(
                        job_id = %job.job_id,
                        video_id = %job.video_id,
                        outcome = %JobState::Failed,
                        "Job interrupted by a crash again; marked failed"
                    );
                    self.events.broadcast(EventPayload::JobAbandoned {
                        job_id: job.job_id,
                        video_id: job.video_id,
                    });
                }
            }
        }

        if recovered
            .iter()
            .any(|j| matches!(j.outcome, RecoveryOutcome::Requeued { .. }))
        {
            self.notify.notify_one();
        }
        Ok(recovered)
    }
}
