//! Transcode job execution.
//!
//! A claimed job (`running`) is driven to exactly one terminal state:
//!
//! ```text
//! queued -> running -> succeeded | partially_succeeded | failed
//! ```
//!
//! Each target resolution is encoded independently into its hidden staging
//! directory, retried from a clean directory up to `max_attempts` times,
//! verified, and then promoted to its final path with a single rename. A
//! rendition only becomes `ready` after promotion, so nothing partially
//! written is ever served.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::Semaphore;
use vodforge_core::events::{EventBus, EventPayload};
use vodforge_core::layout::{validate_segment_name, MANIFEST_FILE_NAME};
use vodforge_core::{manifest, AssetLayout, Error, JobState, Resolution, Result, VideoId};
use vodforge_db::models::{TranscodeJob, Video};
use vodforge_db::pool::{get_conn, DbPool};
use vodforge_db::queries::{renditions, transcode_jobs, videos};

use super::encoder::{EncodeRequest, Encoder};

/// Per-job execution limits.
#[derive(Debug, Clone, Copy)]
pub struct RunnerSettings {
    pub max_attempts: u32,
    pub per_job_parallelism: usize,
}

/// Final outcome of one rendition within a job.
#[derive(Debug, Clone, PartialEq)]
pub enum RenditionOutcome {
    Ready,
    Failed(String),
}

/// Executes claimed jobs against an [`Encoder`].
pub struct JobRunner {
    db: DbPool,
    layout: AssetLayout,
    encoder: Arc<dyn Encoder>,
    events: Arc<EventBus>,
    settings: RunnerSettings,
}

impl JobRunner {
    pub fn new(
        db: DbPool,
        layout: AssetLayout,
        encoder: Arc<dyn Encoder>,
        events: Arc<EventBus>,
        settings: RunnerSettings,
    ) -> Self {
        Self {
            db,
            layout,
            encoder,
            events,
            settings,
        }
    }

    /// Run a job that has already been claimed (`running`) to completion
    /// and return its terminal state.
    ///
    /// Encode failures never escape this function. An invariant violation
    /// aborts the job as `failed`. Only errors that leave the job's
    /// persisted state unknown (database failures) are returned; such a
    /// job stays `running` and is picked up by crash recovery on the next
    /// start.
    pub async fn run(&self, job: TranscodeJob) -> Result<JobState> {
        let video = {
            let conn = get_conn(&self.db)?;
            videos::get_video(&conn, job.video_id)?
        };
        let Some(video) = video else {
            let reason = Error::not_found("video", job.video_id).to_string();
            return self.finish(&job, JobState::Failed, Some(reason));
        };

        match self.run_renditions(&job, &video).await {
            Ok(outcomes) => {
                let ready = outcomes
                    .iter()
                    .filter(|(_, o)| *o == RenditionOutcome::Ready)
                    .count();
                let failures: Vec<String> = outcomes
                    .iter()
                    .filter_map(|(r, o)| match o {
                        RenditionOutcome::Failed(reason) => Some(format!("{r}: {reason}")),
                        RenditionOutcome::Ready => None,
                    })
                    .collect();
                let state = JobState::aggregate(ready, failures.len());
                let error = (!failures.is_empty()).then(|| failures.join("; "));
                self.finish(&job, state, error)
            }
            Err(e) => {
                tracing::error!(
                    job_id = %job.id,
                    video_id = %job.video_id,
                    source = %video.source_path,
                    resolutions = ?job.resolutions,
                    error = %e,
                    "Transcode job aborted"
                );
                self.abort_unfinished(&job, &e).await?;
                self.finish(&job, JobState::Failed, Some(e.to_string()))
            }
        }
    }

    fn finish(&self, job: &TranscodeJob, state: JobState, error: Option<String>) -> Result<JobState> {
        let conn = get_conn(&self.db)?;
        if !transcode_jobs::finish_job(&conn, job.id, state, error.as_deref())? {
            // Video deleted mid-run (cascade) or state changed under us.
            tracing::warn!(job_id = %job.id, video_id = %job.video_id, "Job was no longer running at finish");
            return Ok(state);
        }

        tracing::info!(
            job_id = %job.id,
            video_id = %job.video_id,
            outcome = %state,
            error = error.as_deref().unwrap_or(""),
            "Transcode job finished"
        );
        self.events.broadcast(EventPayload::JobFinished {
            job_id: job.id,
            video_id: job.video_id,
            state,
            error,
        });
        Ok(state)
    }

    async fn run_renditions(
        &self,
        job: &TranscodeJob,
        video: &Video,
    ) -> Result<Vec<(Resolution, RenditionOutcome)>> {
        {
            let conn = get_conn(&self.db)?;
            for &resolution in &job.resolutions {
                let base = self.layout.base_path(job.video_id, resolution);
                let manifest = self.layout.manifest_path(job.video_id, resolution);
                renditions::reset_for_job(
                    &conn,
                    job.id,
                    job.video_id,
                    resolution,
                    &manifest.to_string_lossy(),
                    &base.to_string_lossy(),
                )?;
            }
        }

        let permits = Semaphore::new(self.settings.per_job_parallelism.max(1));
        let source = Path::new(&video.source_path);
        // The first fatal error drops the sibling encodes, killing their
        // child processes.
        futures::future::try_join_all(job.resolutions.iter().map(|&resolution| {
            let permits = &permits;
            async move {
                let _permit = permits
                    .acquire()
                    .await
                    .map_err(|e| Error::Internal(e.to_string()))?;
                let outcome = self.run_rendition(job, source, resolution).await?;
                Ok::<_, Error>((resolution, outcome))
            }
        }))
        .await
    }

    /// Fail the renditions an aborted job left unfinished and clear their
    /// staging directories. Renditions already promoted stay `ready`.
    async fn abort_unfinished(&self, job: &TranscodeJob, cause: &Error) -> Result<()> {
        let failed = {
            let conn = get_conn(&self.db)?;
            renditions::fail_unfinished(&conn, job.id, &format!("job aborted: {cause}"))?
        };
        for &resolution in &job.resolutions {
            remove_dir_if_exists(&self.layout.staging_path(job.video_id, resolution)).await?;
        }
        if failed > 0 {
            tracing::warn!(job_id = %job.id, video_id = %job.video_id, renditions = failed, "Unfinished renditions marked failed");
        }
        Ok(())
    }

    async fn run_rendition(
        &self,
        job: &TranscodeJob,
        source: &Path,
        resolution: Resolution,
    ) -> Result<RenditionOutcome> {
        let video_id = job.video_id;
        let staging = self.layout.staging_path(video_id, resolution);
        let max_attempts = self.settings.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            remove_dir_if_exists(&staging).await?;
            {
                let conn = get_conn(&self.db)?;
                renditions::mark_encoding(&conn, job.id, video_id, resolution)?;
            }
            tracing::info!(job_id = %job.id, video_id = %video_id, resolution = %resolution, attempt, "Encoding rendition");
            self.events.broadcast(EventPayload::RenditionEncoding {
                job_id: job.id,
                video_id,
                resolution,
                attempt,
            });

            let request = EncodeRequest {
                source,
                resolution,
                output_dir: &staging,
            };
            match self.encoder.encode(request).await {
                Ok(()) => {
                    if let Err(e) = self.promote(video_id, resolution).await {
                        {
                            let conn = get_conn(&self.db)?;
                            renditions::mark_failed(&conn, job.id, video_id, resolution, &e.to_string())?;
                        }
                        if let Err(cleanup) = remove_dir_if_exists(&staging).await {
                            tracing::warn!(
                                job_id = %job.id,
                                video_id = %video_id,
                                resolution = %resolution,
                                error = %cleanup,
                                "Failed to remove staging after rejected promotion"
                            );
                        }
                        return Err(e);
                    }
                    let conn = get_conn(&self.db)?;
                    renditions::mark_ready(&conn, job.id, video_id, resolution)?;
                    tracing::info!(job_id = %job.id, video_id = %video_id, resolution = %resolution, outcome = "ready", "Rendition promoted");
                    self.events.broadcast(EventPayload::RenditionReady {
                        job_id: job.id,
                        video_id,
                        resolution,
                    });
                    return Ok(RenditionOutcome::Ready);
                }
                Err(e @ Error::Invariant(_)) => return Err(e),
                Err(e) => {
                    last_error = match e {
                        Error::EncodeFailed { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    let conn = get_conn(&self.db)?;
                    renditions::record_failed_attempt(&conn, job.id, video_id, resolution, &last_error)?;
                    if attempt < max_attempts {
                        tracing::warn!(
                            job_id = %job.id,
                            video_id = %video_id,
                            resolution = %resolution,
                            attempt,
                            error = %last_error,
                            "Encode attempt failed, retrying"
                        );
                        self.events.broadcast(EventPayload::RenditionRetry {
                            job_id: job.id,
                            video_id,
                            resolution,
                            attempt,
                            error: last_error.clone(),
                        });
                    }
                }
            }
        }

        remove_dir_if_exists(&staging).await?;
        {
            let conn = get_conn(&self.db)?;
            renditions::mark_failed(&conn, job.id, video_id, resolution, &last_error)?;
        }
        tracing::error!(
            job_id = %job.id,
            video_id = %video_id,
            resolution = %resolution,
            attempts = max_attempts,
            outcome = "failed",
            error = %last_error,
            "Rendition failed"
        );
        self.events.broadcast(EventPayload::RenditionFailed {
            job_id: job.id,
            video_id,
            resolution,
            error: last_error.clone(),
        });
        Ok(RenditionOutcome::Failed(last_error))
    }

    /// Verify the staged rendition and move it to its final path.
    ///
    /// Every segment the manifest references must exist in staging and
    /// match the segment grammar; otherwise nothing is moved and
    /// [`Error::Invariant`] is returned.
    async fn promote(&self, video_id: VideoId, resolution: Resolution) -> Result<()> {
        let staging = self.layout.staging_path(video_id, resolution);
        let target = self.layout.base_path(video_id, resolution);

        let playlist = tokio::fs::read_to_string(staging.join(MANIFEST_FILE_NAME))
            .await
            .map_err(|e| {
                Error::Invariant(format!("{resolution}: staged manifest unreadable: {e}"))
            })?;
        let uris = manifest::segment_uris(&playlist);
        if uris.is_empty() {
            return Err(Error::Invariant(format!(
                "{resolution}: manifest references no segments"
            )));
        }
        for uri in uris {
            validate_segment_name(uri).map_err(|_| {
                Error::Invariant(format!("{resolution}: manifest references invalid segment {uri:?}"))
            })?;
            if !tokio::fs::try_exists(staging.join(uri)).await? {
                return Err(Error::Invariant(format!(
                    "{resolution}: manifest references missing segment {uri}"
                )));
            }
        }

        remove_dir_if_exists(&target).await?;
        tokio::fs::rename(&staging, &target).await?;
        Ok(())
    }
}

async fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
