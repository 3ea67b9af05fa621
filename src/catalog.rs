//! Video catalogue operations shared by the HTTP API and the CLI.
//!
//! Registering a video queues its first transcode, and deleting a video
//! removes its rows, its asset tree, and the uploaded source and thumbnail.

use std::path::Path;
use std::sync::Arc;

use vodforge_core::events::{EventBus, EventPayload};
use vodforge_core::{AssetLayout, Error, Result, VideoCategory, VideoId};
use vodforge_db::models::{NewVideo, TranscodeJob, Video};
use vodforge_db::pool::{get_conn, DbPool};
use vodforge_db::queries::videos;

use crate::transcode::JobQueue;

/// Upload metadata for a new video.
#[derive(Debug, Clone)]
pub struct VideoUpload {
    pub title: String,
    pub description: String,
    pub category: VideoCategory,
    pub source_path: String,
    pub thumbnail_path: Option<String>,
}

/// Store a new video and queue its transcode.
pub fn register_video(
    db: &DbPool,
    queue: &JobQueue,
    events: &Arc<EventBus>,
    upload: &VideoUpload,
) -> Result<(Video, TranscodeJob)> {
    if upload.title.trim().is_empty() {
        return Err(Error::Validation("title is required".into()));
    }
    if !Path::new(&upload.source_path).is_file() {
        return Err(Error::Validation("source file does not exist".into()));
    }

    let video = {
        let conn = get_conn(db)?;
        videos::create_video(
            &conn,
            &NewVideo {
                title: upload.title.trim(),
                description: &upload.description,
                category: upload.category,
                source_path: &upload.source_path,
                thumbnail_path: upload.thumbnail_path.as_deref(),
            },
        )?
    };
    tracing::info!(video_id = %video.id, title = %video.title, "Video registered");
    events.broadcast(EventPayload::VideoRegistered { video_id: video.id });

    let job = queue.enqueue(video.id)?;
    Ok((video, job))
}

/// Delete a video, its jobs, its renditions, its asset tree and the
/// uploaded files it points at.
///
/// Refused with [`Error::Conflict`] while a job is queued or running.
pub async fn delete_video(
    db: &DbPool,
    queue: &JobQueue,
    layout: &AssetLayout,
    events: &Arc<EventBus>,
    video_id: VideoId,
) -> Result<()> {
    if queue.active_job_for(video_id)?.is_some() {
        return Err(Error::Conflict(format!(
            "video {video_id} has an active transcode job"
        )));
    }

    let video = {
        let conn = get_conn(db)?;
        let video = videos::get_video(&conn, video_id)?
            .ok_or_else(|| Error::not_found("video", video_id))?;
        if !videos::delete_video(&conn, video_id)? {
            return Err(Error::not_found("video", video_id));
        }
        video
    };

    match tokio::fs::remove_dir_all(layout.video_root(video_id)).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    remove_file_if_exists(Path::new(&video.source_path)).await?;
    if let Some(thumbnail) = video.thumbnail_path.as_deref() {
        remove_file_if_exists(Path::new(thumbnail)).await?;
    }

    tracing::info!(video_id = %video_id, "Video deleted");
    events.broadcast(EventPayload::VideoDeleted { video_id });
    Ok(())
}

async fn remove_file_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// List the catalogue, newest first.
pub fn list_videos(db: &DbPool, offset: i64, limit: i64) -> Result<Vec<Video>> {
    let conn = get_conn(db)?;
    videos::list_videos(&conn, offset, limit)
}

/// Fetch a single video.
pub fn get_video(db: &DbPool, video_id: VideoId) -> Result<Video> {
    let conn = get_conn(db)?;
    videos::get_video(&conn, video_id)?.ok_or_else(|| Error::not_found("video", video_id))
}
