//! Catalogue management routes used by the upload flow and operators.

use crate::catalog::{self, VideoUpload};
use crate::delivery::Authenticated;
use crate::server::error::AppError;
use crate::server::AppContext;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use vodforge_core::{VideoCategory, VideoId};
use vodforge_db::models::{Rendition, TranscodeJob, Video};
use vodforge_db::pool::get_conn;
use vodforge_db::queries::renditions;

pub fn video_routes() -> Router<AppContext> {
    Router::new()
        .route("/videos", post(register_video))
        .route("/videos/:id", get(get_video).delete(delete_video))
        .route("/videos/:id/transcode", post(enqueue_transcode))
}

#[derive(Debug, Deserialize)]
struct RegisterVideoRequest {
    title: String,
    #[serde(default)]
    description: String,
    category: VideoCategory,
    source_path: String,
    thumbnail_path: Option<String>,
}

#[derive(Debug, Serialize)]
struct RegisterVideoResponse {
    video: Video,
    job: TranscodeJob,
}

#[derive(Debug, Serialize)]
struct VideoDetail {
    #[serde(flatten)]
    video: Video,
    renditions: Vec<Rendition>,
}

async fn register_video(
    State(ctx): State<AppContext>,
    Extension(_auth): Extension<Authenticated>,
    Json(payload): Json<RegisterVideoRequest>,
) -> Result<(StatusCode, Json<RegisterVideoResponse>), AppError> {
    let upload = VideoUpload {
        title: payload.title,
        description: payload.description,
        category: payload.category,
        source_path: payload.source_path,
        thumbnail_path: payload.thumbnail_path,
    };
    let (video, job) = catalog::register_video(&ctx.db, &ctx.queue, &ctx.events, &upload)?;
    Ok((StatusCode::CREATED, Json(RegisterVideoResponse { video, job })))
}

async fn get_video(
    State(ctx): State<AppContext>,
    Extension(_auth): Extension<Authenticated>,
    Path(video_id): Path<VideoId>,
) -> Result<Json<VideoDetail>, AppError> {
    let video = catalog::get_video(&ctx.db, video_id)?;
    let renditions = {
        let conn = get_conn(&ctx.db)?;
        renditions::list_for_video(&conn, video_id)?
    };
    Ok(Json(VideoDetail { video, renditions }))
}

async fn enqueue_transcode(
    State(ctx): State<AppContext>,
    Extension(_auth): Extension<Authenticated>,
    Path(video_id): Path<VideoId>,
) -> Result<(StatusCode, Json<TranscodeJob>), AppError> {
    let job = ctx.queue.enqueue(video_id)?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}

async fn delete_video(
    State(ctx): State<AppContext>,
    Extension(_auth): Extension<Authenticated>,
    Path(video_id): Path<VideoId>,
) -> Result<StatusCode, AppError> {
    catalog::delete_video(&ctx.db, &ctx.queue, &ctx.layout, &ctx.events, video_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
