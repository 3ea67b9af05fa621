//! Player-facing routes: catalogue listing, HLS manifests and segments.
//!
//! Manifests are small and sent whole; segments are streamed from disk with
//! `ReaderStream` so a request never buffers a full segment in memory.

use crate::catalog;
use crate::delivery::Authenticated;
use crate::server::error::AppError;
use crate::server::AppContext;
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::Response,
    routing::get,
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use vodforge_core::{Error, VideoCategory, VideoId, VideoStatus};
use vodforge_db::models::Video;

pub fn stream_routes() -> Router<AppContext> {
    Router::new()
        .route("/video/", get(list_videos))
        .route("/video/:id/:resolution/index.m3u8", get(manifest))
        .route("/video/:id/:resolution/:segment", get(segment))
        .route("/video/:id/:resolution/:segment/", get(segment))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    offset: Option<i64>,
    limit: Option<i64>,
}

/// Catalogue entry as shown to players.
#[derive(Debug, Serialize)]
struct VideoSummary {
    id: VideoId,
    created_at: String,
    title: String,
    description: String,
    category: VideoCategory,
    thumbnail: Option<String>,
    status: VideoStatus,
}

impl From<Video> for VideoSummary {
    fn from(v: Video) -> Self {
        Self {
            id: v.id,
            created_at: v.created_at,
            title: v.title,
            description: v.description,
            category: v.category,
            thumbnail: v.thumbnail_path,
            status: v.status,
        }
    }
}

async fn list_videos(
    State(ctx): State<AppContext>,
    Extension(_auth): Extension<Authenticated>,
    Query(params): Query<ListQuery>,
) -> Result<Json<Vec<VideoSummary>>, AppError> {
    let offset = params.offset.unwrap_or(0).max(0);
    let limit = params.limit.unwrap_or(100).clamp(1, 500);
    let videos = catalog::list_videos(&ctx.db, offset, limit)?;
    Ok(Json(videos.into_iter().map(VideoSummary::from).collect()))
}

async fn manifest(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<Authenticated>,
    Path((video_id, resolution)): Path<(VideoId, String)>,
) -> Result<Response, AppError> {
    let manifest = ctx
        .delivery
        .get_manifest(&auth, video_id, &resolution)
        .await?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, manifest.content_type)
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from(manifest.body))
        .map_err(|e| AppError(Error::Internal(e.to_string())))
}

async fn segment(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<Authenticated>,
    Path((video_id, resolution, segment)): Path<(VideoId, String, String)>,
) -> Result<Response, AppError> {
    let segment = ctx
        .delivery
        .get_segment(&auth, video_id, &resolution, &segment)
        .await?;

    let stream = ReaderStream::new(segment.file);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, segment.content_type)
        .header(header::CONTENT_LENGTH, segment.len)
        .header(header::CACHE_CONTROL, "max-age=86400")
        .body(Body::from_stream(stream))
        .map_err(|e| AppError(Error::Internal(e.to_string())))
}
