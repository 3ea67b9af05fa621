//! Transcode job and pipeline event inspection.

use crate::delivery::Authenticated;
use crate::server::error::AppError;
use crate::server::AppContext;
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Extension, Json, Router,
};
use serde::Deserialize;
use vodforge_core::events::Event;
use vodforge_core::{JobId, JobState};
use vodforge_db::models::TranscodeJob;

pub fn job_routes() -> Router<AppContext> {
    Router::new()
        .route("/jobs", get(list_jobs))
        .route("/jobs/:id", get(get_job))
        .route("/events", get(recent_events))
}

#[derive(Debug, Deserialize)]
struct ListJobsQuery {
    status: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn list_jobs(
    State(ctx): State<AppContext>,
    Extension(_auth): Extension<Authenticated>,
    Query(params): Query<ListJobsQuery>,
) -> Result<Json<Vec<TranscodeJob>>, AppError> {
    let state = params
        .status
        .as_deref()
        .map(str::parse::<JobState>)
        .transpose()?;
    let offset = params.offset.unwrap_or(0).max(0);
    let limit = params.limit.unwrap_or(100).clamp(1, 500);

    Ok(Json(ctx.queue.list_jobs(state, offset, limit)?))
}

async fn get_job(
    State(ctx): State<AppContext>,
    Extension(_auth): Extension<Authenticated>,
    Path(job_id): Path<JobId>,
) -> Result<Json<TranscodeJob>, AppError> {
    Ok(Json(ctx.queue.get_job(job_id)?))
}

#[derive(Debug, Deserialize)]
struct EventsQuery {
    limit: Option<usize>,
}

/// Most recent pipeline events, newest first.
async fn recent_events(
    State(ctx): State<AppContext>,
    Extension(_auth): Extension<Authenticated>,
    Query(params): Query<EventsQuery>,
) -> Json<Vec<Event>> {
    Json(ctx.events.recent_events(params.limit.unwrap_or(50)))
}
