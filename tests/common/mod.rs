//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which creates a file-backed DB and an asset root
//! in a temp directory, an EventBus, and a [`JobQueue`]. [`FakeEncoder`]
//! stands in for ffmpeg and writes real playlists and segment files.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use tempfile::TempDir;

use vodforge::config::Config;
use vodforge::server::{create_router, AppContext};
use vodforge::transcode::encoder::prepare_output;
use vodforge::transcode::{EncodeRequest, Encoder, JobQueue, JobRunner, RunnerSettings};
use vodforge_core::events::EventBus;
use vodforge_core::layout::{segment_file_name, MANIFEST_FILE_NAME};
use vodforge_core::manifest::MediaPlaylist;
use vodforge_core::{AssetLayout, Error, Resolution, Result, VideoCategory};
use vodforge_db::models::{NewVideo, Video};
use vodforge_db::pool::{init_pool, DbPool, PooledConnection};
use vodforge_db::queries::videos;

pub struct TestHarness {
    pub config: Config,
    pub db: DbPool,
    pub layout: AssetLayout,
    pub events: Arc<EventBus>,
    pub queue: Arc<JobQueue>,
    pub dir: TempDir,
}

impl TestHarness {
    /// Create a new harness with default configuration and the access gate
    /// switched off, so tests can call the API without credentials.
    pub fn new() -> Self {
        let mut config = Config::default();
        config.server.auth.enabled = false;
        Self::with_config(config)
    }

    /// Create a new harness; storage paths are redirected into a temp dir.
    pub fn with_config(mut config: Config) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        config.storage.media_root = dir.path().join("hls");
        config.storage.database_path = dir.path().join("vodforge.db");
        std::fs::create_dir_all(&config.storage.media_root).unwrap();

        let db = init_pool(&config.storage.database_path.to_string_lossy())
            .expect("failed to create pool");
        let layout = AssetLayout::new(config.storage.media_root.clone());
        let events = Arc::new(EventBus::default());
        let queue = Arc::new(JobQueue::new(
            db.clone(),
            Arc::clone(&events),
            config.transcode.resolutions.clone(),
            config.transcode.max_requeues,
        ));

        Self {
            config,
            db,
            layout,
            events,
            queue,
            dir,
        }
    }

    pub fn conn(&self) -> PooledConnection {
        self.db.get().expect("failed to get connection")
    }

    /// Write a fake upload and return its path.
    pub fn source_file(&self, name: &str) -> PathBuf {
        let uploads = self.dir.path().join("uploads");
        std::fs::create_dir_all(&uploads).unwrap();
        let path = uploads.join(name);
        std::fs::write(&path, b"not really a video").unwrap();
        path
    }

    /// Insert a video row with an existing source file, without queueing.
    pub fn create_video(&self, title: &str) -> Video {
        self.insert_video(title, None)
    }

    /// Like [`create_video`](Self::create_video), with a thumbnail file too.
    pub fn create_video_with_thumbnail(&self, title: &str) -> Video {
        let thumbnail = self.source_file(&format!("{title}.jpg"));
        self.insert_video(title, Some(thumbnail.to_string_lossy().into_owned()))
    }

    fn insert_video(&self, title: &str, thumbnail_path: Option<String>) -> Video {
        let source = self.source_file(&format!("{title}.mp4"));
        videos::create_video(
            &self.conn(),
            &NewVideo {
                title,
                description: "",
                category: VideoCategory::Documentary,
                source_path: &source.to_string_lossy(),
                thumbnail_path: thumbnail_path.as_deref(),
            },
        )
        .unwrap()
    }

    pub fn runner(&self, encoder: Arc<dyn Encoder>) -> JobRunner {
        JobRunner::new(
            self.db.clone(),
            self.layout.clone(),
            encoder,
            Arc::clone(&self.events),
            RunnerSettings {
                max_attempts: self.config.transcode.max_attempts,
                per_job_parallelism: self.config.transcode.per_job_parallelism,
            },
        )
    }

    pub fn ctx(&self) -> AppContext {
        AppContext::new(
            Arc::new(self.config.clone()),
            self.db.clone(),
            Arc::clone(&self.events),
            Arc::clone(&self.queue),
        )
    }

    pub fn router(&self) -> Router {
        create_router(self.ctx())
    }
}

/// Encoder double that writes `segments` segment files and a playlist.
#[derive(Default)]
pub struct FakeEncoder {
    segments: u32,
    always_fail: HashSet<Resolution>,
    fail_first: HashMap<Resolution, u32>,
    missing_segment: HashSet<Resolution>,
    delay: Option<Duration>,
    calls: Mutex<HashMap<Resolution, u32>>,
}

impl FakeEncoder {
    pub fn new() -> Self {
        Self {
            segments: 3,
            ..Default::default()
        }
    }

    /// Fail every attempt for `resolution`.
    pub fn failing(mut self, resolution: Resolution) -> Self {
        self.always_fail.insert(resolution);
        self
    }

    /// Fail the first `n` attempts for `resolution`, then succeed.
    pub fn failing_first(mut self, resolution: Resolution, n: u32) -> Self {
        self.fail_first.insert(resolution, n);
        self
    }

    /// Write a playlist that references a segment that was never written.
    pub fn with_missing_segment(mut self, resolution: Resolution) -> Self {
        self.missing_segment.insert(resolution);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of encode calls made for `resolution`.
    pub fn calls(&self, resolution: Resolution) -> u32 {
        self.calls
            .lock()
            .unwrap()
            .get(&resolution)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl Encoder for FakeEncoder {
    async fn encode(&self, request: EncodeRequest<'_>) -> Result<()> {
        let resolution = request.resolution;
        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(resolution).or_insert(0);
            *count += 1;
            *count
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        prepare_output(&request).await?;
        let dir = request.output_dir;

        let fail_first = self.fail_first.get(&resolution).copied().unwrap_or(0);
        if self.always_fail.contains(&resolution) || attempt <= fail_first {
            // Leave partial output behind, like a crashed encoder would.
            tokio::fs::write(dir.join(segment_file_name(0)), b"partial").await?;
            return Err(Error::encode_failed(resolution, "exit code 1: simulated failure"));
        }

        let mut playlist = MediaPlaylist::new(10);
        for i in 0..self.segments {
            let name = segment_file_name(i);
            tokio::fs::write(dir.join(&name), vec![0x47u8; 188]).await?;
            playlist.add_segment(10.0, name);
        }
        if self.missing_segment.contains(&resolution) {
            playlist.add_segment(10.0, segment_file_name(self.segments));
        }
        tokio::fs::write(dir.join(MANIFEST_FILE_NAME), playlist.render()).await?;
        Ok(())
    }
}
