use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use vodforge_core::Resolution;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub transcode: TranscodeConfig,

    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub auth: AuthConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            auth: AuthConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Require an access token on API and streaming routes. On unless the
    /// config turns it off.
    #[serde(default = "default_auth_enabled")]
    pub enabled: bool,

    /// Access tokens issued by the surrounding application. Accepted as
    /// `Authorization: Bearer <token>` or in the `access_token` cookie.
    #[serde(default)]
    pub tokens: Vec<String>,
}

fn default_auth_enabled() -> bool {
    true
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: default_auth_enabled(),
            tokens: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Root of the HLS asset tree
    #[serde(default = "default_media_root")]
    pub media_root: PathBuf,

    /// SQLite database holding videos, jobs and renditions
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

fn default_media_root() -> PathBuf {
    PathBuf::from("./media/hls")
}
fn default_database_path() -> PathBuf {
    PathBuf::from("./vodforge.db")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            media_root: default_media_root(),
            database_path: default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscodeConfig {
    /// Renditions produced for every upload
    #[serde(default = "default_resolutions")]
    pub resolutions: Vec<Resolution>,

    /// Target HLS segment length in seconds
    #[serde(default = "default_segment_duration")]
    pub segment_duration_secs: u32,

    /// Jobs executed at the same time
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Renditions of one job encoded at the same time
    #[serde(default = "default_per_job_parallelism")]
    pub per_job_parallelism: usize,

    /// Encode attempts per rendition before it is marked failed
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Times a job interrupted by a crash is put back in the queue
    #[serde(default = "default_max_requeues")]
    pub max_requeues: u32,

    /// Wall-clock limit for a single encoder run
    #[serde(default = "default_encode_timeout")]
    pub encode_timeout_secs: u64,

    /// How often idle workers re-check the queue
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_video_codec")]
    pub video_codec: String,

    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,
}

fn default_resolutions() -> Vec<Resolution> {
    Resolution::ALL.to_vec()
}
fn default_segment_duration() -> u32 {
    10
}
fn default_max_concurrent_jobs() -> usize {
    2
}
fn default_per_job_parallelism() -> usize {
    1
}
fn default_max_attempts() -> u32 {
    3
}
fn default_max_requeues() -> u32 {
    1
}
fn default_encode_timeout() -> u64 {
    3600
}
fn default_poll_interval() -> u64 {
    2
}
fn default_video_codec() -> String {
    "libx264".to_string()
}
fn default_audio_codec() -> String {
    "aac".to_string()
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            resolutions: default_resolutions(),
            segment_duration_secs: default_segment_duration(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            per_job_parallelism: default_per_job_parallelism(),
            max_attempts: default_max_attempts(),
            max_requeues: default_max_requeues(),
            encode_timeout_secs: default_encode_timeout(),
            poll_interval_secs: default_poll_interval(),
            video_codec: default_video_codec(),
            audio_codec: default_audio_codec(),
        }
    }
}

impl TranscodeConfig {
    pub fn encode_timeout(&self) -> Duration {
        Duration::from_secs(self.encode_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ToolsConfig {
    /// Explicit ffmpeg binary; looked up on PATH when unset
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,
}
