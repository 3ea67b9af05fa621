//! Encode invoker: turns one source file into one HLS rendition.
//!
//! The [`Encoder`] trait is the seam between the job state machine and the
//! external encoding tool. [`FfmpegEncoder`] is the production
//! implementation; tests substitute their own.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use vodforge_core::layout::{MANIFEST_FILE_NAME, SEGMENT_FILENAME_PATTERN};
use vodforge_core::{Error, Resolution, Result};

use super::command::ToolCommand;
use crate::config::{ToolsConfig, TranscodeConfig};

/// Input of a single encode.
#[derive(Debug, Clone, Copy)]
pub struct EncodeRequest<'a> {
    pub source: &'a Path,
    pub resolution: Resolution,
    /// Must be absent or empty; created by the encoder.
    pub output_dir: &'a Path,
}

/// Produces `index.m3u8` plus its segments inside `output_dir`.
///
/// Implementations must only write inside `output_dir` and must return
/// [`Error::EncodeFailed`] unless the manifest exists when they return.
#[async_trait]
pub trait Encoder: Send + Sync {
    async fn encode(&self, request: EncodeRequest<'_>) -> Result<()>;
}

/// Fixed encoder parameters.
#[derive(Debug, Clone)]
pub struct EncodeSettings {
    pub segment_duration_secs: u32,
    pub timeout: Duration,
    pub video_codec: String,
    pub audio_codec: String,
}

impl From<&TranscodeConfig> for EncodeSettings {
    fn from(config: &TranscodeConfig) -> Self {
        Self {
            segment_duration_secs: config.segment_duration_secs,
            timeout: config.encode_timeout(),
            video_codec: config.video_codec.clone(),
            audio_codec: config.audio_codec.clone(),
        }
    }
}

/// Locate the ffmpeg binary: the configured path, else a PATH lookup.
pub fn resolve_ffmpeg(tools: &ToolsConfig) -> Option<PathBuf> {
    match tools.ffmpeg_path {
        Some(ref path) => Some(path.clone()),
        None => which::which("ffmpeg").ok(),
    }
}

/// Runs `ffmpeg` with a scale filter and HLS muxer.
pub struct FfmpegEncoder {
    program: PathBuf,
    settings: EncodeSettings,
}

impl FfmpegEncoder {
    pub fn new(program: PathBuf, settings: EncodeSettings) -> Self {
        Self { program, settings }
    }

    /// Build the ffmpeg argument list for `request`.
    pub fn build_args(&self, request: &EncodeRequest<'_>) -> Vec<String> {
        let out = request.output_dir;
        vec![
            "-y".into(),
            "-nostdin".into(),
            "-i".into(),
            request.source.to_string_lossy().to_string(),
            "-vf".into(),
            request.resolution.scale_filter(),
            "-c:v".into(),
            self.settings.video_codec.clone(),
            "-c:a".into(),
            self.settings.audio_codec.clone(),
            "-start_number".into(),
            "0".into(),
            "-hls_time".into(),
            self.settings.segment_duration_secs.to_string(),
            "-hls_list_size".into(),
            "0".into(),
            "-hls_segment_filename".into(),
            out.join(SEGMENT_FILENAME_PATTERN).to_string_lossy().to_string(),
            "-f".into(),
            "hls".into(),
            out.join(MANIFEST_FILE_NAME).to_string_lossy().to_string(),
        ]
    }
}

/// Check the source is readable and create an empty output directory.
pub async fn prepare_output(request: &EncodeRequest<'_>) -> Result<()> {
    let resolution = request.resolution;

    tokio::fs::File::open(request.source)
        .await
        .map_err(|e| Error::encode_failed(resolution, format!("source not readable: {e}")))?;

    match tokio::fs::read_dir(request.output_dir).await {
        Ok(mut entries) => {
            if entries.next_entry().await?.is_some() {
                return Err(Error::encode_failed(
                    resolution,
                    "output directory is not empty",
                ));
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tokio::fs::create_dir_all(request.output_dir).await?;
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn encode(&self, request: EncodeRequest<'_>) -> Result<()> {
        let resolution = request.resolution;
        prepare_output(&request).await?;

        let args = self.build_args(&request);
        tracing::debug!(resolution = %resolution, ?args, "Running ffmpeg");

        let output = ToolCommand::new(self.program.clone())
            .args(args)
            .timeout(self.settings.timeout)
            .execute()
            .await
            .map_err(|e| match e {
                Error::Tool { message, .. } => Error::encode_failed(resolution, message),
                other => other,
            })?;

        if !output.status.success() {
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            return Err(Error::encode_failed(
                resolution,
                format!("exit code {code}: {}", output.stderr_tail(5)),
            ));
        }

        let manifest = request.output_dir.join(MANIFEST_FILE_NAME);
        if !tokio::fs::try_exists(&manifest).await.unwrap_or(false) {
            return Err(Error::encode_failed(resolution, "manifest was not written"));
        }

        Ok(())
    }
}
