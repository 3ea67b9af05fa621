mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./vodforge.toml",
        "~/.config/vodforge/config.toml",
        "/etc/vodforge/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    if config.server.auth.enabled && config.server.auth.tokens.is_empty() {
        anyhow::bail!(
            "Authentication is enabled but no access tokens are configured \
             (set server.auth.tokens, or server.auth.enabled = false to serve without auth)"
        );
    }

    let t = &config.transcode;
    if t.resolutions.is_empty() {
        anyhow::bail!("At least one target resolution is required");
    }
    let mut seen = HashSet::new();
    if let Some(dup) = t.resolutions.iter().find(|r| !seen.insert(**r)) {
        anyhow::bail!("Resolution {} is listed more than once", dup);
    }
    if t.segment_duration_secs == 0 {
        anyhow::bail!("segment_duration_secs must be at least 1");
    }
    if t.max_concurrent_jobs == 0 {
        anyhow::bail!("max_concurrent_jobs must be at least 1");
    }
    if t.per_job_parallelism == 0 {
        anyhow::bail!("per_job_parallelism must be at least 1");
    }
    if t.max_attempts == 0 {
        anyhow::bail!("max_attempts must be at least 1");
    }
    if t.encode_timeout_secs == 0 {
        anyhow::bail!("encode_timeout_secs must be at least 1");
    }
    if t.poll_interval_secs == 0 {
        anyhow::bail!("poll_interval_secs must be at least 1");
    }

    if let Some(ref ffmpeg) = config.tools.ffmpeg_path {
        if !ffmpeg.exists() {
            tracing::warn!("Configured ffmpeg path does not exist: {:?}", ffmpeg);
        }
    }

    Ok(())
}
