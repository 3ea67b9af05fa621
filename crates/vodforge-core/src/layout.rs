//! On-disk naming convention for rendition assets.
//!
//! ```text
//! {root}/{video_id}/{resolution}/index.m3u8
//! {root}/{video_id}/{resolution}/000.ts
//! {root}/{video_id}/.staging-{resolution}/...
//! ```
//!
//! [`AssetLayout`] is pure path arithmetic. Every externally supplied
//! segment name passes through [`validate_segment_name`] before it is joined
//! onto a directory, so a path built here never escapes the rendition
//! directory.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::ids::VideoId;
use crate::resolution::Resolution;

/// File name of a rendition's playlist.
pub const MANIFEST_FILE_NAME: &str = "index.m3u8";

/// printf-style pattern handed to the encoder for segment files.
pub const SEGMENT_FILENAME_PATTERN: &str = "%03d.ts";

const STAGING_PREFIX: &str = ".staging-";

static SEGMENT_NAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_-]{1,64}\.ts$").expect("segment name regex is valid")
});

/// Check `name` against the segment filename grammar.
///
/// Accepts 1 to 64 ASCII alphanumerics, `_` or `-` followed by `.ts`. Path
/// separators, leading dots and anything else are rejected with
/// [`Error::InvalidSegmentName`].
pub fn validate_segment_name(name: &str) -> Result<&str> {
    if SEGMENT_NAME_REGEX.is_match(name) {
        Ok(name)
    } else {
        Err(Error::InvalidSegmentName)
    }
}

/// Name of the `index`-th segment as written by the encoder.
pub fn segment_file_name(index: u32) -> String {
    format!("{index:03}.ts")
}

/// Path convention for the asset tree under a single media root.
#[derive(Debug, Clone)]
pub struct AssetLayout {
    root: PathBuf,
}

impl AssetLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding every rendition of one video.
    pub fn video_root(&self, video_id: VideoId) -> PathBuf {
        self.root.join(video_id.to_string())
    }

    /// Final, externally visible directory of a rendition.
    pub fn base_path(&self, video_id: VideoId, resolution: Resolution) -> PathBuf {
        self.video_root(video_id).join(resolution.label())
    }

    pub fn manifest_path(&self, video_id: VideoId, resolution: Resolution) -> PathBuf {
        self.base_path(video_id, resolution).join(MANIFEST_FILE_NAME)
    }

    /// Path of a segment inside the final rendition directory.
    ///
    /// Fails with [`Error::InvalidSegmentName`] before touching the path if
    /// the name does not match the grammar.
    pub fn segment_path(
        &self,
        video_id: VideoId,
        resolution: Resolution,
        segment_name: &str,
    ) -> Result<PathBuf> {
        let name = validate_segment_name(segment_name)?;
        Ok(self.base_path(video_id, resolution).join(name))
    }

    /// Hidden sibling of [`base_path`](Self::base_path) where an encode is
    /// written before promotion. Never served.
    pub fn staging_path(&self, video_id: VideoId, resolution: Resolution) -> PathBuf {
        self.video_root(video_id)
            .join(format!("{STAGING_PREFIX}{}", resolution.label()))
    }
}
