//! The closed set of rendition resolutions and their encoder parameters.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Target rendition resolution.
///
/// Labels are the public names used in URLs, config files and the asset
/// tree. Every variant maps to exactly one output height; width is derived
/// by the encoder to keep the aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    P1080,
}

impl Resolution {
    /// Every supported resolution, lowest first.
    pub const ALL: [Resolution; 3] = [Resolution::P480, Resolution::P720, Resolution::P1080];

    /// Public label, e.g. `"720p"`.
    pub fn label(&self) -> &'static str {
        match self {
            Self::P480 => "480p",
            Self::P720 => "720p",
            Self::P1080 => "1080p",
        }
    }

    /// Output frame height in pixels.
    pub fn height(&self) -> u32 {
        match self {
            Self::P480 => 480,
            Self::P720 => 720,
            Self::P1080 => 1080,
        }
    }

    /// ffmpeg video filter that scales to this height with an even,
    /// aspect-preserving width.
    pub fn scale_filter(&self) -> String {
        format!("scale=-2:{}", self.height())
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Resolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Resolution::ALL
            .into_iter()
            .find(|r| r.label() == s)
            .ok_or_else(|| Error::UnknownResolution(s.to_string()))
    }
}
