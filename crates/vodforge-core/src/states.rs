//! Lifecycle enums for videos, transcode jobs and renditions.
//!
//! All enums serialize in snake_case and use the same strings in the
//! database, so `as_str` and `FromStr` are the only conversion points.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

macro_rules! string_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant),)+
                    other => Err(Error::Validation(format!(
                        concat!("unknown ", stringify!($name), ": {}"),
                        other
                    ))),
                }
            }
        }
    };
}

// ---------------------------------------------------------------------------
// VideoStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a video as seen by the rest of the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    Uploaded,
    Processing,
    Ready,
    /// Some renditions are playable, others failed.
    Degraded,
    Failed,
}

string_enum!(VideoStatus {
    Uploaded => "uploaded",
    Processing => "processing",
    Ready => "ready",
    Degraded => "degraded",
    Failed => "failed",
});

impl VideoStatus {
    /// Video status implied by a terminal job state.
    pub fn for_outcome(state: JobState) -> Option<Self> {
        match state {
            JobState::Succeeded => Some(Self::Ready),
            JobState::PartiallySucceeded => Some(Self::Degraded),
            JobState::Failed => Some(Self::Failed),
            JobState::Queued | JobState::Running => None,
        }
    }
}

// ---------------------------------------------------------------------------
// VideoCategory
// ---------------------------------------------------------------------------

/// Genre shown in the catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoCategory {
    Drama,
    Romance,
    Comedy,
    Action,
    Documentary,
}

string_enum!(VideoCategory {
    Drama => "drama",
    Romance => "romance",
    Comedy => "comedy",
    Action => "action",
    Documentary => "documentary",
});

// ---------------------------------------------------------------------------
// JobState
// ---------------------------------------------------------------------------

/// State of a transcode job.
///
/// `queued -> running -> {succeeded, partially_succeeded, failed}`; terminal
/// states have no outgoing transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    PartiallySucceeded,
    Failed,
}

string_enum!(JobState {
    Queued => "queued",
    Running => "running",
    Succeeded => "succeeded",
    PartiallySucceeded => "partially_succeeded",
    Failed => "failed",
});

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::PartiallySucceeded | Self::Failed
        )
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Terminal state from per-rendition outcomes.
    pub fn aggregate(ready: usize, failed: usize) -> Self {
        match (ready, failed) {
            (0, _) => Self::Failed,
            (_, 0) => Self::Succeeded,
            _ => Self::PartiallySucceeded,
        }
    }
}

// ---------------------------------------------------------------------------
// RenditionState
// ---------------------------------------------------------------------------

/// State of one (video, resolution) rendition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenditionState {
    Pending,
    Encoding,
    Ready,
    Failed,
}

string_enum!(RenditionState {
    Pending => "pending",
    Encoding => "encoding",
    Ready => "ready",
    Failed => "failed",
});
