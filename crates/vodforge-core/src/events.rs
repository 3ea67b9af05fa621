//! Pipeline event system.
//!
//! Every state transition of a transcode job or rendition is published on
//! the [`EventBus`]: a `tokio::sync::broadcast` channel plus a bounded
//! ring-buffer of recent events so that late subscribers (and the jobs API)
//! can catch up.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::broadcast;

use crate::ids::{EventId, JobId, VideoId};
use crate::resolution::Resolution;
use crate::states::JobState;

/// Maximum number of events retained in the ring buffer.
const MAX_RECENT_EVENTS: usize = 100;

// ---------------------------------------------------------------------------
// EventPayload
// ---------------------------------------------------------------------------

/// Payload describing what happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    // -- Catalogue -----------------------------------------------------------
    VideoRegistered {
        video_id: VideoId,
    },
    VideoDeleted {
        video_id: VideoId,
    },

    // -- Job lifecycle -------------------------------------------------------
    JobQueued {
        job_id: JobId,
        video_id: VideoId,
    },
    DuplicateRejected {
        video_id: VideoId,
    },
    JobStarted {
        job_id: JobId,
        video_id: VideoId,
        worker: String,
    },
    JobFinished {
        job_id: JobId,
        video_id: VideoId,
        state: JobState,
        error: Option<String>,
    },
    JobRecovered {
        job_id: JobId,
        video_id: VideoId,
        requeue_count: u32,
    },
    JobAbandoned {
        job_id: JobId,
        video_id: VideoId,
    },

    // -- Renditions ----------------------------------------------------------
    RenditionEncoding {
        job_id: JobId,
        video_id: VideoId,
        resolution: Resolution,
        attempt: u32,
    },
    RenditionRetry {
        job_id: JobId,
        video_id: VideoId,
        resolution: Resolution,
        attempt: u32,
        error: String,
    },
    RenditionReady {
        job_id: JobId,
        video_id: VideoId,
        resolution: Resolution,
    },
    RenditionFailed {
        job_id: JobId,
        video_id: VideoId,
        resolution: Resolution,
        error: String,
    },
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A timestamped event ready for broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl Event {
    /// Create a new event with a fresh id and the current timestamp.
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: EventId::new(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Broadcast channel with a bounded ring buffer of recent events.
pub struct EventBus {
    tx: broadcast::Sender<Event>,
    recent: RwLock<VecDeque<Event>>,
}

impl EventBus {
    /// Create a new event bus.
    ///
    /// `capacity` controls the broadcast channel buffer size (not the ring
    /// buffer, which is always [`MAX_RECENT_EVENTS`]).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            recent: RwLock::new(VecDeque::with_capacity(MAX_RECENT_EVENTS)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Broadcast an event to all current subscribers and store it in the
    /// ring buffer.
    pub fn broadcast(&self, payload: EventPayload) {
        let event = Event::new(payload);

        {
            let mut recent = self.recent.write();
            if recent.len() >= MAX_RECENT_EVENTS {
                recent.pop_back();
            }
            recent.push_front(event.clone());
        }

        // No subscribers is fine.
        let _ = self.tx.send(event);
    }

    /// Return the `n` most recent events (newest first).
    pub fn recent_events(&self, n: usize) -> Vec<Event> {
        let recent = self.recent.read();
        recent.iter().take(n).cloned().collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_and_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let job_id = JobId::new();
        let video_id = VideoId::from(42);
        bus.broadcast(EventPayload::JobQueued { job_id, video_id });

        let event = rx.try_recv().unwrap();
        assert_eq!(event.payload, EventPayload::JobQueued { job_id, video_id });
    }

    #[test]
    fn recent_events_capped() {
        let bus = EventBus::new(256);
        for _ in 0..150 {
            bus.broadcast(EventPayload::DuplicateRejected {
                video_id: VideoId::from(1),
            });
        }
        assert_eq!(bus.recent_events(200).len(), MAX_RECENT_EVENTS);
    }

    #[test]
    fn recent_events_newest_first() {
        let bus = EventBus::new(16);
        for i in 0..5 {
            bus.broadcast(EventPayload::VideoRegistered {
                video_id: VideoId::from(i),
            });
        }
        let recent = bus.recent_events(2);
        assert_eq!(
            recent[0].payload,
            EventPayload::VideoRegistered {
                video_id: VideoId::from(4)
            }
        );
    }

    #[test]
    fn no_subscribers_does_not_panic() {
        let bus = EventBus::new(4);
        bus.broadcast(EventPayload::JobAbandoned {
            job_id: JobId::new(),
            video_id: VideoId::from(3),
        });
    }

    #[test]
    fn payload_is_tagged() {
        let payload = EventPayload::RenditionReady {
            job_id: JobId::new(),
            video_id: VideoId::from(42),
            resolution: Resolution::P720,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "rendition_ready");
        assert_eq!(json["resolution"], "720p");
        assert_eq!(json["video_id"], 42);
    }
}
