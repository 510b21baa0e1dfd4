//! Room lifecycle event types
//!
//! Defines all event types that can be broadcast through the event bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::signaling::RoomInfo;

/// Room lifecycle event enumeration
///
/// All events are tagged with their event name for serialization:
/// ```json
/// {
///   "event": "room.viewer_joined",
///   "data": { "room": "r1", "viewer": "5f0c...", "viewers": 2 }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum RoomEvent {
    /// A streamer negotiated and the room is live
    #[serde(rename = "room.opened")]
    RoomOpened {
        room: String,
        streamer: String,
        opened_at: DateTime<Utc>,
    },

    /// The room was torn down
    #[serde(rename = "room.closed")]
    RoomClosed {
        room: String,
        /// "stopped", "replaced", "streamer_disconnected" or "shutdown"
        reason: String,
    },

    #[serde(rename = "room.viewer_joined")]
    ViewerJoined {
        room: String,
        viewer: String,
        /// Viewer count after the join
        viewers: usize,
    },

    #[serde(rename = "room.viewer_left")]
    ViewerLeft {
        room: String,
        viewer: String,
        /// Viewer count after the departure
        viewers: usize,
    },

    /// A streamer or viewer request failed against the media server
    #[serde(rename = "room.negotiation_failed")]
    NegotiationFailed {
        room: String,
        connection: String,
        message: String,
    },

    /// Current rooms, sent to a monitoring client after its first subscribe
    #[serde(rename = "room.snapshot")]
    Snapshot { rooms: Vec<RoomInfo> },

    /// Event stream error (e.g. subscriber lagged)
    #[serde(rename = "error")]
    Error { message: String },
}

impl RoomEvent {
    /// Get the event name (for filtering)
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::RoomOpened { .. } => "room.opened",
            Self::RoomClosed { .. } => "room.closed",
            Self::ViewerJoined { .. } => "room.viewer_joined",
            Self::ViewerLeft { .. } => "room.viewer_left",
            Self::NegotiationFailed { .. } => "room.negotiation_failed",
            Self::Snapshot { .. } => "room.snapshot",
            Self::Error { .. } => "error",
        }
    }

    /// Check if event matches a topic pattern
    ///
    /// Supports wildcards: "room.*" matches all room events, "*" matches all.
    pub fn matches_topic(&self, topic: &str) -> bool {
        if topic == "*" {
            return true;
        }

        let event_name = self.event_name();

        if let Some(prefix) = topic.strip_suffix(".*") {
            event_name
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('.'))
        } else {
            event_name == topic
        }
    }
}
