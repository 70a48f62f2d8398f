//! Event-stream frames and wire payload shapes.
//!
//! `EventFrame` is the unit the streaming parser produces and the hub fans
//! out. The payload shapes here document what the controller actually puts
//! on the wire for each known event name.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::device::DeviceDescriptor;

/// Known event names on the controller's stream.
pub mod event_names {
    /// Flat now-playing update
    pub const NOW: &str = "now";
    /// Full state snapshot (nested `now` object plus extras)
    pub const SNAPSHOT: &str = "snapshot";
    /// Complete output device roster
    pub const AIRPLAY_FULL: &str = "airplay_full";
    /// Master volume as a bare number, 0-100
    pub const MASTER_VOLUME: &str = "master_volume";
    /// Default name when the stream omits the `event:` field
    pub const MESSAGE: &str = "message";
}

/// One parsed frame from the event stream.
///
/// Transient: produced by the parser, consumed by the dispatcher and
/// re-published to subscribers, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventFrame {
    /// Event name (`now`, `snapshot`, ...); `message` when unnamed
    pub event_name: String,

    /// JSON-decoded payload
    pub payload: Value,
}

impl EventFrame {
    pub fn new(event_name: impl Into<String>, payload: Value) -> Self {
        Self {
            event_name: event_name.into(),
            payload,
        }
    }

    /// Whether the dispatcher has a state-mutation mapping for this frame.
    pub fn is_known(&self) -> bool {
        matches!(
            self.event_name.as_str(),
            event_names::NOW
                | event_names::SNAPSHOT
                | event_names::AIRPLAY_FULL
                | event_names::MASTER_VOLUME
        )
    }
}

/// Wire shape of a `now` event payload (all fields optional on the wire).
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct NowPayload {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub position: Option<f64>,
    #[serde(default)]
    pub volume: Option<f64>,
    /// Some controller revisions send this as `token`
    #[serde(default, alias = "token")]
    pub artwork_token: Option<String>,
}

/// Wire shape of a `snapshot` event payload.
///
/// The nested `now` object wins; a top-level `artwork_token` supplements it.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct SnapshotPayload {
    #[serde(default)]
    pub now: Option<NowPayload>,
    #[serde(default)]
    pub artwork_token: Option<String>,
    #[serde(default)]
    pub devices: Option<Vec<DeviceDescriptor>>,
}
