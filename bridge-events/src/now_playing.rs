//! Now-playing state shared across the bridge.
//!
//! `NowPlayingState` is the local mirror of the controller's transport
//! state. It is overwritten wholesale on each `now`/`snapshot` event and
//! read by the HTTP surface and any entity glue built on top.

use serde::{Deserialize, Serialize};

/// Playback state enumeration
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Playing,
    Paused,
    Stopped,
    /// Unknown/unavailable state
    #[default]
    Unknown,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Playing => write!(f, "playing"),
            Self::Paused => write!(f, "paused"),
            Self::Stopped => write!(f, "stopped"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

impl From<&str> for PlaybackState {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "playing" | "play" => Self::Playing,
            "paused" | "pause" => Self::Paused,
            "stopped" | "stop" | "idle" => Self::Stopped,
            _ => Self::Unknown,
        }
    }
}

/// The bridge's view of what the controller is currently playing.
///
/// Every field except `volume` and the device roster is replaced as a unit
/// when a `now` or `snapshot` event arrives; `volume` is additionally
/// updated by `master_volume` events.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NowPlayingState {
    /// Track title
    pub title: Option<String>,

    /// Track artist
    pub artist: Option<String>,

    /// Album name
    pub album: Option<String>,

    /// Track length in seconds
    pub duration: Option<f64>,

    /// Playback position in seconds
    pub position: Option<f64>,

    /// When `position` was observed (milliseconds since epoch)
    pub position_observed_at: Option<u64>,

    /// Master volume, 0-100
    pub volume: Option<u8>,

    /// Current playback state
    pub state: PlaybackState,

    /// Opaque artwork token supplied by the controller, if any
    pub artwork_token: Option<String>,

    /// Cheap artwork-change fingerprint derived from track metadata
    pub artwork_etag: Option<String>,
}

impl NowPlayingState {
    /// True when no track metadata has been observed yet.
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.artist.is_none() && self.album.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playback_state_from_wire_strings() {
        assert_eq!(PlaybackState::from("playing"), PlaybackState::Playing);
        assert_eq!(PlaybackState::from("play"), PlaybackState::Playing);
        assert_eq!(PlaybackState::from("PAUSED"), PlaybackState::Paused);
        assert_eq!(PlaybackState::from("stop"), PlaybackState::Stopped);
        assert_eq!(PlaybackState::from("weird"), PlaybackState::Unknown);
    }

    #[test]
    fn now_playing_round_trips() {
        let state = NowPlayingState {
            title: Some("Come Together".into()),
            artist: Some("The Beatles".into()),
            album: Some("Abbey Road".into()),
            duration: Some(259.0),
            position: Some(42.5),
            position_observed_at: Some(1_700_000_000_000),
            volume: Some(55),
            state: PlaybackState::Playing,
            artwork_token: Some("tok-1".into()),
            artwork_etag: None,
        };

        let json = serde_json::to_string(&state).unwrap();
        let back: NowPlayingState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
        assert!(!back.is_empty());
        assert!(NowPlayingState::default().is_empty());
    }
}
