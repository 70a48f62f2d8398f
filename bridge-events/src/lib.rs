//! Shared wire protocol types for the music-controller bridge.
//!
//! This crate defines the types that cross boundaries between:
//! - the bridge service - event consumer and re-publisher
//! - the remote music controller - event producer
//! - downstream SSE subscribers - local consumers of relayed frames
//!
//! # Modules
//! - [`now_playing`] - Now-playing state and playback types
//! - [`device`] - Output device roster types
//! - [`frame`] - Event-stream frames and wire payload shapes

pub mod device;
pub mod frame;
pub mod now_playing;

// Re-export commonly used types at crate root
pub use device::DeviceDescriptor;
pub use frame::{event_names, EventFrame, NowPayload, SnapshotPayload};
pub use now_playing::{NowPlayingState, PlaybackState};
