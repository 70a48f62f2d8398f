//! State sink abstraction.
//!
//! The relay mutates local state only through this narrow interface,
//! bound once at construction. It never holds a reference to a concrete
//! player/entity object, and tests can substitute a recorder.

use std::collections::HashMap;

use async_trait::async_trait;

use bridge_events::{DeviceDescriptor, NowPlayingState};

#[async_trait]
pub trait StateSink: Send + Sync {
    /// Replace the now-playing state wholesale.
    async fn apply_now_playing(&self, state: NowPlayingState);

    /// Replace the device roster.
    async fn apply_devices(&self, devices: Vec<DeviceDescriptor>);

    /// Update the master volume only (additive; other fields untouched).
    async fn apply_master_volume(&self, volume: u8);

    /// Merge per-device volumes into the roster (additive).
    async fn apply_device_volumes(&self, volumes: HashMap<String, u8>);
}
