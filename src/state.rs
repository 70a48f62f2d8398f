//! Shared live player state.
//!
//! The relay writes here through the [`StateSink`] interface; HTTP
//! handlers and any entity glue read snapshots. Now-playing is replaced
//! wholesale per event, with two additive exceptions: the master volume
//! channel and per-device volumes, which arrive on their own events and
//! survive a `now` update that omits them.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use bridge_events::{device, DeviceDescriptor, NowPlayingState};

use crate::relay::StateSink;

#[derive(Default)]
pub struct PlayerState {
    now_playing: RwLock<NowPlayingState>,
    devices: RwLock<Vec<DeviceDescriptor>>,
}

impl PlayerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn now_playing(&self) -> NowPlayingState {
        self.now_playing.read().await.clone()
    }

    pub async fn devices(&self) -> Vec<DeviceDescriptor> {
        self.devices.read().await.clone()
    }

    /// Names of the active outputs, recomputed on every call.
    pub async fn active_devices(&self) -> Vec<String> {
        device::active_names(&self.devices.read().await)
    }
}

#[async_trait]
impl StateSink for PlayerState {
    async fn apply_now_playing(&self, mut state: NowPlayingState) {
        let mut current = self.now_playing.write().await;
        if state.volume.is_none() {
            // volume rides its own event; a now update without one keeps it
            state.volume = current.volume;
        }
        *current = state;
    }

    async fn apply_devices(&self, devices: Vec<DeviceDescriptor>) {
        let mut current = self.devices.write().await;
        let known_volumes: HashMap<String, u8> = current
            .iter()
            .filter_map(|d| d.volume.map(|v| (d.name.clone(), v)))
            .collect();
        *current = devices
            .into_iter()
            .map(|mut d| {
                if d.volume.is_none() {
                    d.volume = known_volumes.get(&d.name).copied();
                }
                d
            })
            .collect();
    }

    async fn apply_master_volume(&self, volume: u8) {
        self.now_playing.write().await.volume = Some(volume.min(100));
    }

    async fn apply_device_volumes(&self, volumes: HashMap<String, u8>) {
        let mut current = self.devices.write().await;
        for device in current.iter_mut() {
            if let Some(level) = volumes.get(&device.name) {
                device.volume = Some((*level).min(100));
            }
        }
    }
}
