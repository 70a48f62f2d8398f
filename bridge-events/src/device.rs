//! Output device roster types.

use serde::{Deserialize, Serialize};

/// One output device as reported by the controller's `airplay_full` event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceDescriptor {
    /// Device name (also the device's identity on the wire)
    pub name: String,

    /// Whether the device is currently selected for output
    #[serde(default)]
    pub active: bool,

    /// Device volume, 0-100, when the controller reports one
    #[serde(default)]
    pub volume: Option<u8>,
}

impl DeviceDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            active: false,
            volume: None,
        }
    }
}

/// Names of the currently active devices, derived on every call.
pub fn active_names(roster: &[DeviceDescriptor]) -> Vec<String> {
    roster
        .iter()
        .filter(|d| d.active)
        .map(|d| d.name.clone())
        .collect()
}
