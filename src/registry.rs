//! ==============================================================================
//! registry.rs - latest known state per device
//! ==============================================================================
//!
//! purpose:
//!     holds one DeviceSnapshot per recognised device for the life of the
//!     process. fast-poll records are merged in as partial updates.
//!
//! coordinates:
//!     stored snapshots keep whatever position the device reported, even 0,0.
//!     only map placement substitutes the fallback coordinate, so the cards and
//!     the json api still show what the device actually sent.
//!
//! ==============================================================================

use crate::domain::{Coordinates, DeviceId, DeviceSnapshot, SnapshotPatch};

use chrono::{DateTime, Local};
use std::collections::BTreeMap;

/// Where devices without a gps fix are drawn.
pub const DEFAULT_FALLBACK: Coordinates = Coordinates::new(12.9238, 77.4988);

#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    devices: BTreeMap<DeviceId, DeviceSnapshot>,
}

impl DeviceRegistry {
    /// Every known device starts with a placeholder snapshot.
    pub fn new() -> Self {
        let devices = DeviceId::ALL
            .into_iter()
            .map(|id| (id, DeviceSnapshot::placeholder(id)))
            .collect();
        Self { devices }
    }

    pub fn merge(&mut self, patch: &SnapshotPatch, now: DateTime<Local>) -> DeviceSnapshot {
        let snapshot = self
            .devices
            .entry(patch.id)
            .or_insert_with(|| DeviceSnapshot::placeholder(patch.id));
        snapshot.apply(patch, now);
        snapshot.clone()
    }

    pub fn get(&self, id: DeviceId) -> Option<&DeviceSnapshot> {
        self.devices.get(&id)
    }

    /// Snapshots in device id order.
    pub fn snapshots(&self) -> impl Iterator<Item = &DeviceSnapshot> {
        self.devices.values()
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The position a marker should be drawn at.
pub fn placement(snapshot: &DeviceSnapshot, fallback: Coordinates) -> Coordinates {
    snapshot.reported_position().unwrap_or(fallback)
}
