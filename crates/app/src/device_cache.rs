//! Device cache — the shared, read-mostly device snapshot.
//!
//! The host refreshes it with [`DeviceCache::update_devices`] or
//! [`DeviceCache::upsert`]; engine components read it through the
//! [`DeviceRegistry`] port.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use homeflow_domain::device::{Device, DeviceValue};
use homeflow_domain::id::DeviceId;

use crate::ports::DeviceRegistry;

/// In-memory [`DeviceRegistry`].
#[derive(Debug, Default)]
pub struct DeviceCache {
    devices: RwLock<HashMap<DeviceId, Device>>,
}

impl DeviceCache {
    #[must_use]
    pub fn new(devices: impl IntoIterator<Item = Device>) -> Self {
        let cache = Self::default();
        cache.update_devices(devices);
        cache
    }

    /// Replace the whole snapshot.
    pub fn update_devices(&self, devices: impl IntoIterator<Item = Device>) {
        let fresh: HashMap<DeviceId, Device> =
            devices.into_iter().map(|d| (d.id.clone(), d)).collect();
        let mut guard = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        *guard = fresh;
    }

    /// Insert or replace one device.
    pub fn upsert(&self, device: Device) {
        self.devices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(device.id.clone(), device);
    }

    /// Record a new value reported for a known device.
    ///
    /// Returns the updated snapshot, or `None` if the device is unknown.
    pub fn set_value(&self, id: &DeviceId, value: DeviceValue) -> Option<Device> {
        let mut guard = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        let device = guard.get_mut(id)?;
        device.value = value;
        device.updated_at = homeflow_domain::time::now();
        Some(device.clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DeviceRegistry for DeviceCache {
    fn get(&self, id: &DeviceId) -> Option<Device> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    fn all(&self) -> Vec<Device> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}
