// SPDX-License-Identifier: GPL-3.0-only

//! Device registry
//!
//! Concurrent map of device ids to devices. Lookups take the read lock and
//! clone the device's `Arc` before the lock is dropped; only then may the
//! caller take the device mutex. The order is always
//! registry → reference → device lock, never the reverse.

use super::device::Device;
use super::events::CameraEvent;
use super::manager::Driver;
use super::types::{CameraPosition, CameraSpec, DeviceId};
use crate::errors::{CameraError, CameraResult};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use tracing::{debug, info};

/// Ids are process-wide so they are never reused, even across re-inits
static NEXT_DEVICE_ID: AtomicU32 = AtomicU32::new(1);

pub(crate) fn next_device_id() -> DeviceId {
    DeviceId(NEXT_DEVICE_ID.fetch_add(1, Ordering::Relaxed))
}

#[derive(Debug, Default)]
pub struct Registry {
    devices: RwLock<BTreeMap<DeviceId, Arc<Device>>>,
    count: AtomicUsize,
    shutting_down: AtomicBool,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered devices
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Refuse further insertions
    pub(crate) fn begin_shutdown(&self) {
        let _guard = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        self.shutting_down.store(true, Ordering::Release);
    }

    /// Insert a device; `false` if the registry is shutting down
    pub(crate) fn insert(&self, device: Arc<Device>) -> bool {
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        if self.shutting_down.load(Ordering::Acquire) {
            return false;
        }
        let previous = devices.insert(device.id(), device);
        debug_assert!(previous.is_none(), "device ids are never reused");
        self.count.fetch_add(1, Ordering::AcqRel);
        true
    }

    pub(crate) fn remove(&self, id: DeviceId) -> Option<Arc<Device>> {
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        let removed = devices.remove(&id);
        if removed.is_some() {
            self.count.fetch_sub(1, Ordering::AcqRel);
        }
        removed
    }

    /// Remove and return every device
    pub(crate) fn drain(&self) -> Vec<Arc<Device>> {
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        self.count.store(0, Ordering::Release);
        std::mem::take(&mut *devices).into_values().collect()
    }

    /// Take a reference to a registered device
    pub fn obtain(&self, id: DeviceId) -> CameraResult<Arc<Device>> {
        let devices = self.devices.read().unwrap_or_else(PoisonError::into_inner);
        devices
            .get(&id)
            .cloned()
            .ok_or(CameraError::InvalidDeviceId(id))
    }

    pub fn ids(&self) -> Vec<DeviceId> {
        let devices = self.devices.read().unwrap_or_else(PoisonError::into_inner);
        devices.keys().copied().collect()
    }

    pub fn devices(&self) -> Vec<Arc<Device>> {
        let devices = self.devices.read().unwrap_or_else(PoisonError::into_inner);
        devices.values().cloned().collect()
    }

    pub fn find(&self, predicate: impl Fn(&Device) -> bool) -> Option<Arc<Device>> {
        let devices = self.devices.read().unwrap_or_else(PoisonError::into_inner);
        devices.values().find(|d| predicate(d)).cloned()
    }
}

/// Backend-facing side of the registry
///
/// Passed to [`super::CameraBackend::detect_devices`]. Backends may keep a
/// clone to report hotplug from their own threads; once the subsystem quits
/// every call becomes a no-op.
#[derive(Clone)]
pub struct Registrar {
    driver: Weak<Driver>,
}

impl Registrar {
    pub(crate) fn new(driver: Weak<Driver>) -> Self {
        Self { driver }
    }

    /// Register newly detected hardware
    ///
    /// `specs` is sorted and deduplicated. Returns `None`, dropping `handle`,
    /// if the subsystem is shutting down.
    pub fn add_device(
        &self,
        name: impl Into<String>,
        position: CameraPosition,
        specs: Vec<CameraSpec>,
        handle: impl Any + Send + Sync,
    ) -> Option<Arc<Device>> {
        let driver = self.driver.upgrade()?;
        if driver.registry.is_shutting_down() {
            return None;
        }

        let device = Arc::new(Device::new(
            next_device_id(),
            name.into(),
            position,
            specs,
            Box::new(handle),
            Arc::clone(&driver.backend),
            Arc::clone(&driver.events),
        ));

        if !driver.registry.insert(Arc::clone(&device)) {
            return None;
        }

        info!(
            device = %device.name(),
            id = %device.id(),
            position = %device.position(),
            specs = device.specs().len(),
            "Camera added"
        );
        for spec in device.specs() {
            debug!(id = %device.id(), spec = %spec, "Supported format");
        }

        driver.events.push(CameraEvent::Added(device.id()));
        Some(device)
    }

    /// Report hardware that went away
    ///
    /// The device is marked disconnected and dropped from the registry. An
    /// application that still has it open keeps its reference and receives
    /// blank frames until it closes the camera.
    pub fn remove_device(&self, id: DeviceId) {
        let Some(driver) = self.driver.upgrade() else {
            return;
        };
        if let Some(device) = driver.registry.remove(id) {
            info!(device = %device.name(), id = %id, "Camera removed");
            device.mark_disconnected();
        }
    }

    /// First registered device matching `predicate`
    pub fn find_device(&self, predicate: impl Fn(&Device) -> bool) -> Option<Arc<Device>> {
        self.driver.upgrade()?.registry.find(predicate)
    }

    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.driver
            .upgrade()
            .map(|driver| driver.registry.devices())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for Registrar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registrar")
            .field("alive", &(self.driver.strong_count() > 0))
            .finish()
    }
}
