// SPDX-License-Identifier: GPL-3.0-only

//! Camera subsystem lifecycle
//!
//! The subsystem provides:
//! - Driver selection from the bootstrap list
//! - Device queries and opening
//! - Event delivery
//! - Orderly teardown of every device and the driver

use super::events::{CameraEvent, EventQueue, EventReceiver};
use super::handle::{self, Camera};
use super::registry::{Registrar, Registry};
use super::types::*;
use super::{BOOTSTRAP, CameraBackend};
use crate::config::CameraConfig;
use crate::errors::{CameraError, CameraResult};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// State of an initialized driver
pub(crate) struct Driver {
    pub backend: Arc<dyn CameraBackend>,
    pub registry: Registry,
    pub events: Arc<EventQueue>,
    pub config: CameraConfig,
}

/// Entry point to the camera subsystem
///
/// Thread-safe; share it behind an `Arc`. After [`CameraSubsystem::quit`]
/// (or drop) every call fails with [`CameraError::NotInitialized`].
pub struct CameraSubsystem {
    driver: RwLock<Option<Arc<Driver>>>,
}

impl CameraSubsystem {
    /// Start the subsystem with the driver chosen from `config`
    ///
    /// `config.driver` is a comma separated list of driver names tried in
    /// order. Without it every driver that isn't demand-only is tried.
    pub fn init(config: CameraConfig) -> CameraResult<Self> {
        let backend = select_driver(&config)?;
        Self::with_backend(backend, config)
    }

    /// Start the subsystem on an already initialized backend
    pub fn with_backend(backend: Arc<dyn CameraBackend>, config: CameraConfig) -> CameraResult<Self> {
        info!(driver = %backend.name(), "Initializing camera subsystem");

        let driver = Arc::new(Driver {
            backend: Arc::clone(&backend),
            registry: Registry::new(),
            events: Arc::new(EventQueue::new()),
            config,
        });

        backend.detect_devices(&Registrar::new(Arc::downgrade(&driver)));
        info!(
            driver = %backend.name(),
            devices = driver.registry.len(),
            "Camera subsystem ready"
        );

        Ok(Self {
            driver: RwLock::new(Some(driver)),
        })
    }

    fn driver(&self) -> CameraResult<Arc<Driver>> {
        self.driver
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(CameraError::NotInitialized)
    }

    /// Names of the drivers compiled into this build
    pub fn available_drivers() -> Vec<&'static str> {
        super::available_drivers()
    }

    pub fn driver_name(&self) -> CameraResult<String> {
        Ok(self.driver()?.backend.name().to_string())
    }

    pub fn driver_description(&self) -> CameraResult<String> {
        Ok(self.driver()?.backend.description().to_string())
    }

    pub fn config(&self) -> CameraResult<CameraConfig> {
        Ok(self.driver()?.config.clone())
    }

    // ===== Devices =====

    /// Ids of the connected cameras
    pub fn devices(&self) -> CameraResult<Vec<DeviceId>> {
        Ok(self.driver()?.registry.ids())
    }

    pub fn device_count(&self) -> CameraResult<usize> {
        Ok(self.driver()?.registry.len())
    }

    pub fn device_name(&self, id: DeviceId) -> CameraResult<String> {
        Ok(self.driver()?.registry.obtain(id)?.name().to_string())
    }

    pub fn device_position(&self, id: DeviceId) -> CameraResult<CameraPosition> {
        Ok(self.driver()?.registry.obtain(id)?.position())
    }

    /// Supported specs, best first
    pub fn supported_formats(&self, id: DeviceId) -> CameraResult<Vec<CameraSpec>> {
        Ok(self.driver()?.registry.obtain(id)?.specs().to_vec())
    }

    /// Open a camera, optionally asking for a particular spec
    ///
    /// Fields left out of `request` are taken from the closest spec the
    /// device supports. Frames flow once the user grants access; watch for
    /// [`CameraEvent::Approved`] or poll [`Camera::permission_state`].
    pub fn open_camera(&self, id: DeviceId, request: Option<SpecRequest>) -> CameraResult<Camera> {
        let driver = self.driver()?;
        let device = driver.registry.obtain(id)?;
        Camera::open(device, request, &driver.config)
    }

    /// Ask the driver to look for added or removed hardware
    pub fn detect_devices(&self) -> CameraResult<()> {
        let driver = self.driver()?;
        driver
            .backend
            .detect_devices(&Registrar::new(Arc::downgrade(&driver)));
        Ok(())
    }

    // ===== Events =====

    /// Deliver queued events
    ///
    /// Events go to every subscriber and are also returned. Call this from
    /// the application's main loop; handlers may freely close cameras.
    pub fn pump_events(&self) -> CameraResult<Vec<CameraEvent>> {
        let events = self.driver()?.events.pump();
        for event in &events {
            debug!(event = %event, "Camera event");
        }
        Ok(events)
    }

    /// Receive every event delivered by [`CameraSubsystem::pump_events`]
    pub fn subscribe(&self) -> CameraResult<EventReceiver> {
        Ok(self.driver()?.events.subscribe())
    }

    // ===== Shutdown =====

    /// Tear down every device and the driver
    ///
    /// Late hotplug additions are refused from the start of the call. Open
    /// cameras are closed; their handles stay valid but report
    /// [`CameraError::NotOpen`].
    pub fn quit(&self) {
        let Some(driver) = self
            .driver
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return;
        };

        info!(driver = %driver.backend.name(), "Shutting down camera subsystem");
        driver.registry.begin_shutdown();

        for device in driver.registry.drain() {
            handle::close_device(&device);
            device.release_handle();
        }

        driver.events.clear();
        driver.events.close_subscribers();
        driver.backend.deinitialize();
        debug!("Camera subsystem shut down");
    }
}

impl Drop for CameraSubsystem {
    fn drop(&mut self) {
        self.quit();
    }
}

impl std::fmt::Debug for CameraSubsystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let driver = self.driver.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("CameraSubsystem")
            .field("driver", &driver.as_ref().map(|d| d.backend.name().to_string()))
            .finish()
    }
}

/// Names from a comma separated hint, trimmed, empty entries dropped
pub(crate) fn parse_driver_hint(hint: &str) -> Vec<String> {
    hint.split(',')
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect()
}

fn select_driver(config: &CameraConfig) -> CameraResult<Arc<dyn CameraBackend>> {
    let hint = config
        .driver
        .as_deref()
        .map(parse_driver_hint)
        .filter(|names| !names.is_empty());

    let candidates: Vec<_> = match &hint {
        Some(names) => names
            .iter()
            .filter_map(|name| {
                let found = BOOTSTRAP.iter().find(|b| b.name.eq_ignore_ascii_case(name));
                if found.is_none() {
                    warn!(driver = %name, "Unknown camera driver requested");
                }
                found
            })
            .collect(),
        None => BOOTSTRAP.iter().filter(|b| !b.demand_only).collect(),
    };

    for bootstrap in candidates {
        match (bootstrap.init)(config) {
            Ok(backend) => {
                info!(driver = %bootstrap.name, description = %bootstrap.description, "Camera driver selected");
                return Ok(backend);
            }
            Err(e) => {
                debug!(driver = %bootstrap.name, error = %e, "Camera driver unavailable");
            }
        }
    }

    Err(CameraError::DriverNotAvailable(
        config
            .driver
            .clone()
            .unwrap_or_else(|| "no camera driver available".to_string()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_driver_hint() {
        assert_eq!(parse_driver_hint("V4L2, dummy"), vec!["v4l2", "dummy"]);
        assert_eq!(parse_driver_hint(" , pattern,,"), vec!["pattern"]);
        assert!(parse_driver_hint("").is_empty());
    }

    #[test]
    fn test_hint_selects_demand_only_driver() {
        let config = CameraConfig {
            driver: Some("pattern".to_string()),
            ..CameraConfig::default()
        };
        let subsystem = CameraSubsystem::init(config).unwrap();
        assert_eq!(subsystem.driver_name().unwrap(), "pattern");
        assert_eq!(subsystem.device_count().unwrap(), 1);
    }

    #[test]
    fn test_unknown_hint_fails() {
        let config = CameraConfig {
            driver: Some("nonexistent".to_string()),
            ..CameraConfig::default()
        };
        assert!(matches!(
            CameraSubsystem::init(config),
            Err(CameraError::DriverNotAvailable(_))
        ));
    }

    #[test]
    fn test_hint_falls_through_to_next_driver() {
        let config = CameraConfig {
            driver: Some("nonexistent,dummy".to_string()),
            ..CameraConfig::default()
        };
        let subsystem = CameraSubsystem::init(config).unwrap();
        assert_eq!(subsystem.driver_name().unwrap(), "dummy");
        assert_eq!(subsystem.device_count().unwrap(), 0);
    }

    #[test]
    fn test_calls_after_quit_fail() {
        let config = CameraConfig {
            driver: Some("dummy".to_string()),
            ..CameraConfig::default()
        };
        let subsystem = CameraSubsystem::init(config).unwrap();
        subsystem.quit();
        assert!(matches!(subsystem.devices(), Err(CameraError::NotInitialized)));
        assert!(matches!(subsystem.pump_events(), Err(CameraError::NotInitialized)));
        // Second quit is a no-op
        subsystem.quit();
    }
}
