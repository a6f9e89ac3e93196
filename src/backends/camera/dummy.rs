// SPDX-License-Identifier: GPL-3.0-only

//! Fallback driver with no cameras
//!
//! Always initializes, so an application can start the subsystem on systems
//! without camera support and simply see an empty device list.

use super::registry::Registrar;
use super::types::*;
use super::{CameraBackend, Device};
use crate::config::CameraConfig;
use std::sync::Arc;

pub const DRIVER_NAME: &str = "dummy";
pub const DRIVER_DESCRIPTION: &str = "No camera support";

pub fn init(_config: &CameraConfig) -> BackendResult<Arc<dyn CameraBackend>> {
    Ok(Arc::new(DummyBackend))
}

#[derive(Debug, Default)]
pub struct DummyBackend;

impl CameraBackend for DummyBackend {
    fn name(&self) -> &str {
        DRIVER_NAME
    }

    fn description(&self) -> &str {
        DRIVER_DESCRIPTION
    }

    fn detect_devices(&self, _registrar: &Registrar) {}

    fn open_device(&self, _device: &Arc<Device>, _spec: &CameraSpec) -> BackendResult<()> {
        Err(BackendError::NotAvailable(
            "the dummy driver has no cameras".to_string(),
        ))
    }

    fn close_device(&self, _device: &Device) {}

    fn wait_device(&self, _device: &Device) -> bool {
        false
    }

    fn acquire_frame(&self, _device: &Device, _frame: &mut AcquiredFrame) -> AcquireStatus {
        AcquireStatus::Error
    }

    fn release_frame(&self, _device: &Device, _data: FrameData) {}
}
