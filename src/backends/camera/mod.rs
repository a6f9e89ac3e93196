// SPDX-License-Identifier: GPL-3.0-only

//! Camera backend abstraction
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │     Application     │
//! └──────────┬──────────┘
//!            │  Camera / CameraSubsystem
//!            ▼
//! ┌─────────────────────┐
//! │  Registry + Device  │  ← negotiation, buffer pool, capture thread
//! └──────────┬──────────┘
//!            │  CameraBackend trait
//!            ▼
//!   ┌──────┬─────────┬───────┐
//!   │ V4L2 │ Pattern │ Dummy │  ← concrete drivers
//!   └──────┴─────────┴───────┘
//! ```
//!
//! Backends only talk to hardware. Everything the application sees (format
//! negotiation, conversion, buffering, disconnect handling, events) lives in
//! this module and is shared by all of them.

pub mod buffer_pool;
pub mod device;
pub mod dummy;
pub mod events;
pub mod format_converters;
pub mod frame_loop;
pub mod handle;
pub mod manager;
pub mod negotiate;
pub mod pattern;
pub mod registry;
pub mod types;
#[cfg(target_os = "linux")]
pub mod v4l2;
pub mod zombie;

pub use buffer_pool::PoolStats;
pub use device::Device;
pub use events::{CameraEvent, EventReceiver};
pub use handle::Camera;
pub use manager::CameraSubsystem;
pub use registry::Registrar;
pub use types::*;

use crate::config::CameraConfig;
use std::sync::Arc;

/// Interface every camera driver implements
///
/// All methods may be called from any thread. `open_device`,
/// `close_device` and `wait_device` are never called with the device lock
/// held, so they may block and may call back into the device (for instance
/// [`Device::report_permission`]). `acquire_frame` and `release_frame` are
/// called with the lock held and must not block.
pub trait CameraBackend: Send + Sync {
    // ===== Metadata =====

    /// Short driver name, matched against driver hints
    fn name(&self) -> &str;

    /// Human readable driver description
    fn description(&self) -> &str;

    /// Whether the driver runs its own thread that calls
    /// [`Device::iterate`]; if so no capture thread is spawned
    fn provides_own_callback_thread(&self) -> bool {
        false
    }

    // ===== Enumeration =====

    /// Register every currently present device through `registrar`
    ///
    /// The registrar may be kept to report hotplug later.
    fn detect_devices(&self, registrar: &Registrar);

    // ===== Lifecycle =====

    /// Start streaming `spec`
    ///
    /// `spec` is always one of the device's advertised specs. If the user has
    /// to be asked for access, return immediately and report the answer
    /// through [`Device::report_permission`] later; otherwise report
    /// approval before returning.
    fn open_device(&self, device: &Arc<Device>, spec: &CameraSpec) -> BackendResult<()>;

    /// Start streaming on a device that advertises no specs
    ///
    /// Such a device is trusted to take anything: the backend settles the
    /// fields `request` leaves open and returns the spec it streams in. The
    /// default only accepts a complete request.
    fn open_unlisted_device(
        &self,
        device: &Arc<Device>,
        request: Option<&SpecRequest>,
    ) -> BackendResult<CameraSpec> {
        let spec = request.and_then(SpecRequest::to_spec).ok_or_else(|| {
            BackendError::FormatNotSupported(
                "device lists no formats and the request is incomplete".to_string(),
            )
        })?;
        self.open_device(device, &spec)?;
        Ok(spec)
    }

    /// Stop streaming; only called after a successful `open_device`
    fn close_device(&self, device: &Device);

    /// Free the handle attached at registration, called once when the
    /// device is destroyed
    fn free_device_handle(&self, _device: &Device) {}

    /// Shut the driver down after every device is gone
    fn deinitialize(&self) {}

    // ===== Capture =====

    /// Block until a frame may be ready
    ///
    /// Returning `false` marks the device disconnected. Implementations
    /// should come back within [`crate::constants::DEFAULT_WAIT_POLL_INTERVAL`]
    /// once [`Device::is_shutting_down`] is set.
    fn wait_device(&self, device: &Device) -> bool;

    /// Take the next frame without blocking
    fn acquire_frame(&self, device: &Device, frame: &mut AcquiredFrame) -> AcquireStatus;

    /// Give back data obtained from `acquire_frame`
    ///
    /// Only ever receives [`FrameData::Backend`] data.
    fn release_frame(&self, device: &Device, data: FrameData);
}

/// Entry in the list of drivers tried at init
#[derive(Clone, Copy)]
pub struct DriverBootstrap {
    pub name: &'static str,
    pub description: &'static str,
    /// Only used when explicitly named in the driver hint
    pub demand_only: bool,
    pub init: fn(&CameraConfig) -> BackendResult<Arc<dyn CameraBackend>>,
}

impl std::fmt::Debug for DriverBootstrap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverBootstrap")
            .field("name", &self.name)
            .field("demand_only", &self.demand_only)
            .finish()
    }
}

/// Drivers in order of preference
pub const BOOTSTRAP: &[DriverBootstrap] = &[
    #[cfg(target_os = "linux")]
    DriverBootstrap {
        name: v4l2::DRIVER_NAME,
        description: v4l2::DRIVER_DESCRIPTION,
        demand_only: false,
        init: v4l2::init,
    },
    DriverBootstrap {
        name: pattern::DRIVER_NAME,
        description: pattern::DRIVER_DESCRIPTION,
        demand_only: true,
        init: pattern::init,
    },
    DriverBootstrap {
        name: dummy::DRIVER_NAME,
        description: dummy::DRIVER_DESCRIPTION,
        demand_only: false,
        init: dummy::init,
    },
];

/// Names of the drivers compiled into this build
pub fn available_drivers() -> Vec<&'static str> {
    BOOTSTRAP.iter().map(|b| b.name).collect()
}
