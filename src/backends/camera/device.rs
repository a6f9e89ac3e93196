// SPDX-License-Identifier: GPL-3.0-only

//! Camera device object
//!
//! A [`Device`] is shared through `Arc`: the registry holds one reference
//! while the device is plugged in, every open [`super::Camera`] holds one,
//! and so does a running capture thread. The device is destroyed (and its
//! backend handle freed) when the last reference goes away.
//!
//! Mutable per-device bookkeeping sits behind one mutex ([`DeviceState`]).
//! The flags that backends may flip from their own threads (shutdown,
//! disconnect, permission) are atomics outside that mutex, so reporting them
//! never needs the lock and can't deadlock against a thread holding it.

use super::CameraBackend;
use super::buffer_pool::BufferPool;
use super::events::{CameraEvent, EventQueue};
use super::frame_loop::{self, CaptureLoopController, Timebase};
use super::types::*;
use crate::constants;
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicI8, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

/// Lifecycle phase of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevicePhase {
    /// Not opened by the application
    #[default]
    Closed,
    /// Backend is acquiring native resources
    Opening,
    /// Capture loop is delivering frames
    Streaming,
    /// One closer owns the teardown; others wait for `Closed`
    Closing,
}

/// State guarded by the device mutex
#[derive(Debug, Default)]
pub(crate) struct DeviceState {
    pub phase: DevicePhase,
    /// What the application asked for at open
    pub requested: Option<SpecRequest>,
    /// Spec the hardware actually captures in
    pub closest: Option<CameraSpec>,
    /// Spec frames are delivered in
    pub app_spec: Option<CameraSpec>,
    pub scaling: ScalingMode,
    pub needs_conversion: bool,
    pub pool: BufferPool,
    /// Intermediate buffer for two-step conversions
    pub scratch: Vec<u8>,
    /// Frames still to discard after startup
    pub drop_frames: u32,
    pub dropped_frame_count: u64,
    pub timebase: Option<Timebase>,
    /// Bumped on every open so frames from an earlier session are rejected
    pub session: u64,
    pub capture: Option<CaptureLoopController>,
    /// Whether `open_device` succeeded and `close_device` is owed
    pub backend_opened: bool,
    /// Blank frame served while disconnected
    pub zombie_pixels: Option<Arc<[u8]>>,
}

impl DeviceState {
    /// Frames go straight from the backend to the application
    pub fn is_zero_copy(&self) -> bool {
        self.scaling == ScalingMode::None && !self.needs_conversion
    }
}

/// A camera known to the subsystem
pub struct Device {
    id: DeviceId,
    name: String,
    position: CameraPosition,
    specs: Vec<CameraSpec>,
    handle: Box<dyn Any + Send + Sync>,
    pub(crate) backend: Arc<dyn CameraBackend>,
    pub(crate) events: Arc<EventQueue>,
    shutdown: Arc<AtomicBool>,
    pub(crate) zombie: AtomicBool,
    permission: AtomicI8,
    frame_period_ns: AtomicU64,
    handle_released: AtomicBool,
    state: Mutex<DeviceState>,
    /// Signalled whenever `state.phase` settles after opening or closing
    phase_changed: Condvar,
}

impl Device {
    pub(crate) fn new(
        id: DeviceId,
        name: String,
        position: CameraPosition,
        mut specs: Vec<CameraSpec>,
        handle: Box<dyn Any + Send + Sync>,
        backend: Arc<dyn CameraBackend>,
        events: Arc<EventQueue>,
    ) -> Self {
        sort_and_dedup(&mut specs);
        Self {
            id,
            name,
            position,
            specs,
            handle,
            backend,
            events,
            shutdown: Arc::new(AtomicBool::new(false)),
            zombie: AtomicBool::new(false),
            permission: AtomicI8::new(0),
            frame_period_ns: AtomicU64::new(constants::DEFAULT_FRAME_PERIOD.as_nanos() as u64),
            handle_released: AtomicBool::new(false),
            state: Mutex::new(DeviceState::default()),
            phase_changed: Condvar::new(),
        }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn position(&self) -> CameraPosition {
        self.position
    }

    /// Supported specs in rank order, best first
    pub fn specs(&self) -> &[CameraSpec] {
        &self.specs
    }

    /// Backend specific handle attached when the device was added
    pub fn handle<T: Any>(&self) -> Option<&T> {
        self.handle.downcast_ref::<T>()
    }

    /// Name for the capture thread of this device
    pub fn thread_name(&self) -> String {
        format!("{}{}", constants::CAPTURE_THREAD_PREFIX, self.id)
    }

    /// Set when the device is being closed
    ///
    /// Backend wait implementations should return promptly once this is set.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub(crate) fn shutdown_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub(crate) fn set_shutting_down(&self, value: bool) {
        self.shutdown.store(value, Ordering::Release);
    }

    /// Spec the hardware was opened with, while open
    pub fn negotiated_spec(&self) -> Option<CameraSpec> {
        self.lock_state().closest
    }

    /// Duration of one frame at the negotiated rate
    pub fn frame_period(&self) -> Duration {
        Duration::from_nanos(self.frame_period_ns.load(Ordering::Relaxed))
    }

    pub(crate) fn set_frame_period(&self, period: Duration) {
        self.frame_period_ns
            .store(period.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn permission_state(&self) -> PermissionState {
        PermissionState::from_raw(self.permission.load(Ordering::Acquire))
    }

    /// Report the user's answer to the access prompt
    ///
    /// Callable from any thread, including from inside `open_device`. An
    /// event is queued only when the state actually changes. Denial ends
    /// capture, so it is final until the camera is reopened; later
    /// approvals are ignored.
    pub fn report_permission(&self, approved: bool) {
        let new = if approved {
            PermissionState::Approved
        } else {
            PermissionState::Denied
        };
        let swapped = self
            .permission
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                match PermissionState::from_raw(raw) {
                    old if old == new => None,
                    PermissionState::Denied => None,
                    _ => Some(new.as_raw()),
                }
            });
        if let Err(raw) = swapped {
            if PermissionState::from_raw(raw) != new {
                debug!(id = %self.id, "Ignoring approval after access was denied");
            }
            return;
        }

        info!(device = %self.name, id = %self.id, permission = %new, "Camera permission changed");
        self.events.push(if approved {
            CameraEvent::Approved(self.id)
        } else {
            CameraEvent::Denied(self.id)
        });
    }

    pub(crate) fn reset_permission(&self) {
        self.permission
            .store(PermissionState::Pending.as_raw(), Ordering::Release);
    }

    /// Run one capture iteration
    ///
    /// Backends that drive their own callback thread call this whenever a
    /// frame may be ready. Returns `false` once the device should stop
    /// producing frames (closing, or access denied).
    pub fn iterate(&self) -> bool {
        frame_loop::iterate(self)
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until another thread finishes opening or closing
    pub(crate) fn wait_phase_change<'a>(
        &self,
        state: MutexGuard<'a, DeviceState>,
    ) -> MutexGuard<'a, DeviceState> {
        self.phase_changed
            .wait(state)
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn notify_phase_change(&self) {
        self.phase_changed.notify_all();
    }

    /// Hand the backend handle back to the backend, once
    pub(crate) fn release_handle(&self) {
        if !self.handle_released.swap(true, Ordering::AcqRel) {
            debug!(device = %self.name, id = %self.id, "Freeing backend device handle");
            self.backend.free_device_handle(self);
        }
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("position", &self.position)
            .field("specs", &self.specs.len())
            .field("disconnected", &self.is_disconnected())
            .finish()
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.release_handle();
    }
}
