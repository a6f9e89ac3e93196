// SPDX-License-Identifier: GPL-3.0-only

//! Application handle to an open camera

use super::buffer_pool::{BufferPool, PoolStats};
use super::device::{Device, DevicePhase, DeviceState};
use super::format_converters;
use super::frame_loop;
use super::negotiate;
use super::types::*;
use super::zombie::zombie_period;
use crate::config::CameraConfig;
use crate::errors::{CameraError, CameraResult};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// An open camera
///
/// Obtained from [`super::CameraSubsystem::open_camera`]. Frames are pulled
/// with [`Camera::acquire_frame`] and must be handed back with
/// [`Camera::release_frame`]. Dropping the handle closes the camera.
pub struct Camera {
    device: Arc<Device>,
}

impl Camera {
    pub(crate) fn open(
        device: Arc<Device>,
        request: Option<SpecRequest>,
        config: &CameraConfig,
    ) -> CameraResult<Self> {
        if let Some(request) = &request {
            validate_request(request)?;
        }

        let backend = Arc::clone(&device.backend);
        let negotiated = {
            let mut state = device.lock_state();
            if state.phase != DevicePhase::Closed {
                return Err(CameraError::AlreadyOpen(device.id()));
            }
            if device.is_disconnected() {
                return Err(CameraError::Disconnected);
            }

            // Nothing to negotiate against an empty list unless the request
            // is complete; the backend settles it during open instead
            let plan = match negotiate::choose(device.specs(), request.as_ref()) {
                Some(closest) => Some(OpenPlan::new(closest, request.as_ref(), config)?),
                None => None,
            };
            let negotiated = plan.as_ref().map(|plan| plan.closest);

            *state = DeviceState {
                phase: DevicePhase::Opening,
                requested: request,
                drop_frames: config.drop_initial_frames,
                session: state.session.wrapping_add(1),
                ..DeviceState::default()
            };
            if let Some(plan) = plan {
                plan.apply(&device, &mut state);
            }
            device.set_shutting_down(false);
            device.reset_permission();
            negotiated
        };

        // Backend may block here and may report permission from inside
        let opened = match negotiated {
            Some(closest) => backend.open_device(&device, &closest).map(|()| closest),
            None => backend.open_unlisted_device(&device, request.as_ref()),
        };
        let closest = match opened {
            Ok(spec) => spec,
            Err(e) => {
                warn!(device = %device.name(), id = %device.id(), error = %e, "Backend failed to open camera");
                abort_open(&device);
                return Err(e.into());
            }
        };

        let late_plan = if negotiated.is_some() {
            None
        } else {
            let requested = device.lock_state().requested;
            match OpenPlan::new(closest, requested.as_ref(), config) {
                Ok(plan) => Some(plan),
                Err(e) => {
                    backend.close_device(&device);
                    abort_open(&device);
                    return Err(e);
                }
            }
        };

        let camera = Self { device };
        let aborted = {
            let mut state = camera.device.lock_state();
            if let Some(plan) = late_plan {
                plan.apply(&camera.device, &mut state);
            }
            state.backend_opened = true;
            state.phase = DevicePhase::Streaming;

            // Subsystem quit while the backend was opening
            let aborted = camera.device.is_shutting_down();
            if !aborted && !backend.provides_own_callback_thread() {
                match frame_loop::spawn_capture_thread(&camera.device) {
                    Ok(controller) => state.capture = Some(controller),
                    Err(e) => {
                        drop(state);
                        camera.device.notify_phase_change();
                        camera.shutdown();
                        return Err(e);
                    }
                }
            }
            aborted
        };
        camera.device.notify_phase_change();

        if aborted {
            camera.shutdown();
            return Err(CameraError::NotInitialized);
        }
        Ok(camera)
    }

    pub fn id(&self) -> DeviceId {
        self.device.id()
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Spec frames are delivered in
    ///
    /// Only answered once the user approved access.
    pub fn format(&self) -> CameraResult<CameraSpec> {
        let state = self.device.lock_state();
        if state.phase != DevicePhase::Streaming {
            return Err(CameraError::NotOpen);
        }
        match self.device.permission_state() {
            PermissionState::Pending => Err(CameraError::PermissionPending),
            PermissionState::Denied => Err(CameraError::PermissionDenied),
            PermissionState::Approved => state.app_spec.ok_or(CameraError::NotOpen),
        }
    }

    /// Spec the hardware captures in
    pub fn native_format(&self) -> CameraResult<CameraSpec> {
        self.device.lock_state().closest.ok_or(CameraError::NotOpen)
    }

    pub fn permission_state(&self) -> PermissionState {
        self.device.permission_state()
    }

    pub fn is_disconnected(&self) -> bool {
        self.device.is_disconnected()
    }

    /// Frames thrown away because every buffer was in use
    pub fn dropped_frame_count(&self) -> u64 {
        self.device.lock_state().dropped_frame_count
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.device.lock_state().pool.stats()
    }

    /// Take the oldest captured frame, if any
    ///
    /// Never blocks. `Ok(None)` means no frame is ready yet (or access is
    /// still pending); poll again later.
    pub fn acquire_frame(&self) -> CameraResult<Option<CameraFrame>> {
        let mut state = self.device.lock_state();
        if state.phase != DevicePhase::Streaming {
            return Err(CameraError::NotOpen);
        }
        match self.device.permission_state() {
            PermissionState::Pending => return Ok(None),
            PermissionState::Denied => return Err(CameraError::PermissionDenied),
            PermissionState::Approved => {}
        }
        let Some(spec) = state.app_spec else {
            return Err(CameraError::NotOpen);
        };
        let Some(slot) = state.pool.take_filled() else {
            return Ok(None);
        };

        Ok(Some(CameraFrame {
            device: self.device.id(),
            slot: slot.index,
            session: state.session,
            width: spec.width,
            height: spec.height,
            format: spec.format,
            colorspace: spec.colorspace,
            stride: slot.stride,
            timestamp_ns: slot.timestamp_ns,
            data: slot.data,
        }))
    }

    /// Hand a frame back so its buffer can be reused
    ///
    /// Frames from another camera, or from before this camera was last
    /// reopened, are refused with [`CameraError::ForeignFrame`].
    pub fn release_frame(&self, frame: CameraFrame) -> CameraResult<()> {
        if frame.device != self.device.id() {
            return Err(CameraError::ForeignFrame);
        }

        let mut state = self.device.lock_state();
        if frame.session != state.session || !state.pool.is_held(frame.slot) {
            drop(state);
            // Its slot is gone, but the pixels may still belong to the backend
            self.device.frame_source().release(&self.device, frame.data);
            return Err(CameraError::ForeignFrame);
        }

        let (keep, give_back) = if state.is_zero_copy() {
            (FrameData::Empty, frame.data)
        } else {
            (frame.data, FrameData::Empty)
        };
        if let Err(data) = state.pool.release_held(frame.slot, keep) {
            drop(state);
            self.device.frame_source().release(&self.device, data);
            return Err(CameraError::ForeignFrame);
        }
        drop(state);

        self.device.frame_source().release(&self.device, give_back);
        Ok(())
    }

    /// Close the camera; same as dropping it
    pub fn close(self) {}

    fn shutdown(&self) {
        close_device(&self.device);
    }
}

impl std::fmt::Debug for Camera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Camera").field("device", &self.device).finish()
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Stop capture on `device` and return it to the closed state
///
/// Safe to call more than once and from more than one thread. The first
/// caller to find the device streaming owns the teardown; later callers
/// block until it is done, so the backend's `close_device` runs at most once
/// per successful open.
pub(crate) fn close_device(device: &Arc<Device>) {
    let controller = {
        let mut state = device.lock_state();
        loop {
            match state.phase {
                DevicePhase::Closed => return,
                DevicePhase::Streaming => break,
                DevicePhase::Opening | DevicePhase::Closing => {
                    // Makes a pending open back out once the backend returns
                    device.set_shutting_down(true);
                    state = device.wait_phase_change(state);
                }
            }
        }
        state.phase = DevicePhase::Closing;
        device.set_shutting_down(true);
        state.capture.take()
    };

    if let Some(mut controller) = controller {
        controller.join();
    }

    let (backend_opened, leftovers) = {
        let mut state = device.lock_state();
        let leftovers = state.pool.drain_filled();
        (std::mem::take(&mut state.backend_opened), leftovers)
    };

    let source = device.frame_source();
    for data in leftovers {
        source.release(device, data);
    }
    if backend_opened {
        device.backend.close_device(device);
    }
    device.reset_permission();

    {
        let mut state = device.lock_state();
        *state = fresh_state(&state);
    }
    device.notify_phase_change();
    debug!(device = %device.name(), id = %device.id(), "Camera closed");
}

/// Undo a failed open; the backend holds nothing for this session
fn abort_open(device: &Device) {
    {
        let mut state = device.lock_state();
        *state = fresh_state(&state);
    }
    device.reset_permission();
    device.notify_phase_change();
}

/// Everything decided at open before the device state is touched
struct OpenPlan {
    closest: CameraSpec,
    app_spec: CameraSpec,
    scaling: ScalingMode,
    needs_conversion: bool,
    pool: BufferPool,
}

impl OpenPlan {
    fn new(
        closest: CameraSpec,
        request: Option<&SpecRequest>,
        config: &CameraConfig,
    ) -> CameraResult<Self> {
        let app_spec = application_spec(&closest, request);
        let scaling = scaling_mode(&closest, &app_spec);
        let needs_conversion = app_spec.format != closest.format;

        if needs_conversion && !format_converters::can_convert(closest.format, app_spec.format) {
            return Err(CameraError::FormatNotSupported(format!(
                "no conversion from {} to {}",
                closest.format, app_spec.format
            )));
        }
        if scaling != ScalingMode::None
            && !(format_converters::can_scale(closest.format)
                && format_converters::can_scale(app_spec.format))
        {
            return Err(CameraError::FormatNotSupported(format!(
                "cannot scale {} frames",
                closest.format
            )));
        }

        // Zero-copy slots take the backend's buffers as they come
        let slot_len = if scaling == ScalingMode::None && !needs_conversion {
            None
        } else {
            Some(
                app_spec
                    .frame_len()
                    .ok_or_else(|| CameraError::FormatNotSupported(app_spec.format.to_string()))?,
            )
        };
        let pool = BufferPool::new(config.buffer_count, slot_len)?;

        Ok(Self {
            closest,
            app_spec,
            scaling,
            needs_conversion,
            pool,
        })
    }

    fn apply(self, device: &Device, state: &mut DeviceState) {
        info!(
            device = %device.name(),
            id = %device.id(),
            native = %self.closest,
            delivered = %self.app_spec,
            scaling = ?self.scaling,
            needs_conversion = self.needs_conversion,
            "Opening camera"
        );
        device.set_frame_period(zombie_period(&self.closest));
        state.closest = Some(self.closest);
        state.app_spec = Some(self.app_spec);
        state.scaling = self.scaling;
        state.needs_conversion = self.needs_conversion;
        state.pool = self.pool;
    }
}

/// Closed state that keeps what must survive a close
fn fresh_state(state: &DeviceState) -> DeviceState {
    DeviceState {
        session: state.session,
        ..DeviceState::default()
    }
}

fn validate_request(request: &SpecRequest) -> CameraResult<()> {
    if let Some(size) = request.size {
        if size.width == 0 || size.height == 0 {
            return Err(CameraError::InvalidArgument(format!(
                "requested size {}x{} is empty",
                size.width, size.height
            )));
        }
    }
    if request.framerate.is_some_and(|fps| fps.num == 0) {
        return Err(CameraError::InvalidArgument(
            "requested framerate is zero".to_string(),
        ));
    }
    Ok(())
}

/// Fill the fields the application left out from the negotiated spec
fn application_spec(closest: &CameraSpec, request: Option<&SpecRequest>) -> CameraSpec {
    let Some(request) = request else {
        return *closest;
    };
    let format = request.format.unwrap_or(closest.format);
    let colorspace = match request.colorspace {
        Some(colorspace) => colorspace,
        None if format == closest.format => closest.colorspace,
        None => format.default_colorspace(),
    };
    let size = request.size.unwrap_or_else(|| closest.resolution());
    CameraSpec {
        format,
        colorspace,
        width: size.width,
        height: size.height,
        framerate: request.framerate.or(closest.framerate),
    }
}

fn scaling_mode(native: &CameraSpec, delivered: &CameraSpec) -> ScalingMode {
    if native.width == delivered.width && native.height == delivered.height {
        ScalingMode::None
    } else if delivered.area() > native.area() {
        ScalingMode::Up
    } else {
        ScalingMode::Down
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_application_spec_fills_missing_fields() {
        let closest = CameraSpec::new(PixelFormat::Yuyv, 640, 480)
            .with_framerate(Framerate::from_int(30));
        let request = SpecRequest::new().format(PixelFormat::Rgba32);
        let app = application_spec(&closest, Some(&request));
        assert_eq!(app.format, PixelFormat::Rgba32);
        assert_eq!(app.colorspace, PixelFormat::Rgba32.default_colorspace());
        assert_eq!((app.width, app.height), (640, 480));
        assert_eq!(app.framerate, Some(Framerate::from_int(30)));

        assert_eq!(application_spec(&closest, None), closest);
    }

    #[test]
    fn test_scaling_mode() {
        let native = CameraSpec::new(PixelFormat::Nv12, 640, 480);
        let same = CameraSpec::new(PixelFormat::Rgb24, 640, 480);
        let small = CameraSpec::new(PixelFormat::Nv12, 320, 240);
        let big = CameraSpec::new(PixelFormat::Nv12, 1280, 960);
        assert_eq!(scaling_mode(&native, &same), ScalingMode::None);
        assert_eq!(scaling_mode(&native, &small), ScalingMode::Down);
        assert_eq!(scaling_mode(&native, &big), ScalingMode::Up);
    }

    #[test]
    fn test_validate_request() {
        assert!(validate_request(&SpecRequest::new()).is_ok());
        assert!(matches!(
            validate_request(&SpecRequest::new().size(0, 480)),
            Err(CameraError::InvalidArgument(_))
        ));
        assert!(matches!(
            validate_request(&SpecRequest::new().framerate(Framerate::new(0, 1))),
            Err(CameraError::InvalidArgument(_))
        ));
    }
}
