// SPDX-License-Identifier: GPL-3.0-only

//! Disconnected ("zombie") devices
//!
//! When a device fails or is unplugged it doesn't vanish from under the
//! application. Its frame source switches from the backend to a synthetic
//! one that paces itself at the negotiated frame rate and serves a blank
//! frame in the negotiated format, until the application closes it.

use super::CameraBackend;
use super::device::{Device, DeviceState};
use super::events::CameraEvent;
use super::frame_loop::monotonic_ns;
use super::types::{AcquireStatus, AcquiredFrame, CameraSpec, FrameData, PixelFormat};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{debug, warn};

/// Where a device's frames come from
pub(crate) enum FrameSource<'a> {
    Live(&'a dyn CameraBackend),
    Zombie,
}

impl FrameSource<'_> {
    /// Block until a frame may be ready; `false` means the device failed
    pub fn wait(&self, device: &Device) -> bool {
        match self {
            FrameSource::Live(backend) => backend.wait_device(device),
            FrameSource::Zombie => {
                if !device.is_shutting_down() {
                    std::thread::sleep(device.frame_period());
                }
                true
            }
        }
    }

    /// Non-blocking acquire, called with the device lock held
    pub fn acquire(
        &self,
        device: &Device,
        state: &mut DeviceState,
        frame: &mut AcquiredFrame,
    ) -> AcquireStatus {
        match self {
            FrameSource::Live(backend) => backend.acquire_frame(device, frame),
            FrameSource::Zombie => acquire_blank(state, frame),
        }
    }

    /// Return frame data to whoever owns it
    ///
    /// Frames acquired before the disconnect still belong to the backend
    /// and are forwarded to it.
    pub fn release(&self, device: &Device, data: FrameData) {
        match data {
            FrameData::Empty | FrameData::Owned(_) | FrameData::Zombie(_) => {}
            backend_data => device.backend.release_frame(device, backend_data),
        }
    }
}

impl Device {
    /// Whether the device has failed or been unplugged
    pub fn is_disconnected(&self) -> bool {
        self.zombie.load(Ordering::Acquire)
    }

    /// Mark the device as lost
    ///
    /// Callable from any thread, any number of times. The first call
    /// switches the device to synthetic frames and queues one
    /// [`CameraEvent::Removed`]; later calls do nothing.
    pub fn mark_disconnected(&self) {
        if self
            .zombie
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        warn!(device = %self.name(), id = %self.id(), "Camera disconnected, serving blank frames");
        self.events.push(CameraEvent::Removed(self.id()));
    }

    pub(crate) fn frame_source(&self) -> FrameSource<'_> {
        if self.is_disconnected() {
            FrameSource::Zombie
        } else {
            FrameSource::Live(self.backend.as_ref())
        }
    }
}

fn acquire_blank(state: &mut DeviceState, frame: &mut AcquiredFrame) -> AcquireStatus {
    let Some(spec) = state.closest else {
        return AcquireStatus::Skip;
    };

    let pixels = match &state.zombie_pixels {
        Some(pixels) => Arc::clone(pixels),
        None => match blank_frame(&spec) {
            Some(pixels) => {
                debug!(spec = %spec, bytes = pixels.len(), "Allocated blank frame");
                state.zombie_pixels = Some(Arc::clone(&pixels));
                pixels
            }
            None => return AcquireStatus::Skip,
        },
    };

    frame.data = FrameData::Zombie(pixels);
    frame.stride = spec.default_stride();
    frame.timestamp_ns = monotonic_ns();
    AcquireStatus::Ready
}

/// Black frame in `spec`'s layout
///
/// YUV formats get neutral chroma (128) so the frame is black rather than
/// green. Returns `None` for compressed formats or if allocation fails.
pub fn blank_frame(spec: &CameraSpec) -> Option<Arc<[u8]>> {
    let len = spec.frame_len()?;
    let mut pixels = Vec::new();
    pixels.try_reserve_exact(len).ok()?;

    match spec.format {
        PixelFormat::Nv12 | PixelFormat::Nv21 | PixelFormat::I420 | PixelFormat::Yv12 => {
            let luma = spec.width as usize * spec.height as usize;
            pixels.resize(luma, 0);
            pixels.resize(len, 128);
        }
        PixelFormat::Yuyv | PixelFormat::Yvyu => {
            pixels.extend([0u8, 128].iter().cycle().take(len));
        }
        PixelFormat::Uyvy => {
            pixels.extend([128u8, 0].iter().cycle().take(len));
        }
        _ => pixels.resize(len, 0),
    }

    Some(Arc::from(pixels))
}

/// Frame period to pace blank frames at
pub(crate) fn zombie_period(spec: &CameraSpec) -> Duration {
    spec.framerate
        .and_then(|fps| fps.frame_period())
        .unwrap_or(crate::constants::DEFAULT_FRAME_PERIOD)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::Framerate;

    #[test]
    fn test_blank_nv12_has_neutral_chroma() {
        let spec = CameraSpec::new(PixelFormat::Nv12, 4, 2);
        let frame = blank_frame(&spec).unwrap();
        assert_eq!(frame.len(), 12);
        assert!(frame[..8].iter().all(|&b| b == 0));
        assert!(frame[8..].iter().all(|&b| b == 128));
    }

    #[test]
    fn test_blank_packed_yuv() {
        let yuyv = blank_frame(&CameraSpec::new(PixelFormat::Yuyv, 2, 1)).unwrap();
        assert_eq!(&yuyv[..], &[0, 128, 0, 128]);
        let uyvy = blank_frame(&CameraSpec::new(PixelFormat::Uyvy, 2, 1)).unwrap();
        assert_eq!(&uyvy[..], &[128, 0, 128, 0]);
    }

    #[test]
    fn test_blank_rgb_is_zero() {
        let frame = blank_frame(&CameraSpec::new(PixelFormat::Rgba32, 3, 3)).unwrap();
        assert_eq!(frame.len(), 36);
        assert!(frame.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_blank_frame_sizes_match_format() {
        for format in PixelFormat::ALL {
            let spec = CameraSpec::new(format, 33, 17);
            match blank_frame(&spec) {
                Some(frame) => assert_eq!(Some(frame.len()), spec.frame_len()),
                None => assert!(format.is_compressed()),
            }
        }
    }

    #[test]
    fn test_acquire_blank_reuses_buffer() {
        let mut state = DeviceState {
            closest: Some(CameraSpec::new(PixelFormat::I420, 8, 8)),
            ..DeviceState::default()
        };
        let mut first = AcquiredFrame::default();
        let mut second = AcquiredFrame::default();
        assert_eq!(acquire_blank(&mut state, &mut first), AcquireStatus::Ready);
        assert_eq!(acquire_blank(&mut state, &mut second), AcquireStatus::Ready);
        match (&first.data, &second.data) {
            (FrameData::Zombie(a), FrameData::Zombie(b)) => assert!(Arc::ptr_eq(a, b)),
            other => panic!("unexpected frame data {:?}", other),
        }
    }

    #[test]
    fn test_zombie_period_defaults() {
        let spec = CameraSpec::new(PixelFormat::Yuyv, 2, 2);
        assert_eq!(zombie_period(&spec), crate::constants::DEFAULT_FRAME_PERIOD);
        let fast = spec.with_framerate(Framerate::from_int(100));
        assert_eq!(zombie_period(&fast), Duration::from_millis(10));
    }
}
