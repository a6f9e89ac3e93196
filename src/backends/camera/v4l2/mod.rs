// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 camera backend
//!
//! Talks to `/dev/video*` nodes through the `v4l` crate. Frames are
//! dequeued from a memory mapped stream during the wait phase and copied
//! into recycled buffers, so the kernel buffer is requeued immediately and
//! `acquire_frame` never blocks.

mod enumeration;

pub use enumeration::{NodeInfo, inspect_node, scan_nodes};

use super::registry::Registrar;
use super::types::*;
use super::{CameraBackend, Device};
use crate::config::CameraConfig;
use crate::constants::v4l2::STREAM_BUFFERS;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::video::capture::Parameters;
use v4l::{Device as V4lDevice, Format, FourCC};

pub const DRIVER_NAME: &str = "v4l2";
pub const DRIVER_DESCRIPTION: &str = "Video4Linux2";

/// Recycled buffers kept per device
const MAX_RECYCLED: usize = 4;

pub fn init(config: &CameraConfig) -> BackendResult<Arc<dyn CameraBackend>> {
    if !Path::new("/dev").is_dir() {
        return Err(BackendError::NotAvailable("/dev is missing".to_string()));
    }
    Ok(Arc::new(V4l2Backend::new(config.wait_poll_interval())))
}

/// Per-device handle attached at registration
struct V4l2Handle {
    path: PathBuf,
    driver: String,
    stream: Mutex<Option<V4l2Stream>>,
    frames: Mutex<FrameQueue>,
}

struct V4l2Stream {
    stream: Stream<'static>,
    stride: u32,
}

#[derive(Default)]
struct FrameQueue {
    /// Newest dequeued frame, waiting for `acquire_frame`
    pending: Option<(BackendBuffer, u64)>,
    recycled: Vec<Vec<u8>>,
    stride: u32,
}

impl std::fmt::Debug for V4l2Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("V4l2Handle")
            .field("path", &self.path)
            .field("driver", &self.driver)
            .finish()
    }
}

/// V4L2 backend implementation
pub struct V4l2Backend {
    poll_interval: Duration,
    next_token: AtomicU64,
}

impl V4l2Backend {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            next_token: AtomicU64::new(1),
        }
    }

    fn handle<'a>(&self, device: &'a Device) -> Option<&'a V4l2Handle> {
        device.handle::<V4l2Handle>()
    }

    fn start_stream(&self, path: &Path, spec: &CameraSpec) -> BackendResult<V4l2Stream> {
        let dev = V4lDevice::with_path(path)?;

        let fourcc = FourCC::new(&spec.format.fourcc());
        let requested = Format::new(spec.width, spec.height, fourcc);
        let actual = dev.set_format(&requested)?;
        if actual.fourcc != fourcc || actual.width != spec.width || actual.height != spec.height {
            return Err(BackendError::FormatNotSupported(format!(
                "driver picked {}x{} {} instead of {}",
                actual.width, actual.height, actual.fourcc, spec
            )));
        }

        if let Some(fps) = spec.framerate {
            let rounded = fps.as_f64().round().max(1.0) as u32;
            if let Err(e) = dev.set_params(&Parameters::with_fps(rounded)) {
                // Not fatal: the device keeps its default rate
                warn!(path = %path.display(), fps = rounded, error = %e, "Failed to set frame rate");
            }
        }

        let mut stream = Stream::with_buffers(&dev, Type::VideoCapture, STREAM_BUFFERS)?;
        stream.set_timeout(self.poll_interval);

        info!(
            path = %path.display(),
            width = actual.width,
            height = actual.height,
            fourcc = %actual.fourcc,
            stride = actual.stride,
            "V4L2 stream configured"
        );

        Ok(V4l2Stream {
            stream,
            stride: actual.stride,
        })
    }
}

impl CameraBackend for V4l2Backend {
    fn name(&self) -> &str {
        DRIVER_NAME
    }

    fn description(&self) -> &str {
        DRIVER_DESCRIPTION
    }

    fn detect_devices(&self, registrar: &Registrar) {
        let nodes = scan_nodes();

        // Registered nodes that disappeared
        for device in registrar.devices() {
            let Some(handle) = self.handle(&device) else {
                continue;
            };
            if !nodes.contains(&handle.path) {
                registrar.remove_device(device.id());
            }
        }

        for path in nodes {
            let known = registrar
                .find_device(|d| d.handle::<V4l2Handle>().is_some_and(|h| h.path == path))
                .is_some();
            if known {
                continue;
            }
            let Some(node) = inspect_node(&path) else {
                continue;
            };

            debug!(path = %path.display(), driver = %node.driver, "Found V4L2 camera");
            let handle = V4l2Handle {
                path: node.path,
                driver: node.driver,
                stream: Mutex::new(None),
                frames: Mutex::new(FrameQueue::default()),
            };
            registrar.add_device(node.card, CameraPosition::Unknown, node.specs, handle);
        }
    }

    fn open_device(&self, device: &Arc<Device>, spec: &CameraSpec) -> BackendResult<()> {
        let handle = self
            .handle(device)
            .ok_or_else(|| BackendError::DeviceNotFound(device.name().to_string()))?;

        let stream = self.start_stream(&handle.path, spec)?;
        {
            let mut frames = handle.frames.lock().unwrap_or_else(PoisonError::into_inner);
            *frames = FrameQueue {
                stride: stream.stride,
                ..FrameQueue::default()
            };
        }
        *handle.stream.lock().unwrap_or_else(PoisonError::into_inner) = Some(stream);

        // Device node permissions were already checked by the open
        device.report_permission(true);
        Ok(())
    }

    fn close_device(&self, device: &Device) {
        let Some(handle) = self.handle(device) else {
            return;
        };
        // Dropping the stream turns streaming off and unmaps the buffers
        let stream = handle
            .stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(stream);
        *handle.frames.lock().unwrap_or_else(PoisonError::into_inner) = FrameQueue::default();
        debug!(path = %handle.path.display(), "V4L2 stream closed");
    }

    fn wait_device(&self, device: &Device) -> bool {
        let Some(handle) = self.handle(device) else {
            return false;
        };
        if device.is_shutting_down() {
            return true;
        }

        let mut guard = handle.stream.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(active) = guard.as_mut() else {
            // Not streaming (yet); avoid spinning
            drop(guard);
            std::thread::sleep(self.poll_interval);
            return true;
        };

        let (bytes, timestamp_ns) = match active.stream.next() {
            Ok((buf, meta)) => {
                let used = (meta.bytesused as usize).min(buf.len());
                let used = if used == 0 { buf.len() } else { used };
                let timestamp_ns = (meta.timestamp.sec as u64)
                    .saturating_mul(1_000_000_000)
                    .saturating_add((meta.timestamp.usec as u64).saturating_mul(1_000));

                let mut frames = handle.frames.lock().unwrap_or_else(PoisonError::into_inner);
                let mut bytes = match frames.pending.take() {
                    Some((previous, _)) => previous.bytes,
                    None => frames.recycled.pop().unwrap_or_default(),
                };
                drop(frames);

                bytes.clear();
                bytes.extend_from_slice(&buf[..used]);
                (bytes, timestamp_ns)
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut || e.kind() == io::ErrorKind::Interrupted => {
                return true;
            }
            Err(e) => {
                warn!(path = %handle.path.display(), error = %e, "V4L2 dequeue failed");
                return false;
            }
        };
        drop(guard);

        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let mut frames = handle.frames.lock().unwrap_or_else(PoisonError::into_inner);
        frames.pending = Some((BackendBuffer { bytes, token }, timestamp_ns));
        true
    }

    fn acquire_frame(&self, device: &Device, frame: &mut AcquiredFrame) -> AcquireStatus {
        let Some(handle) = self.handle(device) else {
            return AcquireStatus::Error;
        };
        let mut frames = handle.frames.lock().unwrap_or_else(PoisonError::into_inner);
        let Some((buffer, timestamp_ns)) = frames.pending.take() else {
            return AcquireStatus::Skip;
        };
        frame.stride = frames.stride;
        frame.timestamp_ns = timestamp_ns;
        frame.data = FrameData::Backend(buffer);
        AcquireStatus::Ready
    }

    fn release_frame(&self, device: &Device, data: FrameData) {
        let (Some(handle), FrameData::Backend(buffer)) = (self.handle(device), data) else {
            return;
        };
        let mut frames = handle.frames.lock().unwrap_or_else(PoisonError::into_inner);
        if frames.recycled.len() < MAX_RECYCLED {
            frames.recycled.push(buffer.bytes);
        }
    }
}
