// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic test-pattern driver
//!
//! Registers a configurable number of virtual cameras that render scrolling
//! colour bars. Only used when asked for by name. The driver runs its own
//! frame thread per open camera and stamps frames with a private clock
//! unrelated to the process monotonic clock.

use super::registry::Registrar;
use super::types::*;
use super::{CameraBackend, Device};
use crate::config::CameraConfig;
use crate::constants::pattern::{
    DEFAULT_DEVICE_COUNT, FRAMERATES, IDLE_PERIOD, MAX_DEVICE_COUNT, RESOLUTIONS,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const DRIVER_NAME: &str = "pattern";
pub const DRIVER_DESCRIPTION: &str = "Synthetic colour bar cameras";

/// Formats every pattern camera offers
pub const FORMATS: [PixelFormat; 3] = [PixelFormat::Yuyv, PixelFormat::Nv12, PixelFormat::Rgba32];

/// Offset of the private clock, far from anything `monotonic_ns` returns
const CLOCK_OFFSET_NS: u64 = 1_000_000_000_000;

pub fn init(config: &CameraConfig) -> BackendResult<Arc<dyn CameraBackend>> {
    Ok(Arc::new(PatternBackend::new(config.pattern_devices)))
}

/// Per-device handle attached at registration
#[derive(Debug, Default)]
struct PatternHandle {
    index: u32,
    shared: Arc<Mutex<PatternShared>>,
    stream: Mutex<Option<PatternStream>>,
}

#[derive(Debug, Default)]
struct PatternShared {
    spec: Option<CameraSpec>,
    /// Rendered frame waiting for `acquire_frame`
    pending: Option<BackendBuffer>,
    /// Private clock reading taken when `pending` was rendered
    pending_timestamp_ns: u64,
    /// Buffers handed back through `release_frame`
    recycled: Vec<Vec<u8>>,
    frame_no: u64,
}

#[derive(Debug)]
struct PatternStream {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl PatternStream {
    fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            warn!("Pattern frame thread panicked");
        }
    }
}

/// Test pattern driver
pub struct PatternBackend {
    device_count: u32,
    epoch: Instant,
    next_token: AtomicU64,
    registered: AtomicBool,
    registrar: Mutex<Option<Registrar>>,
}

impl PatternBackend {
    pub fn new(device_count: u32) -> Self {
        let device_count = device_count.min(MAX_DEVICE_COUNT);
        Self {
            device_count,
            epoch: Instant::now(),
            next_token: AtomicU64::new(1),
            registered: AtomicBool::new(false),
            registrar: Mutex::new(None),
        }
    }

    /// Specs offered by every pattern camera
    pub fn specs() -> Vec<CameraSpec> {
        let mut specs = Vec::with_capacity(FORMATS.len() * RESOLUTIONS.len() * FRAMERATES.len());
        for format in FORMATS {
            for &(width, height) in RESOLUTIONS {
                for &fps in FRAMERATES {
                    specs.push(
                        CameraSpec::new(format, width, height).with_framerate(Framerate::from_int(fps)),
                    );
                }
            }
        }
        specs
    }

    /// Simulate unplugging a camera
    pub fn unplug(&self, id: DeviceId) {
        let registrar = self
            .registrar
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(registrar) = registrar {
            registrar.remove_device(id);
        }
    }

    fn clock_ns(&self) -> u64 {
        (self.epoch.elapsed().as_nanos() as u64).saturating_add(CLOCK_OFFSET_NS)
    }

    fn handle<'a>(&self, device: &'a Device) -> Option<&'a PatternHandle> {
        let handle = device.handle::<PatternHandle>();
        if handle.is_none() {
            warn!(id = %device.id(), "Device has no pattern handle");
        }
        handle
    }
}

impl Default for PatternBackend {
    fn default() -> Self {
        Self::new(DEFAULT_DEVICE_COUNT)
    }
}

impl CameraBackend for PatternBackend {
    fn name(&self) -> &str {
        DRIVER_NAME
    }

    fn description(&self) -> &str {
        DRIVER_DESCRIPTION
    }

    fn provides_own_callback_thread(&self) -> bool {
        true
    }

    fn detect_devices(&self, registrar: &Registrar) {
        *self
            .registrar
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(registrar.clone());

        // The set of virtual cameras never changes
        if self.registered.swap(true, Ordering::AcqRel) {
            return;
        }

        for index in 0..self.device_count {
            let position = if index == 0 {
                CameraPosition::FrontFacing
            } else {
                CameraPosition::Unknown
            };
            let handle = PatternHandle {
                index,
                ..PatternHandle::default()
            };
            registrar.add_device(format!("Test Pattern {}", index + 1), position, Self::specs(), handle);
        }
    }

    fn open_device(&self, device: &Arc<Device>, spec: &CameraSpec) -> BackendResult<()> {
        let handle = self
            .handle(device)
            .ok_or_else(|| BackendError::DeviceNotFound(device.name().to_string()))?;

        {
            let mut shared = handle.shared.lock().unwrap_or_else(PoisonError::into_inner);
            shared.spec = Some(*spec);
            shared.pending = None;
            shared.frame_no = 0;
        }

        // Nobody to ask
        device.report_permission(true);

        let period = spec
            .framerate
            .and_then(|fps| fps.frame_period())
            .unwrap_or(IDLE_PERIOD);
        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = Arc::clone(&stop);
        let worker = Arc::clone(device);
        let shared = Arc::clone(&handle.shared);
        let epoch = self.epoch;
        let first_token = self.next_token.fetch_add(1 << 32, Ordering::Relaxed);

        let thread = thread::Builder::new()
            .name(device.thread_name())
            .spawn(move || {
                let mut token = first_token;
                while !worker_stop.load(Ordering::Acquire) {
                    thread::sleep(period);
                    if worker_stop.load(Ordering::Acquire) {
                        break;
                    }
                    {
                        let mut shared = shared.lock().unwrap_or_else(PoisonError::into_inner);
                        let timestamp_ns =
                            (epoch.elapsed().as_nanos() as u64).saturating_add(CLOCK_OFFSET_NS);
                        render_next(&mut shared, token, timestamp_ns);
                        token += 1;
                    }
                    if !worker.iterate() {
                        break;
                    }
                }
                debug!(id = %worker.id(), "Pattern frame thread exiting");
            })
            .map_err(|e| BackendError::InitializationFailed(e.to_string()))?;

        *handle.stream.lock().unwrap_or_else(PoisonError::into_inner) = Some(PatternStream {
            stop,
            thread: Some(thread),
        });

        info!(id = %device.id(), index = handle.index, spec = %spec, "Pattern camera streaming");
        Ok(())
    }

    fn close_device(&self, device: &Device) {
        let Some(handle) = self.handle(device) else {
            return;
        };
        let stream = handle
            .stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut stream) = stream {
            stream.stop();
        }
        let mut shared = handle.shared.lock().unwrap_or_else(PoisonError::into_inner);
        shared.spec = None;
        shared.pending = None;
        shared.recycled.clear();
    }

    fn wait_device(&self, device: &Device) -> bool {
        if !device.is_shutting_down() {
            thread::sleep(device.frame_period().min(Duration::from_millis(100)));
        }
        true
    }

    fn acquire_frame(&self, device: &Device, frame: &mut AcquiredFrame) -> AcquireStatus {
        let Some(handle) = self.handle(device) else {
            return AcquireStatus::Error;
        };
        let mut shared = handle.shared.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(spec) = shared.spec else {
            return AcquireStatus::Skip;
        };
        let Some(buffer) = shared.pending.take() else {
            return AcquireStatus::Skip;
        };
        frame.stride = spec.default_stride();
        frame.timestamp_ns = match shared.pending_timestamp_ns {
            0 => self.clock_ns(),
            rendered => rendered,
        };
        frame.data = FrameData::Backend(buffer);
        AcquireStatus::Ready
    }

    fn release_frame(&self, device: &Device, data: FrameData) {
        let FrameData::Backend(buffer) = data else {
            return;
        };
        if let Some(handle) = device.handle::<PatternHandle>() {
            let mut shared = handle.shared.lock().unwrap_or_else(PoisonError::into_inner);
            if shared.recycled.len() < 4 {
                shared.recycled.push(buffer.bytes);
            }
        }
    }
}

fn render_next(shared: &mut PatternShared, token: u64, timestamp_ns: u64) {
    let Some(spec) = shared.spec else {
        return;
    };
    let Some(len) = spec.frame_len() else {
        return;
    };
    // Unconsumed frames are overwritten, like a sensor that keeps running
    let mut bytes = match shared.pending.take() {
        Some(previous) => previous.bytes,
        None => shared.recycled.pop().unwrap_or_default(),
    };
    bytes.resize(len, 0);
    render_bars(&spec, shared.frame_no, &mut bytes);
    shared.frame_no += 1;
    shared.pending = Some(BackendBuffer { bytes, token });
    shared.pending_timestamp_ns = timestamp_ns;
}

// ===== Colour bars =====

/// White, yellow, cyan, green, magenta, red, blue, black
const BARS: [[u8; 3]; 8] = [
    [255, 255, 255],
    [255, 255, 0],
    [0, 255, 255],
    [0, 255, 0],
    [255, 0, 255],
    [255, 0, 0],
    [0, 0, 255],
    [0, 0, 0],
];

/// Full range BT.601
fn rgb_to_yuv([r, g, b]: [u8; 3]) -> [u8; 3] {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let u = 128.0 - 0.168_736 * r - 0.331_264 * g + 0.5 * b;
    let v = 128.0 + 0.5 * r - 0.418_688 * g - 0.081_312 * b;
    [
        y.round().clamp(0.0, 255.0) as u8,
        u.round().clamp(0.0, 255.0) as u8,
        v.round().clamp(0.0, 255.0) as u8,
    ]
}

/// Bar colour at column `x`, scrolled left by `frame_no`
fn bar_at(x: u32, width: u32, frame_no: u64) -> usize {
    let width = u64::from(width.max(1));
    let shifted = (u64::from(x) + frame_no * 4) % width;
    (shifted * BARS.len() as u64 / width) as usize
}

/// Render colour bars for `spec` into `out`, which is `spec.frame_len()` long
pub fn render_bars(spec: &CameraSpec, frame_no: u64, out: &mut [u8]) {
    let width = spec.width as usize;
    let height = spec.height as usize;
    let stride = spec.default_stride() as usize;
    let yuv: Vec<[u8; 3]> = BARS.iter().copied().map(rgb_to_yuv).collect();

    match spec.format {
        PixelFormat::Yuyv => {
            for row in out.chunks_exact_mut(stride).take(height) {
                for (pair, px) in row.chunks_exact_mut(4).enumerate() {
                    let x = pair as u32 * 2;
                    let [y0, u, v] = yuv[bar_at(x, spec.width, frame_no)];
                    let [y1, ..] = yuv[bar_at((x + 1).min(spec.width - 1), spec.width, frame_no)];
                    px.copy_from_slice(&[y0, u, y1, v]);
                }
            }
        }
        PixelFormat::Nv12 => {
            let (luma, chroma) = out.split_at_mut(width * height);
            for row in luma.chunks_exact_mut(width) {
                for (x, px) in row.iter_mut().enumerate() {
                    *px = yuv[bar_at(x as u32, spec.width, frame_no)][0];
                }
            }
            let chroma_width = width.div_ceil(2);
            for row in chroma.chunks_exact_mut(chroma_width * 2) {
                for (cx, px) in row.chunks_exact_mut(2).enumerate() {
                    let [_, u, v] = yuv[bar_at(cx as u32 * 2, spec.width, frame_no)];
                    px.copy_from_slice(&[u, v]);
                }
            }
        }
        PixelFormat::Rgba32 => {
            for row in out.chunks_exact_mut(stride).take(height) {
                for (x, px) in row.chunks_exact_mut(4).enumerate() {
                    let [r, g, b] = BARS[bar_at(x as u32, spec.width, frame_no)];
                    px.copy_from_slice(&[r, g, b, 255]);
                }
            }
        }
        _ => out.fill(0),
    }
}
