// SPDX-License-Identifier: GPL-3.0-only

//! Scripted backend shared by the integration tests

#![allow(dead_code)]

use camera_core::backends::camera::{
    AcquireStatus, AcquiredFrame, BackendBuffer, BackendError, BackendResult, CameraBackend,
    CameraPosition, CameraSpec, Device, DeviceId, FrameData, Framerate, PixelFormat, Registrar,
    Resolution, SpecRequest,
};
use camera_core::{CameraConfig, CameraSubsystem};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Backend clock epoch, unrelated to the process monotonic clock
pub const BACKEND_CLOCK_START_NS: u64 = 7_000_000_000_000;

/// How the backend answers the access prompt during `open_device`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionScript {
    Approve,
    Deny,
    /// Leave it pending; the test reports it later
    Ask,
}

#[derive(Debug)]
pub struct ScriptedHandle {
    pub index: usize,
}

#[derive(Debug, Default)]
pub struct Counters {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub frees: AtomicUsize,
    pub deinits: AtomicUsize,
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
    /// Releases of buffers the backend never handed out (or already got back)
    pub bad_releases: AtomicUsize,
}

pub struct ScriptedBackend {
    devices: Vec<(String, Vec<CameraSpec>)>,
    pub permission: PermissionScript,
    pub fail_open: AtomicBool,
    pub fail_wait: AtomicBool,
    pub wait_interval: Duration,
    pub counters: Counters,
    registrar: Mutex<Option<Registrar>>,
    open_specs: Mutex<HashMap<DeviceId, CameraSpec>>,
    outstanding: Mutex<HashSet<u64>>,
    next_seq: AtomicU64,
}

impl ScriptedBackend {
    pub fn new(devices: Vec<(&str, Vec<CameraSpec>)>) -> Self {
        Self {
            devices: devices
                .into_iter()
                .map(|(name, specs)| (name.to_string(), specs))
                .collect(),
            permission: PermissionScript::Approve,
            fail_open: AtomicBool::new(false),
            fail_wait: AtomicBool::new(false),
            wait_interval: Duration::from_millis(2),
            counters: Counters::default(),
            registrar: Mutex::new(None),
            open_specs: Mutex::new(HashMap::new()),
            outstanding: Mutex::new(HashSet::new()),
            next_seq: AtomicU64::new(0),
        }
    }

    /// One YUYV camera with a handful of modes
    pub fn single_camera() -> Self {
        Self::new(vec![("Scripted Camera", yuyv_specs())])
    }

    pub fn with_permission(mut self, permission: PermissionScript) -> Self {
        self.permission = permission;
        self
    }

    pub fn with_wait_interval(mut self, interval: Duration) -> Self {
        self.wait_interval = interval;
        self
    }

    pub fn registrar(&self) -> Registrar {
        self.registrar
            .lock()
            .unwrap()
            .clone()
            .expect("detect_devices has run")
    }

    /// Backend buffers currently lent out
    pub fn outstanding(&self) -> usize {
        self.outstanding.lock().unwrap().len()
    }
}

pub fn yuyv_specs() -> Vec<CameraSpec> {
    vec![
        CameraSpec::new(PixelFormat::Yuyv, 640, 480).with_framerate(Framerate::from_int(30)),
        CameraSpec::new(PixelFormat::Yuyv, 320, 240).with_framerate(Framerate::from_int(30)),
        CameraSpec::new(PixelFormat::Yuyv, 160, 120).with_framerate(Framerate::from_int(60)),
    ]
}

impl CameraBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn description(&self) -> &str {
        "Scripted test backend"
    }

    fn detect_devices(&self, registrar: &Registrar) {
        *self.registrar.lock().unwrap() = Some(registrar.clone());
        for (index, (name, specs)) in self.devices.iter().enumerate() {
            registrar.add_device(
                name.clone(),
                CameraPosition::Unknown,
                specs.clone(),
                ScriptedHandle { index },
            );
        }
    }

    fn open_device(&self, device: &Arc<Device>, spec: &CameraSpec) -> BackendResult<()> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(BackendError::InitializationFailed("scripted failure".into()));
        }
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        self.open_specs.lock().unwrap().insert(device.id(), *spec);
        match self.permission {
            PermissionScript::Approve => device.report_permission(true),
            PermissionScript::Deny => device.report_permission(false),
            PermissionScript::Ask => {}
        }
        Ok(())
    }

    /// Settles open fields on 320x240 YUYV at 30 fps
    fn open_unlisted_device(
        &self,
        device: &Arc<Device>,
        request: Option<&SpecRequest>,
    ) -> BackendResult<CameraSpec> {
        let request = request.copied().unwrap_or_default();
        let format = request.format.unwrap_or(PixelFormat::Yuyv);
        let size = request.size.unwrap_or(Resolution::new(320, 240));
        let spec = CameraSpec::new(format, size.width, size.height)
            .with_framerate(request.framerate.unwrap_or(Framerate::from_int(30)));
        self.open_device(device, &spec)?;
        Ok(spec)
    }

    fn close_device(&self, device: &Device) {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        self.open_specs.lock().unwrap().remove(&device.id());
    }

    fn free_device_handle(&self, device: &Device) {
        assert!(device.handle::<ScriptedHandle>().is_some());
        self.counters.frees.fetch_add(1, Ordering::SeqCst);
    }

    fn deinitialize(&self) {
        self.counters.deinits.fetch_add(1, Ordering::SeqCst);
    }

    fn wait_device(&self, _device: &Device) -> bool {
        std::thread::sleep(self.wait_interval);
        !self.fail_wait.load(Ordering::SeqCst)
    }

    fn acquire_frame(&self, device: &Device, frame: &mut AcquiredFrame) -> AcquireStatus {
        let Some(spec) = self.open_specs.lock().unwrap().get(&device.id()).copied() else {
            return AcquireStatus::Skip;
        };
        let Some(len) = spec.frame_len() else {
            return AcquireStatus::Skip;
        };
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.outstanding.lock().unwrap().insert(seq);
        self.counters.acquired.fetch_add(1, Ordering::SeqCst);

        frame.data = FrameData::Backend(BackendBuffer {
            bytes: vec![(seq % 251) as u8; len],
            token: seq,
        });
        frame.stride = spec.default_stride();
        frame.timestamp_ns = BACKEND_CLOCK_START_NS + seq * 1_000_000;
        AcquireStatus::Ready
    }

    fn release_frame(&self, _device: &Device, data: FrameData) {
        let FrameData::Backend(buffer) = data else {
            self.counters.bad_releases.fetch_add(1, Ordering::SeqCst);
            return;
        };
        if self.outstanding.lock().unwrap().remove(&buffer.token) {
            self.counters.released.fetch_add(1, Ordering::SeqCst);
        } else {
            self.counters.bad_releases.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Config with no startup frame drop so tests see every frame
pub fn test_config() -> CameraConfig {
    CameraConfig {
        drop_initial_frames: 0,
        buffer_count: 4,
        ..CameraConfig::default()
    }
}

pub fn start(backend: &Arc<ScriptedBackend>, config: CameraConfig) -> CameraSubsystem {
    let dyn_backend: Arc<dyn CameraBackend> = backend.clone();
    CameraSubsystem::with_backend(dyn_backend, config).unwrap()
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}

pub const TIMEOUT: Duration = Duration::from_secs(5);
