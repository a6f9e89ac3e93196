// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for camera operations
//!
//! This module provides command-line functionality for:
//! - Listing drivers and cameras
//! - Saving a snapshot
//! - Streaming with live statistics

use camera_core::backends::camera::{
    BOOTSTRAP, Camera, CameraEvent, CameraFrame, CameraSpec, CameraSubsystem, DeviceId,
    PermissionState, PixelFormat, SpecRequest,
};
use camera_core::CameraConfig;
use chrono::Local;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// How long to wait for the user to grant access and the first frame
const START_TIMEOUT: Duration = Duration::from_secs(5);

/// Frames arriving this soon after start are skipped (auto exposure settling)
const WARMUP: Duration = Duration::from_millis(500);

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// List the drivers built into this binary
pub fn list_drivers(config: CameraConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("Available drivers:");
    for bootstrap in BOOTSTRAP {
        let note = if bootstrap.demand_only {
            " (only when requested)"
        } else {
            ""
        };
        println!("  {:<8} {}{}", bootstrap.name, bootstrap.description, note);
    }

    match CameraSubsystem::init(config) {
        Ok(cameras) => println!("\nSelected: {}", cameras.driver_name()?),
        Err(e) => println!("\nNo driver could be started: {}", e),
    }
    Ok(())
}

/// List all available cameras
pub fn list_cameras(config: CameraConfig) -> Result<(), Box<dyn std::error::Error>> {
    let cameras = CameraSubsystem::init(config)?;
    let ids = cameras.devices()?;

    if ids.is_empty() {
        println!("No cameras found ({} driver).", cameras.driver_name()?);
        return Ok(());
    }

    println!("Available cameras ({} driver):", cameras.driver_name()?);
    println!();
    for (index, id) in ids.iter().enumerate() {
        println!(
            "  [{}] {} (id {}, {})",
            index,
            cameras.device_name(*id)?,
            id,
            cameras.device_position(*id)?
        );

        let specs = cameras.supported_formats(*id)?;
        // Already ranked best first
        let shown: Vec<String> = specs.iter().take(4).map(ToString::to_string).collect();
        if !shown.is_empty() {
            let more = specs.len().saturating_sub(shown.len());
            let suffix = if more > 0 {
                format!(" (+{} more)", more)
            } else {
                String::new()
            };
            println!("      Formats: {}{}", shown.join(", "), suffix);
        }
        println!();
    }

    Ok(())
}

/// Save one frame from the selected camera as PNG
pub fn snapshot(
    config: CameraConfig,
    camera_index: usize,
    size: Option<&str>,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let cameras = CameraSubsystem::init(config)?;
    let id = pick_camera(&cameras, camera_index)?;
    println!("Using camera: {}", cameras.device_name(id)?);

    let mut request = SpecRequest::new().format(PixelFormat::Rgba32);
    if let Some(size) = size {
        let (width, height) = parse_size(size)?;
        request = request.size(width, height);
    }
    let camera = cameras.open_camera(id, Some(request))?;
    wait_for_approval(&camera)?;

    let spec = camera.format()?;
    println!("Capture format: {}", spec);

    let start = Instant::now();
    let mut picked = None;
    while start.elapsed() < START_TIMEOUT {
        match camera.acquire_frame()? {
            Some(frame) if start.elapsed() >= WARMUP => {
                picked = Some(frame);
                break;
            }
            Some(frame) => camera.release_frame(frame)?,
            None => std::thread::sleep(POLL_INTERVAL),
        }
    }
    let frame = picked.ok_or("Failed to capture frame from camera")?;

    let image = frame_to_image(&frame)?;
    camera.release_frame(frame)?;

    let path = match output {
        Some(path) if path.is_dir() => path.join(snapshot_file_name()),
        Some(path) => path,
        None => default_snapshot_dir().join(snapshot_file_name()),
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    image.save(&path)?;

    println!("Snapshot saved: {}", path.display());
    Ok(())
}

/// Stream frames, printing statistics once a second
pub fn stream(
    config: CameraConfig,
    camera_index: usize,
    size: Option<&str>,
    format: Option<&str>,
    duration: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let cameras = CameraSubsystem::init(config)?;
    let id = pick_camera(&cameras, camera_index)?;
    println!("Using camera: {}", cameras.device_name(id)?);

    let mut request = SpecRequest::new();
    if let Some(size) = size {
        let (width, height) = parse_size(size)?;
        request = request.size(width, height);
    }
    if let Some(name) = format {
        let format =
            PixelFormat::from_name(name).ok_or_else(|| format!("Unknown pixel format: {}", name))?;
        request = request.format(format);
    }

    let camera = cameras.open_camera(id, Some(request))?;
    wait_for_approval(&camera)?;
    println!(
        "Streaming {} (native {})",
        camera.format()?,
        camera.native_format()?
    );

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = Arc::clone(&running);
    ctrlc::set_handler(move || handler_flag.store(false, Ordering::SeqCst))?;

    let limit = (duration > 0).then(|| Duration::from_secs(duration));
    let start = Instant::now();
    let mut window = Instant::now();
    let mut stats = StreamStats::default();

    while running.load(Ordering::SeqCst) && limit.is_none_or(|limit| start.elapsed() < limit) {
        for event in cameras.pump_events()? {
            if let CameraEvent::Removed(removed) = event
                && removed == id
            {
                println!("Camera disconnected, frames are now blank");
            }
        }

        match camera.acquire_frame()? {
            Some(frame) => {
                stats.record(&frame);
                camera.release_frame(frame)?;
            }
            None => std::thread::sleep(POLL_INTERVAL),
        }

        if window.elapsed() >= Duration::from_secs(1) {
            println!(
                "{:>6} frames  {:>6.1} fps  {:>5} dropped  last ts {} ns",
                stats.frames,
                stats.window_frames as f64 / window.elapsed().as_secs_f64(),
                camera.dropped_frame_count(),
                stats.last_timestamp_ns
            );
            stats.window_frames = 0;
            window = Instant::now();
        }
    }

    println!(
        "Done: {} frames in {:.1}s, {} dropped",
        stats.frames,
        start.elapsed().as_secs_f64(),
        camera.dropped_frame_count()
    );
    Ok(())
}

#[derive(Debug, Default)]
struct StreamStats {
    frames: u64,
    window_frames: u64,
    last_timestamp_ns: u64,
}

impl StreamStats {
    fn record(&mut self, frame: &CameraFrame) {
        self.frames += 1;
        self.window_frames += 1;
        self.last_timestamp_ns = frame.timestamp_ns;
    }
}

fn pick_camera(
    cameras: &CameraSubsystem,
    index: usize,
) -> Result<DeviceId, Box<dyn std::error::Error>> {
    let ids = cameras.devices()?;
    if ids.is_empty() {
        return Err("No cameras found".into());
    }
    ids.get(index).copied().ok_or_else(|| {
        format!("Camera index {} out of range (0-{})", index, ids.len() - 1).into()
    })
}

fn wait_for_approval(camera: &Camera) -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();
    loop {
        match camera.permission_state() {
            PermissionState::Approved => return Ok(()),
            PermissionState::Denied => return Err("Camera access denied".into()),
            PermissionState::Pending if start.elapsed() > START_TIMEOUT => {
                return Err("Timed out waiting for camera access".into());
            }
            PermissionState::Pending => std::thread::sleep(POLL_INTERVAL),
        }
    }
}

/// Parse "WIDTHxHEIGHT"
fn parse_size(size: &str) -> Result<(u32, u32), Box<dyn std::error::Error>> {
    let (width, height) = size
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("Invalid size '{}', expected WIDTHxHEIGHT", size))?;
    Ok((width.trim().parse()?, height.trim().parse()?))
}

/// Copy an RGBA frame into an image, dropping any row padding
fn frame_to_image(frame: &CameraFrame) -> Result<image::RgbaImage, Box<dyn std::error::Error>> {
    if frame.format != PixelFormat::Rgba32 {
        return Err(format!("Expected RGBA frame, got {}", frame.format).into());
    }
    let spec: CameraSpec = frame.spec();
    let row = spec.width as usize * 4;
    let stride = if frame.stride == 0 {
        row
    } else {
        frame.stride as usize
    };

    let mut pixels = Vec::with_capacity(row * spec.height as usize);
    for y in 0..spec.height as usize {
        let line = frame
            .data()
            .get(y * stride..y * stride + row)
            .ok_or("Frame is shorter than its format")?;
        pixels.extend_from_slice(line);
    }
    image::RgbaImage::from_raw(spec.width, spec.height, pixels)
        .ok_or_else(|| "Frame size mismatch".into())
}

fn default_snapshot_dir() -> PathBuf {
    dirs::picture_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("camera-core")
}

fn snapshot_file_name() -> String {
    format!("snapshot_{}.png", Local::now().format("%Y%m%d_%H%M%S"))
}
