// SPDX-License-Identifier: GPL-3.0-only
//! Capture loop: thread lifecycle and the per-frame iteration
//!
//! Each open device without its own backend callback thread gets one capture
//! thread, managed by a [`CaptureLoopController`]. Every pass waits for the
//! backend, then runs [`iterate`]:
//!
//! ```text
//! lock ─► acquire (non-blocking) ─► pick empty slot ─► unlock
//!                                                        │
//!                      convert / scale outside the lock ◄┘
//!                                                        │
//!                 lock ─► publish slot as newest filled ◄┘
//! ```

use super::device::{Device, DevicePhase};
use super::format_converters::{self, FrameView};
use super::types::{
    AcquireStatus, AcquiredFrame, CameraSpec, FrameData, PermissionState, ScalingMode,
};
use crate::errors::{CameraError, CameraResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, info, trace, warn};

/// Nanoseconds on the process-wide monotonic clock
pub fn monotonic_ns() -> u64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    let epoch = EPOCH.get_or_init(Instant::now);
    // Never report 0, it reads as "no timestamp"
    (epoch.elapsed().as_nanos() as u64).max(1)
}

/// Maps backend timestamps onto the monotonic clock
///
/// Captured at the first delivered frame of a session so timestamps from a
/// backend with an unrelated clock still line up with `monotonic_ns`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timebase {
    first_raw_ns: u64,
    first_mono_ns: u64,
}

impl Timebase {
    pub fn new(first_raw_ns: u64, first_mono_ns: u64) -> Self {
        Self {
            first_raw_ns,
            first_mono_ns,
        }
    }

    pub fn adjust(&self, raw_ns: u64) -> u64 {
        raw_ns
            .saturating_sub(self.first_raw_ns)
            .saturating_add(self.first_mono_ns)
    }
}

/// Action returned by the capture loop callback to control loop behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Continue running the loop
    Continue,
    /// Stop the loop gracefully
    Stop,
}

/// Controller for a capture loop running in a separate thread
///
/// The loop runs until its closure returns [`LoopAction::Stop`] or the stop
/// signal is raised. Dropping the controller stops and joins the thread.
pub struct CaptureLoopController {
    /// Thread handle for joining
    thread_handle: Option<JoinHandle<()>>,
    /// Signal to stop the loop
    stop_signal: Arc<AtomicBool>,
    /// Name for logging
    name: String,
}

impl CaptureLoopController {
    /// Start a new capture loop in a named thread
    ///
    /// # Arguments
    ///
    /// * `name` - Thread name, also used in logging
    /// * `stop_signal` - Flag checked before every iteration
    /// * `loop_fn` - A closure that performs one iteration of the capture loop
    pub fn start<F>(name: &str, stop_signal: Arc<AtomicBool>, mut loop_fn: F) -> CameraResult<Self>
    where
        F: FnMut() -> LoopAction + Send + 'static,
    {
        let stop_signal_clone = Arc::clone(&stop_signal);
        let name_clone = name.to_string();

        info!(name = %name, "Starting capture loop");

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                debug!(name = %name_clone, "Capture loop thread started");

                loop {
                    // Check stop signal first
                    if stop_signal_clone.load(Ordering::Acquire) {
                        debug!(name = %name_clone, "Stop signal received");
                        break;
                    }

                    match loop_fn() {
                        LoopAction::Continue => {}
                        LoopAction::Stop => {
                            debug!(name = %name_clone, "Loop requested stop");
                            break;
                        }
                    }
                }

                info!(name = %name_clone, "Capture loop thread exiting");
            })
            .map_err(|e| CameraError::ThreadSpawn(e.to_string()))?;

        Ok(Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            name: name.to_string(),
        })
    }

    /// Check if the loop is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Signal the loop to stop (non-blocking)
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting capture loop stop");
        self.stop_signal.store(true, Ordering::Release);
    }

    /// Stop the loop and wait for the thread to finish
    pub fn stop(&mut self) {
        self.request_stop();
        self.join();
    }

    /// Wait for the thread to finish without sending stop signal
    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            debug!(name = %self.name, "Waiting for capture loop thread to finish");
            if let Err(e) = handle.join() {
                warn!(name = %self.name, "Capture loop thread panicked: {:?}", e);
            } else {
                debug!(name = %self.name, "Capture loop thread finished");
            }
        }
    }
}

impl std::fmt::Debug for CaptureLoopController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureLoopController")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish()
    }
}

impl Drop for CaptureLoopController {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "CaptureLoopController dropped, stopping loop");
            self.stop();
        }
    }
}

/// Spawn the capture thread for an opened device
///
/// The thread owns a reference to the device, so the device outlives it;
/// closing joins the thread before tearing anything down.
pub(crate) fn spawn_capture_thread(device: &Arc<Device>) -> CameraResult<CaptureLoopController> {
    let worker = Arc::clone(device);
    CaptureLoopController::start(&device.thread_name(), device.shutdown_signal(), move || {
        if !worker.frame_source().wait(&worker) {
            // Keep looping; from here on the zombie source produces frames
            worker.mark_disconnected();
        }
        if worker.iterate() {
            LoopAction::Continue
        } else {
            LoopAction::Stop
        }
    })
}

/// Frame picked up under the lock, waiting to be written into its slot
struct PendingWrite {
    slot: usize,
    output: FrameData,
    acquired: AcquiredFrame,
    timestamp_ns: u64,
    session: u64,
}

/// Everything the conversion step needs, copied out of the locked state
struct Conversion {
    source: CameraSpec,
    target: CameraSpec,
    scaling: ScalingMode,
    needs_conversion: bool,
    scratch: Vec<u8>,
}

/// One capture iteration; returns `false` when the loop should end
pub(crate) fn iterate(device: &Device) -> bool {
    let mut state = device.lock_state();

    if device.is_shutting_down() {
        return false;
    }
    match device.permission_state() {
        PermissionState::Pending => return true,
        PermissionState::Denied => {
            debug!(id = %device.id(), "Camera access denied, ending capture");
            return false;
        }
        PermissionState::Approved => {}
    }
    if state.phase != DevicePhase::Streaming {
        return true;
    }

    let source = device.frame_source();
    let mut acquired = AcquiredFrame::default();
    let status = source.acquire(device, &mut state, &mut acquired);

    let mut discard = None;
    let mut pending = None;
    let mut failed = false;

    match status {
        AcquireStatus::Ready => {
            if state.drop_frames > 0 {
                state.drop_frames -= 1;
                trace!(id = %device.id(), remaining = state.drop_frames, "Dropping startup frame");
                discard = Some(std::mem::take(&mut acquired.data));
            } else if let Some((slot, output)) = state.pool.begin_write() {
                let timestamp_ns = if acquired.data.is_zombie() {
                    acquired.timestamp_ns
                } else {
                    let timebase = *state
                        .timebase
                        .get_or_insert_with(|| Timebase::new(acquired.timestamp_ns, monotonic_ns()));
                    timebase.adjust(acquired.timestamp_ns)
                };
                pending = Some(PendingWrite {
                    slot,
                    output,
                    acquired,
                    timestamp_ns,
                    session: state.session,
                });
            } else {
                // Consumer is behind: the new frame is dropped, queued ones stay
                state.dropped_frame_count += 1;
                trace!(id = %device.id(), dropped = state.dropped_frame_count, "No free buffer, dropping frame");
                discard = Some(std::mem::take(&mut acquired.data));
            }
        }
        AcquireStatus::Skip => {}
        AcquireStatus::Error => failed = true,
    }

    let conversion = match (&pending, state.closest, state.app_spec) {
        (Some(_), Some(source), Some(target)) if !state.is_zero_copy() => Some(Conversion {
            source,
            target,
            scaling: state.scaling,
            needs_conversion: state.needs_conversion,
            scratch: std::mem::take(&mut state.scratch),
        }),
        _ => None,
    };
    drop(state);

    if let Some(data) = discard {
        source.release(device, data);
    }
    if failed {
        warn!(id = %device.id(), "Backend failed to acquire a frame");
        device.mark_disconnected();
    }

    let Some(write) = pending else {
        return true;
    };
    publish(device, write, conversion);
    true
}

fn publish(device: &Device, write: PendingWrite, conversion: Option<Conversion>) {
    let PendingWrite {
        slot,
        output,
        acquired,
        timestamp_ns,
        session,
    } = write;

    let (data, stride, scratch, to_release) = match conversion {
        None => (acquired.data, acquired.stride, None, None),
        Some(mut job) => {
            let mut out = match output {
                FrameData::Owned(bytes) => bytes,
                _ => Vec::new(),
            };
            let result = convert_frame(&acquired, &mut job, &mut out);
            match result {
                Ok(stride) => (FrameData::Owned(out), stride, Some(job.scratch), Some(acquired.data)),
                Err(e) => {
                    warn!(id = %device.id(), error = %e, "Frame conversion failed");
                    device.frame_source().release(device, acquired.data);
                    let mut state = device.lock_state();
                    if state.session == session && state.phase == DevicePhase::Streaming {
                        state.pool.abort_write(slot, FrameData::Owned(out));
                        state.scratch = job.scratch;
                    }
                    return;
                }
            }
        }
    };

    if let Some(source_data) = to_release {
        device.frame_source().release(device, source_data);
    }

    let mut state = device.lock_state();
    if state.session != session || state.phase != DevicePhase::Streaming {
        // Closed while converting; the pool this slot came from is gone
        drop(state);
        device.frame_source().release(device, data);
        return;
    }
    if let Some(scratch) = scratch {
        state.scratch = scratch;
    }
    state.pool.finish_write(slot, data, stride, timestamp_ns);
    trace!(id = %device.id(), slot, timestamp_ns, "Frame published");
}

/// Scale and/or convert the acquired frame into `out`
///
/// Downscaling happens before format conversion and upscaling after it, so
/// the costly step always runs on the smaller image.
fn convert_frame(
    acquired: &AcquiredFrame,
    job: &mut Conversion,
    out: &mut Vec<u8>,
) -> Result<u32, String> {
    let src = FrameView::new(
        acquired.data.as_slice(),
        job.source.format,
        job.source.width,
        job.source.height,
        acquired.stride,
    );
    let target = job.target;

    match (job.scaling, job.needs_conversion) {
        (ScalingMode::None, true) => format_converters::convert(&src, target.format, out),
        (ScalingMode::None, false) => format_converters::scale(&src, src.width, src.height, out),
        (ScalingMode::Down, false) | (ScalingMode::Up, false) => {
            format_converters::scale(&src, target.width, target.height, out)
        }
        (ScalingMode::Down, true) => {
            let stride =
                format_converters::scale(&src, target.width, target.height, &mut job.scratch)?;
            let scaled = FrameView::new(&job.scratch, src.format, target.width, target.height, stride);
            format_converters::convert(&scaled, target.format, out)
        }
        (ScalingMode::Up, true) => {
            let stride = format_converters::convert(&src, target.format, &mut job.scratch)?;
            let converted = FrameView::new(&job.scratch, target.format, src.width, src.height, stride);
            format_converters::scale(&converted, target.width, target.height, out)
        }
    }
}
