// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for disconnected cameras

mod common;

use camera_core::backends::camera::{CameraEvent, Framerate, PixelFormat};
use camera_core::{CameraError, CameraSpec};
use common::*;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

fn removed_events(events: &[CameraEvent]) -> usize {
    events
        .iter()
        .filter(|event| matches!(event, CameraEvent::Removed(_)))
        .count()
}

#[test]
fn test_failed_wait_switches_to_blank_frames() {
    let backend = Arc::new(ScriptedBackend::single_camera());
    let cameras = start(&backend, test_config());
    let id = cameras.devices().unwrap()[0];
    cameras.pump_events().unwrap();

    let camera = cameras.open_camera(id, None).unwrap();
    assert_eq!(cameras.pump_events().unwrap(), vec![CameraEvent::Approved(id)]);
    let spec = camera.format().unwrap();
    assert!(wait_until(TIMEOUT, || camera.pool_stats().filled > 0));

    backend.fail_wait.store(true, Ordering::SeqCst);
    assert!(wait_until(TIMEOUT, || camera.is_disconnected()));
    assert_eq!(cameras.pump_events().unwrap(), vec![CameraEvent::Removed(id)]);

    // Drain frames captured before the failure, then collect blank ones
    let mut blank_timestamps = Vec::new();
    let mut last_timestamp = 0;
    assert!(wait_until(TIMEOUT, || {
        while let Some(frame) = camera.acquire_frame().unwrap() {
            assert!(frame.timestamp_ns > last_timestamp);
            last_timestamp = frame.timestamp_ns;
            if frame.data().chunks(2).all(|pair| pair == [0, 128]) {
                assert_eq!(Some(frame.data().len()), spec.frame_len());
                assert_eq!((frame.width, frame.height), (spec.width, spec.height));
                blank_timestamps.push(frame.timestamp_ns);
            }
            camera.release_frame(frame).unwrap();
        }
        blank_timestamps.len() >= 3
    }));

    // No second removal for the same device
    assert_eq!(removed_events(&cameras.pump_events().unwrap()), 0);
    camera.close();
    assert_eq!(backend.outstanding(), 0);
    assert_eq!(backend.counters.bad_releases.load(Ordering::SeqCst), 0);
}

#[test]
fn test_blank_frames_are_paced_at_frame_rate() {
    let backend = Arc::new(ScriptedBackend::new(vec![(
        "Slow Camera",
        vec![CameraSpec::new(PixelFormat::Nv12, 64, 48).with_framerate(Framerate::from_int(20))],
    )]));
    let cameras = start(&backend, test_config());
    let id = cameras.devices().unwrap()[0];
    // The very first wait fails, so no live frame is ever captured
    backend.fail_wait.store(true, Ordering::SeqCst);
    let camera = cameras.open_camera(id, None).unwrap();

    assert!(wait_until(TIMEOUT, || camera.pool_stats().filled > 0));
    std::thread::sleep(Duration::from_millis(200));
    // 20 fps over ~200ms; generous bounds for slow machines
    let produced = camera.pool_stats().filled as u64 + camera.dropped_frame_count();
    assert!(produced <= 8, "produced {} frames", produced);
}

#[test]
fn test_concurrent_disconnect_reports_once() {
    let backend = Arc::new(ScriptedBackend::single_camera());
    let cameras = start(&backend, test_config());
    let id = cameras.devices().unwrap()[0];
    cameras.pump_events().unwrap();
    let camera = cameras.open_camera(id, None).unwrap();

    let threads: Vec<_> = (0..8)
        .map(|_| {
            let device = Arc::clone(camera.device());
            std::thread::spawn(move || device.mark_disconnected())
        })
        .collect();
    for thread in threads {
        thread.join().unwrap();
    }
    let events = cameras.pump_events().unwrap();
    assert_eq!(removed_events(&events), 1);
    assert!(camera.is_disconnected());
}

#[test]
fn test_unplugged_device_stays_usable_until_closed() {
    let backend = Arc::new(ScriptedBackend::single_camera());
    let cameras = start(&backend, test_config());
    let id = cameras.devices().unwrap()[0];
    cameras.pump_events().unwrap();
    let registrar = backend.registrar();

    let camera = cameras.open_camera(id, None).unwrap();
    cameras.pump_events().unwrap();
    registrar.remove_device(id);

    assert!(camera.is_disconnected());
    assert_eq!(cameras.device_count().unwrap(), 0);
    assert!(matches!(
        cameras.open_camera(id, None),
        Err(CameraError::InvalidDeviceId(_))
    ));
    assert_eq!(cameras.pump_events().unwrap(), vec![CameraEvent::Removed(id)]);

    assert!(wait_until(TIMEOUT, || camera.pool_stats().filled > 0));
    let frame = camera.acquire_frame().unwrap().unwrap();
    camera.release_frame(frame).unwrap();

    // Removing again is a no-op
    registrar.remove_device(id);
    assert!(cameras.pump_events().unwrap().is_empty());

    // The camera handle holds the last reference
    assert_eq!(backend.counters.frees.load(Ordering::SeqCst), 0);
    camera.close();
    assert_eq!(backend.counters.closes.load(Ordering::SeqCst), 1);
    assert_eq!(backend.counters.frees.load(Ordering::SeqCst), 1);
    assert_eq!(backend.outstanding(), 0);
}

#[test]
fn test_compressed_disconnected_device_yields_nothing() {
    let backend = Arc::new(ScriptedBackend::new(vec![(
        "Jpeg Camera",
        vec![CameraSpec::new(PixelFormat::Mjpeg, 640, 480).with_framerate(Framerate::from_int(30))],
    )]));
    let cameras = start(&backend, test_config());
    let id = cameras.devices().unwrap()[0];

    let camera = cameras.open_camera(id, None).unwrap();
    camera.device().mark_disconnected();
    std::thread::sleep(Duration::from_millis(100));

    assert!(camera.acquire_frame().unwrap().is_none());
    assert_eq!(camera.format().unwrap().format, PixelFormat::Mjpeg);
    camera.close();
}

#[test]
fn test_disconnect_after_close_is_harmless() {
    let backend = Arc::new(ScriptedBackend::single_camera());
    let cameras = start(&backend, test_config());
    let id = cameras.devices().unwrap()[0];
    cameras.pump_events().unwrap();

    let camera = cameras.open_camera(id, None).unwrap();
    let device = Arc::clone(camera.device());
    camera.close();
    assert_eq!(cameras.pump_events().unwrap(), vec![CameraEvent::Approved(id)]);

    device.mark_disconnected();
    assert_eq!(cameras.pump_events().unwrap(), vec![CameraEvent::Removed(id)]);
    // A lost device can't be opened again
    assert!(matches!(
        cameras.open_camera(id, None),
        Err(CameraError::Disconnected)
    ));
}
