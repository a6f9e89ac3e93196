// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for configuration module

use camera_core::{CameraConfig, CameraError};

#[test]
fn test_config_default() {
    let config = CameraConfig::default();

    assert!(config.driver.is_none());
    assert!(config.buffer_count > 0, "Default must allow capturing");
    assert_eq!(config.drop_initial_frames, 1);
    assert!(config.wait_poll_interval() > std::time::Duration::ZERO);
}

#[test]
fn test_config_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");

    let config = CameraConfig {
        driver: Some("pattern,dummy".to_string()),
        buffer_count: 3,
        drop_initial_frames: 0,
        wait_poll_interval_ms: 40,
        pattern_devices: 2,
    };
    config.save_to(&path).unwrap();

    assert_eq!(CameraConfig::load_from(&path).unwrap(), config);
}

#[test]
fn test_config_missing_fields_use_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{ "buffer_count": 2 }"#).unwrap();

    let config = CameraConfig::load_from(&path).unwrap();
    assert_eq!(config.buffer_count, 2);
    assert_eq!(
        config.drop_initial_frames,
        CameraConfig::default().drop_initial_frames
    );
    assert!(config.driver.is_none());
}

#[test]
fn test_config_zero_buffers_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{ "buffer_count": 0 }"#).unwrap();

    let config = CameraConfig::load_from(&path).unwrap();
    assert_eq!(config.buffer_count, CameraConfig::default().buffer_count);
}

#[test]
fn test_config_invalid_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "driver = v4l2").unwrap();

    assert!(matches!(
        CameraConfig::load_from(&path),
        Err(CameraError::Config(_))
    ));
}

#[test]
fn test_config_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    assert!(CameraConfig::load_from(&dir.path().join("absent.json")).is_err());
}
