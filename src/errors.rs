// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the camera subsystem

use crate::backends::camera::types::{BackendError, DeviceId};
use std::fmt;

/// Result type alias using CameraError
pub type CameraResult<T> = Result<T, CameraError>;

/// Errors reported by the public camera API
///
/// All of these are recoverable. Hardware failures during streaming are not
/// reported here; the device turns into a zombie instead and keeps serving
/// blank frames (see [`crate::backends::camera::Camera::is_disconnected`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    /// The subsystem was never initialized or has already quit
    NotInitialized,
    /// No device with this id is registered
    InvalidDeviceId(DeviceId),
    /// A caller supplied argument was out of range
    InvalidArgument(String),
    /// The device is already open
    AlreadyOpen(DeviceId),
    /// The camera was closed
    NotOpen,
    /// The user hasn't decided on camera access yet
    PermissionPending,
    /// The user refused camera access
    PermissionDenied,
    /// The device is gone
    Disconnected,
    /// The requested format can't be delivered
    FormatNotSupported(String),
    /// Error reported by the capture backend
    Backend(BackendError),
    /// No usable camera driver
    DriverNotAvailable(String),
    /// The capture thread could not be started
    ThreadSpawn(String),
    /// The frame doesn't belong to this camera or was already released
    ForeignFrame,
    /// Buffer allocation failed
    OutOfMemory,
    /// Configuration could not be read or written
    Config(String),
}

impl fmt::Display for CameraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraError::NotInitialized => write!(f, "Camera subsystem not initialized"),
            CameraError::InvalidDeviceId(id) => write!(f, "Invalid camera device id {}", id),
            CameraError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            CameraError::AlreadyOpen(id) => write!(f, "Camera {} is already open", id),
            CameraError::NotOpen => write!(f, "Camera is not open"),
            CameraError::PermissionPending => {
                write!(f, "Camera access has not been approved yet")
            }
            CameraError::PermissionDenied => write!(f, "Camera access was denied"),
            CameraError::Disconnected => write!(f, "Camera disconnected"),
            CameraError::FormatNotSupported(msg) => write!(f, "Format not supported: {}", msg),
            CameraError::Backend(e) => write!(f, "Backend error: {}", e),
            CameraError::DriverNotAvailable(msg) => write!(f, "Camera driver not available: {}", msg),
            CameraError::ThreadSpawn(msg) => write!(f, "Failed to start capture thread: {}", msg),
            CameraError::ForeignFrame => {
                write!(f, "Frame does not belong to this camera or was already released")
            }
            CameraError::OutOfMemory => write!(f, "Out of memory"),
            CameraError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for CameraError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CameraError::Backend(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BackendError> for CameraError {
    fn from(err: BackendError) -> Self {
        CameraError::Backend(err)
    }
}

impl From<std::io::Error> for CameraError {
    fn from(err: std::io::Error) -> Self {
        CameraError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for CameraError {
    fn from(err: serde_json::Error) -> Self {
        CameraError::Config(err.to_string())
    }
}
