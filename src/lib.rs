// SPDX-License-Identifier: GPL-3.0-only

//! Camera Core - cross-driver camera capture
//!
//! This library enumerates cameras through pluggable platform drivers,
//! negotiates a capture format, and delivers timestamped frames to the
//! application through a fixed pool of buffers, converting and scaling
//! when the hardware can't produce what was asked for.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Driver trait, device registry, capture loop and drivers
//! - [`config`]: User configuration handling
//! - [`constants`]: Defaults shared across the crate
//! - [`errors`]: Error types
//!
//! # Example
//!
//! ```no_run
//! use camera_core::{CameraConfig, CameraSubsystem};
//!
//! let cameras = CameraSubsystem::init(CameraConfig::load())?;
//! for id in cameras.devices()? {
//!     println!("{}: {}", id, cameras.device_name(id)?);
//! }
//! # Ok::<(), camera_core::CameraError>(())
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;

// Re-export commonly used types
pub use backends::camera::{
    Camera, CameraEvent, CameraFrame, CameraSpec, CameraSubsystem, DeviceId, PixelFormat,
    SpecRequest,
};
pub use config::CameraConfig;
pub use errors::{CameraError, CameraResult};
