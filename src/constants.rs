// SPDX-License-Identifier: GPL-3.0-only

//! Crate-wide constants

use std::time::Duration;

/// Frame buffers per open camera
pub const DEFAULT_BUFFER_COUNT: usize = 8;

/// Frames discarded after a camera starts streaming
///
/// The first frame after stream-on is often garbage (half exposed, stale
/// contents from the previous session).
pub const DEFAULT_DROP_FRAMES: u32 = 1;

/// Upper bound on how long a backend wait may block before re-checking
/// for shutdown
pub const DEFAULT_WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Frame period used when the negotiated spec has no framerate
pub const DEFAULT_FRAME_PERIOD: Duration = Duration::from_nanos(1_000_000_000 / 30);

/// Capture threads are named `<prefix><device id>`
pub const CAPTURE_THREAD_PREFIX: &str = "camera-";

/// Environment variable overriding the driver choice
pub const DRIVER_ENV_VAR: &str = "CAMERA_DRIVER";

/// Configuration file location under the user config directory
pub mod config {
    /// Directory name
    pub const DIR_NAME: &str = "camera-core";

    /// File name
    pub const FILE_NAME: &str = "config.json";
}

/// Synthetic pattern driver
pub mod pattern {
    use std::time::Duration;

    /// Devices registered at startup
    pub const DEFAULT_DEVICE_COUNT: u32 = 1;

    /// Upper bound on devices the pattern driver will register
    pub const MAX_DEVICE_COUNT: u32 = 16;

    /// Sizes offered by every pattern device
    pub const RESOLUTIONS: &[(u32, u32)] = &[(1280, 720), (640, 480), (320, 240)];

    /// Framerates offered by every pattern device
    pub const FRAMERATES: &[u32] = &[30, 15];

    /// Pause between frames when the negotiated spec has no framerate
    pub const IDLE_PERIOD: Duration = Duration::from_millis(33);
}

/// V4L2 driver
pub mod v4l2 {
    /// Kernel buffers queued for streaming
    pub const STREAM_BUFFERS: u32 = 4;

    /// Device node prefix under /dev
    pub const DEVICE_PREFIX: &str = "video";

    /// Common sizes tried when a device reports a stepwise size range
    pub const STEPWISE_SIZES: &[(u32, u32)] = &[
        (3840, 2160),
        (1920, 1080),
        (1280, 720),
        (640, 480),
        (320, 240),
    ];
}
