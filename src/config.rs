// SPDX-License-Identifier: GPL-3.0-only

use crate::constants;
use crate::errors::CameraResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Camera subsystem configuration
///
/// Stored as JSON under the user config directory. Missing fields take
/// their defaults so older files keep loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Comma separated driver names to try, in order (e.g. "v4l2,dummy")
    pub driver: Option<String>,
    /// Frame buffers per open camera
    pub buffer_count: usize,
    /// Frames discarded after streaming starts
    pub drop_initial_frames: u32,
    /// Longest a backend wait blocks before checking for shutdown
    pub wait_poll_interval_ms: u64,
    /// Cameras registered by the test pattern driver
    pub pattern_devices: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            driver: None,
            buffer_count: constants::DEFAULT_BUFFER_COUNT,
            drop_initial_frames: constants::DEFAULT_DROP_FRAMES,
            wait_poll_interval_ms: constants::DEFAULT_WAIT_POLL_INTERVAL.as_millis() as u64,
            pattern_devices: constants::pattern::DEFAULT_DEVICE_COUNT,
        }
    }
}

impl CameraConfig {
    /// Default location of the config file, if the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| {
            dir.join(constants::config::DIR_NAME)
                .join(constants::config::FILE_NAME)
        })
    }

    /// Load from the default location, then apply the environment
    ///
    /// A missing or unreadable file yields the defaults; this never fails.
    pub fn load() -> Self {
        let mut config = match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable camera config");
                Self::default()
            }),
            _ => Self::default(),
        };
        config.apply_env();
        config
    }

    /// Read a config file
    pub fn load_from(path: &Path) -> CameraResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        debug!(path = %path.display(), "Loaded camera config");
        Ok(config.sanitized())
    }

    /// Write a config file, creating its directory if needed
    pub fn save_to(&self, path: &Path) -> CameraResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        debug!(path = %path.display(), "Saved camera config");
        Ok(())
    }

    /// Let the driver environment variable override the driver hint
    pub fn apply_env(&mut self) {
        self.apply_driver_override(std::env::var(constants::DRIVER_ENV_VAR).ok());
    }

    fn apply_driver_override(&mut self, value: Option<String>) {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            debug!(driver = %value, "Driver hint from environment");
            self.driver = Some(value);
        }
    }

    pub fn wait_poll_interval(&self) -> Duration {
        Duration::from_millis(self.wait_poll_interval_ms.max(1))
    }

    /// Clamp values that would make the subsystem unusable
    fn sanitized(mut self) -> Self {
        if self.buffer_count == 0 {
            warn!("buffer_count of 0 in camera config, using default");
            self.buffer_count = constants::DEFAULT_BUFFER_COUNT;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_override_replaces_hint() {
        let mut config = CameraConfig {
            driver: Some("dummy".to_string()),
            ..CameraConfig::default()
        };
        config.apply_driver_override(Some("pattern".to_string()));
        assert_eq!(config.driver.as_deref(), Some("pattern"));

        // Blank values are ignored
        config.apply_driver_override(Some("  ".to_string()));
        assert_eq!(config.driver.as_deref(), Some("pattern"));
        config.apply_driver_override(None);
        assert_eq!(config.driver.as_deref(), Some("pattern"));
    }

    #[test]
    fn test_sanitized_fixes_zero_buffers() {
        let config = CameraConfig {
            buffer_count: 0,
            ..CameraConfig::default()
        }
        .sanitized();
        assert_eq!(config.buffer_count, constants::DEFAULT_BUFFER_COUNT);
    }

    #[test]
    fn test_wait_poll_interval_never_zero() {
        let config = CameraConfig {
            wait_poll_interval_ms: 0,
            ..CameraConfig::default()
        };
        assert_eq!(config.wait_poll_interval(), Duration::from_millis(1));
    }
}
