// SPDX-License-Identifier: GPL-3.0-only

//! Backend abstraction layer for camera capture
//!
//! # Modules
//!
//! - [`camera`]: Camera drivers, device registry and frame capture

pub mod camera;
