// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "camera-core")]
#[command(about = "Capture frames from cameras through the camera core drivers")]
#[command(version = env!("GIT_VERSION"))]
struct Cli {
    /// Driver(s) to use, comma separated (overrides config and CAMERA_DRIVER)
    #[arg(short, long, global = true)]
    driver: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the drivers built into this binary
    Drivers,

    /// List available cameras
    List,

    /// Save a single frame as PNG
    Snapshot {
        /// Camera index to use (from 'camera-core list')
        #[arg(short, long, default_value = "0")]
        camera: usize,

        /// Requested size, e.g. 1280x720
        #[arg(short, long)]
        size: Option<String>,

        /// Output file path (default: ~/Pictures/camera-core/snapshot_TIMESTAMP.png)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Stream frames and print statistics
    Stream {
        /// Camera index to use (from 'camera-core list')
        #[arg(short, long, default_value = "0")]
        camera: usize,

        /// Requested size, e.g. 640x480
        #[arg(short, long)]
        size: Option<String>,

        /// Requested pixel format, e.g. NV12 or RGBA
        #[arg(short, long)]
        format: Option<String>,

        /// Seconds to stream for, 0 streams until Ctrl+C
        #[arg(short = 't', long, default_value = "10")]
        duration: u64,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=camera_core=trace, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let mut config = camera_core::CameraConfig::load();
    if let Some(driver) = cli.driver {
        config.driver = Some(driver);
    }

    match cli.command {
        Commands::Drivers => cli::list_drivers(config),
        Commands::List => cli::list_cameras(config),
        Commands::Snapshot {
            camera,
            size,
            output,
        } => cli::snapshot(config, camera, size.as_deref(), output),
        Commands::Stream {
            camera,
            size,
            format,
            duration,
        } => cli::stream(config, camera, size.as_deref(), format.as_deref(), duration),
    }
}
