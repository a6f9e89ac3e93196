// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 device discovery and format enumeration

use crate::backends::camera::types::{CameraSpec, Framerate, PixelFormat};
use crate::constants::v4l2::{DEVICE_PREFIX, STEPWISE_SIZES};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use v4l::capability::Flags;
use v4l::frameinterval::FrameIntervalEnum;
use v4l::framesize::FrameSizeEnum;
use v4l::video::Capture;
use v4l::{Device, FourCC};

/// A capture device found on the system
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub path: PathBuf,
    pub card: String,
    pub driver: String,
    pub specs: Vec<CameraSpec>,
}

/// `/dev/video*` nodes, sorted by name
pub fn scan_nodes() -> Vec<PathBuf> {
    let mut nodes: Vec<PathBuf> = std::fs::read_dir("/dev")
        .into_iter()
        .flatten()
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(DEVICE_PREFIX))
        })
        .collect();
    nodes.sort();
    nodes
}

/// Open `path` and list what it can capture
///
/// `None` for nodes that aren't video capture devices (metadata nodes,
/// encoders) or that expose no format this crate understands.
pub fn inspect_node(path: &Path) -> Option<NodeInfo> {
    let dev = Device::with_path(path).ok()?;
    let caps = dev.query_caps().ok()?;
    if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
        trace!(path = %path.display(), "Not a capture node");
        return None;
    }

    let specs = enumerate_specs(&dev);
    if specs.is_empty() {
        debug!(path = %path.display(), card = %caps.card, "No usable formats");
        return None;
    }

    Some(NodeInfo {
        path: path.to_path_buf(),
        card: caps.card,
        driver: caps.driver,
        specs,
    })
}

fn enumerate_specs(dev: &Device) -> Vec<CameraSpec> {
    let mut specs = Vec::new();
    for desc in dev.enum_formats().into_iter().flatten() {
        let Some(format) = PixelFormat::from_fourcc(&desc.fourcc.repr) else {
            trace!(fourcc = %desc.fourcc, "Skipping unsupported pixel format");
            continue;
        };

        for size in dev.enum_framesizes(desc.fourcc).into_iter().flatten() {
            match size.size {
                FrameSizeEnum::Discrete(discrete) => {
                    push_sizes(dev, desc.fourcc, format, discrete.width, discrete.height, &mut specs);
                }
                FrameSizeEnum::Stepwise(step) => {
                    for &(width, height) in STEPWISE_SIZES {
                        if (step.min_width..=step.max_width).contains(&width)
                            && (step.min_height..=step.max_height).contains(&height)
                        {
                            push_sizes(dev, desc.fourcc, format, width, height, &mut specs);
                        }
                    }
                }
            }
        }
    }
    specs
}

fn push_sizes(
    dev: &Device,
    fourcc: FourCC,
    format: PixelFormat,
    width: u32,
    height: u32,
    specs: &mut Vec<CameraSpec>,
) {
    let base = CameraSpec::new(format, width, height);
    let rates = framerates(dev, fourcc, width, height);
    if rates.is_empty() {
        specs.push(base);
    } else {
        specs.extend(rates.into_iter().map(|rate| base.with_framerate(rate)));
    }
}

/// Frame rates for one size; intervals are seconds per frame
fn framerates(dev: &Device, fourcc: FourCC, width: u32, height: u32) -> Vec<Framerate> {
    dev.enum_frameintervals(fourcc, width, height)
        .into_iter()
        .flatten()
        .filter_map(|interval| match interval.interval {
            FrameIntervalEnum::Discrete(frac) => interval_to_rate(frac.numerator, frac.denominator),
            // Fastest end of the range
            FrameIntervalEnum::Stepwise(step) => {
                interval_to_rate(step.min.numerator, step.min.denominator)
            }
        })
        .collect()
}

fn interval_to_rate(numerator: u32, denominator: u32) -> Option<Framerate> {
    (numerator > 0 && denominator > 0).then(|| Framerate::new(denominator, numerator))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_to_rate() {
        assert_eq!(interval_to_rate(1, 30), Some(Framerate::new(30, 1)));
        assert_eq!(interval_to_rate(1001, 30000), Some(Framerate::new(30000, 1001)));
        assert_eq!(interval_to_rate(0, 30), None);
        assert_eq!(interval_to_rate(1, 0), None);
    }

    #[test]
    fn test_scan_nodes_only_lists_video_nodes() {
        for node in scan_nodes() {
            let name = node.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            assert!(name.starts_with("video"));
        }
    }
}
