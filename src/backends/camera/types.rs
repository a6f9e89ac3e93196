// SPDX-License-Identifier: GPL-3.0-only
// Shared types for camera backend abstraction

//! Shared types for camera backends
//!
//! Value types describing capture formats ([`CameraSpec`]), the pixel data
//! exchanged between backends and the core ([`FrameData`]), and the frames
//! handed to applications ([`CameraFrame`]).

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

/// Process-unique camera device identifier
///
/// Identifiers start at 1 and are never reused while the process runs,
/// so a stale identifier can never alias a newer device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub(crate) u32);

impl DeviceId {
    /// Raw numeric value
    pub fn get(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Physical mounting position of a camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CameraPosition {
    #[default]
    Unknown,
    FrontFacing,
    BackFacing,
}

impl std::fmt::Display for CameraPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraPosition::Unknown => write!(f, "unknown position"),
            CameraPosition::FrontFacing => write!(f, "front-facing"),
            CameraPosition::BackFacing => write!(f, "back-facing"),
        }
    }
}

/// Access permission for a device
///
/// Some platforms ask the user before a camera may stream. The state starts
/// out `Pending` on every open and settles on `Approved` or `Denied` when the
/// backend reports the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PermissionState {
    #[default]
    Pending,
    Approved,
    Denied,
}

impl PermissionState {
    pub(crate) fn from_raw(raw: i8) -> Self {
        match raw.signum() {
            1 => PermissionState::Approved,
            -1 => PermissionState::Denied,
            _ => PermissionState::Pending,
        }
    }

    pub(crate) fn as_raw(self) -> i8 {
        match self {
            PermissionState::Pending => 0,
            PermissionState::Approved => 1,
            PermissionState::Denied => -1,
        }
    }
}

impl std::fmt::Display for PermissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionState::Pending => write!(f, "pending"),
            PermissionState::Approved => write!(f, "approved"),
            PermissionState::Denied => write!(f, "denied"),
        }
    }
}

/// Framerate as a fraction (numerator/denominator)
/// Stores exact framerate to handle NTSC rates like 59.94fps (60000/1001)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Framerate {
    pub num: u32,
    pub denom: u32,
}

impl Framerate {
    /// Create a new framerate from numerator and denominator
    pub fn new(num: u32, denom: u32) -> Self {
        Self {
            num,
            denom: if denom == 0 { 1 } else { denom },
        }
    }

    /// Create a framerate from an integer (e.g., 30 becomes 30/1)
    pub fn from_int(fps: u32) -> Self {
        Self { num: fps, denom: 1 }
    }

    /// Get the framerate as a floating point value
    pub fn as_f64(&self) -> f64 {
        if self.denom == 0 {
            return 0.0;
        }
        self.num as f64 / self.denom as f64
    }

    /// Duration of a single frame, `None` for a zero rate
    pub fn frame_period(&self) -> Option<Duration> {
        if self.num == 0 {
            return None;
        }
        let nanos = (self.denom as u64).saturating_mul(1_000_000_000) / self.num as u64;
        Some(Duration::from_nanos(nanos))
    }

    /// Exact rate comparison via cross multiplication
    pub fn cmp_rate(&self, other: &Framerate) -> Ordering {
        let lhs = self.num as u64 * other.denom as u64;
        let rhs = other.num as u64 * self.denom as u64;
        lhs.cmp(&rhs)
    }
}

impl std::fmt::Display for Framerate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fps = self.as_f64();
        // Show decimal for non-integer framerates (NTSC)
        if self.denom != 1 {
            write!(f, "{:.2}", fps)
        } else {
            write!(f, "{}", self.num)
        }
    }
}

impl Default for Framerate {
    fn default() -> Self {
        Self { num: 30, denom: 1 }
    }
}

/// Pixel layout of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 24-bit RGB, R G B byte order
    Rgb24,
    /// 24-bit RGB, B G R byte order
    Bgr24,
    /// 32-bit with alpha, R G B A byte order
    Rgba32,
    /// 32-bit with alpha, B G R A byte order
    Bgra32,
    /// 8-bit grayscale
    Gray8,
    /// Packed 4:2:2 (Y0 U Y1 V)
    Yuyv,
    /// Packed 4:2:2 (U Y0 V Y1)
    Uyvy,
    /// Packed 4:2:2 (Y0 V Y1 U)
    Yvyu,
    /// Semi-planar 4:2:0 (Y plane + interleaved UV plane)
    Nv12,
    /// Semi-planar 4:2:0 (Y plane + interleaved VU plane)
    Nv21,
    /// Planar 4:2:0 (Y, U, V planes)
    I420,
    /// Planar 4:2:0 (Y, V, U planes)
    Yv12,
    /// Motion JPEG, variable length compressed frames
    Mjpeg,
}

impl PixelFormat {
    pub const ALL: [PixelFormat; 13] = [
        PixelFormat::Rgb24,
        PixelFormat::Bgr24,
        PixelFormat::Rgba32,
        PixelFormat::Bgra32,
        PixelFormat::Gray8,
        PixelFormat::Yuyv,
        PixelFormat::Uyvy,
        PixelFormat::Yvyu,
        PixelFormat::Nv12,
        PixelFormat::Nv21,
        PixelFormat::I420,
        PixelFormat::Yv12,
        PixelFormat::Mjpeg,
    ];

    /// Four character code of the format
    pub fn fourcc(&self) -> [u8; 4] {
        match self {
            Self::Rgb24 => *b"RGB3",
            Self::Bgr24 => *b"BGR3",
            Self::Rgba32 => *b"AB24",
            Self::Bgra32 => *b"AR24",
            Self::Gray8 => *b"GREY",
            Self::Yuyv => *b"YUYV",
            Self::Uyvy => *b"UYVY",
            Self::Yvyu => *b"YVYU",
            Self::Nv12 => *b"NV12",
            Self::Nv21 => *b"NV21",
            Self::I420 => *b"YU12",
            Self::Yv12 => *b"YV12",
            Self::Mjpeg => *b"MJPG",
        }
    }

    /// Parse a V4L2 four character code
    pub fn from_fourcc(code: &[u8; 4]) -> Option<Self> {
        match code {
            b"RGB3" => Some(Self::Rgb24),
            b"BGR3" => Some(Self::Bgr24),
            b"AB24" => Some(Self::Rgba32),
            b"AR24" => Some(Self::Bgra32),
            b"GREY" => Some(Self::Gray8),
            b"YUYV" => Some(Self::Yuyv),
            b"UYVY" => Some(Self::Uyvy),
            b"YVYU" => Some(Self::Yvyu),
            b"NV12" => Some(Self::Nv12),
            b"NV21" => Some(Self::Nv21),
            b"YU12" => Some(Self::I420),
            b"YV12" => Some(Self::Yv12),
            b"MJPG" => Some(Self::Mjpeg),
            _ => None,
        }
    }

    /// Parse a user supplied name such as "yuyv" or "rgba32"
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|f| f.to_string().to_ascii_lowercase() == lower)
            .or_else(|| {
                let upper = name.trim().to_ascii_uppercase();
                let bytes: [u8; 4] = upper.as_bytes().try_into().ok()?;
                Self::from_fourcc(&bytes)
            })
    }

    /// Numeric code used to break ranking ties
    pub fn code(&self) -> u32 {
        u32::from_le_bytes(self.fourcc())
    }

    /// YUV and compressed formats, described by a FourCC rather than a packed pixel layout
    pub fn is_fourcc(&self) -> bool {
        self.is_yuv() || self.is_compressed()
    }

    pub fn is_yuv(&self) -> bool {
        self.is_packed_422() || self.is_planar_420()
    }

    pub fn is_packed_422(&self) -> bool {
        matches!(self, Self::Yuyv | Self::Uyvy | Self::Yvyu)
    }

    pub fn is_planar_420(&self) -> bool {
        matches!(self, Self::Nv12 | Self::Nv21 | Self::I420 | Self::Yv12)
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self, Self::Mjpeg)
    }

    /// Bits per pixel of the layout (0 for compressed formats)
    pub fn bits_per_pixel(&self) -> u32 {
        match self {
            Self::Rgba32 | Self::Bgra32 => 32,
            Self::Rgb24 | Self::Bgr24 => 24,
            Self::Yuyv | Self::Uyvy | Self::Yvyu => 16,
            Self::Nv12 | Self::Nv21 | Self::I420 | Self::Yv12 => 12,
            Self::Gray8 => 8,
            Self::Mjpeg => 0,
        }
    }

    /// Bytes per pixel for packed RGB and grayscale layouts
    pub fn packed_bytes_per_pixel(&self) -> Option<usize> {
        match self {
            Self::Rgba32 | Self::Bgra32 => Some(4),
            Self::Rgb24 | Self::Bgr24 => Some(3),
            Self::Gray8 => Some(1),
            _ => None,
        }
    }

    /// Row pitch of a tightly packed frame (Y plane pitch for planar formats)
    pub fn default_stride(&self, width: u32) -> u32 {
        match self {
            Self::Yuyv | Self::Uyvy | Self::Yvyu => width.div_ceil(2) * 4,
            Self::Nv12 | Self::Nv21 | Self::I420 | Self::Yv12 | Self::Gray8 => width,
            Self::Rgb24 | Self::Bgr24 => width * 3,
            Self::Rgba32 | Self::Bgra32 => width * 4,
            Self::Mjpeg => 0,
        }
    }

    /// Size in bytes of a tightly packed frame, `None` for compressed formats
    pub fn frame_len(&self, width: u32, height: u32) -> Option<usize> {
        let (w, h) = (width as usize, height as usize);
        match self {
            Self::Nv12 | Self::Nv21 | Self::I420 | Self::Yv12 => {
                let chroma = w.div_ceil(2).checked_mul(h.div_ceil(2))?.checked_mul(2)?;
                w.checked_mul(h)?.checked_add(chroma)
            }
            Self::Mjpeg => None,
            _ => (self.default_stride(width) as usize).checked_mul(h),
        }
    }

    /// Colorspace a backend reports when it doesn't know better
    pub fn default_colorspace(&self) -> Colorspace {
        match self {
            Self::Rgb24 | Self::Bgr24 | Self::Rgba32 | Self::Bgra32 | Self::Gray8 => {
                Colorspace::Srgb
            }
            Self::Mjpeg => Colorspace::Bt601Full,
            _ => Colorspace::Bt601Limited,
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Rgb24 => "RGB24",
            Self::Bgr24 => "BGR24",
            Self::Rgba32 => "RGBA32",
            Self::Bgra32 => "BGRA32",
            Self::Gray8 => "GRAY8",
            Self::Yuyv => "YUYV",
            Self::Uyvy => "UYVY",
            Self::Yvyu => "YVYU",
            Self::Nv12 => "NV12",
            Self::Nv21 => "NV21",
            Self::I420 => "I420",
            Self::Yv12 => "YV12",
            Self::Mjpeg => "MJPEG",
        };
        write!(f, "{}", name)
    }
}

/// Colour encoding of the pixel values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Colorspace {
    #[default]
    Unknown,
    Srgb,
    Bt601Limited,
    Bt601Full,
    Bt709Limited,
    Bt709Full,
    Bt2020Limited,
    Bt2020Full,
}

impl Colorspace {
    pub fn is_full_range(&self) -> bool {
        matches!(
            self,
            Self::Srgb | Self::Bt601Full | Self::Bt709Full | Self::Bt2020Full
        )
    }

    /// Numeric code used to break ranking ties
    pub fn code(&self) -> u32 {
        match self {
            Self::Unknown => 0,
            Self::Srgb => 1,
            Self::Bt601Limited => 2,
            Self::Bt601Full => 3,
            Self::Bt709Limited => 4,
            Self::Bt709Full => 5,
            Self::Bt2020Limited => 6,
            Self::Bt2020Full => 7,
        }
    }
}

/// Width and height in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Capture format descriptor
///
/// Specs are ranked by their total order so that the "best" entry sorts
/// first:
/// 1. YUV/compressed formats before packed RGB layouts
/// 2. more bits per pixel first
/// 3. wider, then taller
/// 4. a known framerate before an unknown one, faster first
/// 5. full range colour before limited range
///
/// Remaining fields break ties so `Ordering::Equal` only holds for equal specs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CameraSpec {
    pub format: PixelFormat,
    pub colorspace: Colorspace,
    pub width: u32,
    pub height: u32,
    pub framerate: Option<Framerate>,
}

impl CameraSpec {
    /// Spec with the format's default colorspace and no framerate
    pub fn new(format: PixelFormat, width: u32, height: u32) -> Self {
        Self {
            format,
            colorspace: format.default_colorspace(),
            width,
            height,
            framerate: None,
        }
    }

    pub fn with_framerate(mut self, framerate: Framerate) -> Self {
        self.framerate = Some(framerate);
        self
    }

    pub fn with_colorspace(mut self, colorspace: Colorspace) -> Self {
        self.colorspace = colorspace;
        self
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Frames per second, 0.0 when unknown
    pub fn fps(&self) -> f64 {
        self.framerate.map(|f| f.as_f64()).unwrap_or(0.0)
    }

    /// Size of a tightly packed frame in this spec
    pub fn frame_len(&self) -> Option<usize> {
        self.format.frame_len(self.width, self.height)
    }

    pub fn default_stride(&self) -> u32 {
        self.format.default_stride(self.width)
    }

    fn rank_bits(&self) -> u32 {
        if self.format.is_fourcc() {
            0
        } else {
            self.format.bits_per_pixel()
        }
    }
}

impl Ord for CameraSpec {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .format
            .is_fourcc()
            .cmp(&self.format.is_fourcc())
            .then_with(|| other.rank_bits().cmp(&self.rank_bits()))
            .then_with(|| other.width.cmp(&self.width))
            .then_with(|| other.height.cmp(&self.height))
            .then_with(|| match (&self.framerate, &other.framerate) {
                (Some(a), Some(b)) => b.cmp_rate(a),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
            .then_with(|| {
                other
                    .colorspace
                    .is_full_range()
                    .cmp(&self.colorspace.is_full_range())
            })
            .then_with(|| self.format.code().cmp(&other.format.code()))
            .then_with(|| self.colorspace.code().cmp(&other.colorspace.code()))
            .then_with(|| {
                let a = self.framerate.map(|f| (f.num, f.denom));
                let b = other.framerate.map(|f| (f.num, f.denom));
                a.cmp(&b)
            })
    }
}

impl PartialOrd for CameraSpec {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for CameraSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(fps) = &self.framerate {
            write!(
                f,
                "{} {}x{} @ {}fps",
                self.format, self.width, self.height, fps
            )
        } else {
            write!(f, "{} {}x{}", self.format, self.width, self.height)
        }
    }
}

/// Sort specs into rank order and drop duplicates
pub fn sort_and_dedup(specs: &mut Vec<CameraSpec>) {
    specs.sort();
    specs.dedup();
}

/// Application request for a capture format
///
/// Every field is optional; fields left out are filled from the closest
/// format the device supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SpecRequest {
    pub format: Option<PixelFormat>,
    pub colorspace: Option<Colorspace>,
    pub size: Option<Resolution>,
    pub framerate: Option<Framerate>,
}

impl SpecRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn format(mut self, format: PixelFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn colorspace(mut self, colorspace: Colorspace) -> Self {
        self.colorspace = Some(colorspace);
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.size = Some(Resolution::new(width, height));
        self
    }

    pub fn framerate(mut self, framerate: Framerate) -> Self {
        self.framerate = Some(framerate);
        self
    }

    /// Full spec when the request names at least a format and a size
    pub fn to_spec(&self) -> Option<CameraSpec> {
        let format = self.format?;
        let size = self.size?;
        Some(CameraSpec {
            format,
            colorspace: self
                .colorspace
                .unwrap_or_else(|| format.default_colorspace()),
            width: size.width,
            height: size.height,
            framerate: self.framerate,
        })
    }
}

impl From<CameraSpec> for SpecRequest {
    fn from(spec: CameraSpec) -> Self {
        Self {
            format: Some(spec.format),
            colorspace: Some(spec.colorspace),
            size: Some(spec.resolution()),
            framerate: spec.framerate,
        }
    }
}

/// Resampling needed between the native capture size and the delivered size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScalingMode {
    Down,
    #[default]
    None,
    Up,
}

/// Pixel buffer owned by a backend
///
/// The core treats the bytes as opaque frame data; `token` lets the backend
/// recognise its own buffer when it is handed back through `release_frame`.
#[derive(Debug, Default)]
pub struct BackendBuffer {
    pub bytes: Vec<u8>,
    pub token: u64,
}

/// Frame pixel storage
///
/// Ownership moves with the frame: from the backend into a pool slot, from
/// the slot to the application and back again, so a buffer is never
/// reachable from two places at once.
#[derive(Default)]
pub enum FrameData {
    /// No pixels attached
    #[default]
    Empty,
    /// Buffer owned by the core (converted or scaled output)
    Owned(Vec<u8>),
    /// Buffer lent by a backend, returned to it on release
    Backend(BackendBuffer),
    /// Shared blank frame served by a disconnected device
    Zombie(Arc<[u8]>),
}

impl FrameData {
    pub fn as_slice(&self) -> &[u8] {
        match self {
            FrameData::Empty => &[],
            FrameData::Owned(bytes) => bytes,
            FrameData::Backend(buffer) => &buffer.bytes,
            FrameData::Zombie(bytes) => bytes,
        }
    }

    /// Get the length of the frame data in bytes
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Check if the frame data is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_zombie(&self) -> bool {
        matches!(self, FrameData::Zombie(_))
    }

    /// Whether the pixels must be handed back to the backend
    pub fn is_backend_owned(&self) -> bool {
        matches!(self, FrameData::Backend(_))
    }
}

impl std::fmt::Debug for FrameData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameData::Empty => write!(f, "FrameData::Empty"),
            FrameData::Owned(data) => write!(f, "FrameData::Owned({} bytes)", data.len()),
            FrameData::Backend(buf) => write!(
                f,
                "FrameData::Backend({} bytes, token {})",
                buf.bytes.len(),
                buf.token
            ),
            FrameData::Zombie(data) => write!(f, "FrameData::Zombie({} bytes)", data.len()),
        }
    }
}

impl AsRef<[u8]> for FrameData {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl std::ops::Deref for FrameData {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

/// Scratch frame a backend fills from `acquire_frame`
#[derive(Debug, Default)]
pub struct AcquiredFrame {
    pub data: FrameData,
    /// Row pitch in bytes, 0 means tightly packed
    pub stride: u32,
    /// Backend clock timestamp in nanoseconds
    pub timestamp_ns: u64,
}

/// Outcome of a non-blocking frame acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireStatus {
    /// A frame was written into the scratch frame
    Ready,
    /// Nothing available yet
    Skip,
    /// The device failed and should be treated as disconnected
    Error,
}

/// A captured frame owned by the application until released
#[derive(Debug)]
pub struct CameraFrame {
    pub device: DeviceId,
    pub(crate) slot: usize,
    pub(crate) session: u64,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub colorspace: Colorspace,
    /// Row stride for the main data (bytes per row, may include padding)
    pub stride: u32,
    /// Presentation timestamp on the process monotonic clock, nanoseconds
    pub timestamp_ns: u64,
    pub data: FrameData,
}

impl CameraFrame {
    pub fn data(&self) -> &[u8] {
        self.data.as_slice()
    }

    pub fn spec(&self) -> CameraSpec {
        CameraSpec {
            format: self.format,
            colorspace: self.colorspace,
            width: self.width,
            height: self.height,
            framerate: None,
        }
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Error types for backend operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Backend is not available on this system
    NotAvailable(String),
    /// Failed to initialize backend
    InitializationFailed(String),
    /// Camera device not found
    DeviceNotFound(String),
    /// Format not supported
    FormatNotSupported(String),
    /// General I/O error
    IoError(String),
    /// Other errors
    Other(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::NotAvailable(msg) => write!(f, "Backend not available: {}", msg),
            BackendError::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            BackendError::DeviceNotFound(msg) => write!(f, "Device not found: {}", msg),
            BackendError::FormatNotSupported(msg) => write!(f, "Format not supported: {}", msg),
            BackendError::IoError(msg) => write!(f, "I/O error: {}", msg),
            BackendError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => BackendError::DeviceNotFound(err.to_string()),
            std::io::ErrorKind::PermissionDenied => {
                BackendError::InitializationFailed(err.to_string())
            }
            _ => BackendError::IoError(err.to_string()),
        }
    }
}
