// SPDX-License-Identifier: GPL-3.0-only
//! Pixel format conversion and scaling
//!
//! CPU converters used by the capture loop when the application asks for a
//! format or size the hardware doesn't produce. Any uncompressed format can
//! be converted to the packed RGB family or to grayscale, and every
//! uncompressed format can be resampled (nearest neighbour). Compressed
//! formats pass through untouched only.
//!
//! Output buffers are always tightly packed.

use super::types::PixelFormat;

/// Borrowed view of a frame's pixels
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    pub data: &'a [u8],
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    /// Row pitch in bytes, 0 means tightly packed
    pub stride: u32,
}

impl<'a> FrameView<'a> {
    pub fn new(data: &'a [u8], format: PixelFormat, width: u32, height: u32, stride: u32) -> Self {
        Self {
            data,
            format,
            width,
            height,
            stride,
        }
    }

    fn pitch(&self) -> usize {
        if self.stride == 0 {
            self.format.default_stride(self.width) as usize
        } else {
            self.stride as usize
        }
    }
}

/// Whether `convert` can turn `src` into `dst`
pub fn can_convert(src: PixelFormat, dst: PixelFormat) -> bool {
    if src.is_compressed() || dst.is_compressed() {
        return false;
    }
    src == dst || dst.packed_bytes_per_pixel().is_some()
}

/// Whether `scale` can resample frames of this format
pub fn can_scale(format: PixelFormat) -> bool {
    !format.is_compressed()
}

/// Convert `src` into `dst_format` at the same size
///
/// Returns the row stride of the written frame.
pub fn convert(src: &FrameView<'_>, dst_format: PixelFormat, dst: &mut Vec<u8>) -> Result<u32, String> {
    if !can_convert(src.format, dst_format) {
        return Err(format!("cannot convert {} to {}", src.format, dst_format));
    }
    if src.format == dst_format {
        return scale(src, src.width, src.height, dst);
    }

    let reader = Reader::new(src)?;
    let (w, h) = (src.width as usize, src.height as usize);
    let Some(bpp) = dst_format.packed_bytes_per_pixel() else {
        return Err(format!("unsupported output format {}", dst_format));
    };
    let len = dst_format
        .frame_len(src.width, src.height)
        .ok_or_else(|| "frame too large".to_string())?;
    prepare(dst, len)?;

    for y in 0..h {
        let row = &mut dst[y * w * bpp..(y + 1) * w * bpp];
        for (x, out) in row.chunks_exact_mut(bpp).enumerate() {
            write_sample(reader.sample(x, y), dst_format, out);
        }
    }

    Ok(dst_format.default_stride(src.width))
}

/// Resample `src` to `dst_width` x `dst_height` keeping its format
///
/// Returns the row stride of the written frame.
pub fn scale(
    src: &FrameView<'_>,
    dst_width: u32,
    dst_height: u32,
    dst: &mut Vec<u8>,
) -> Result<u32, String> {
    if !can_scale(src.format) {
        return Err(format!("cannot scale {}", src.format));
    }
    if dst_width == 0 || dst_height == 0 {
        return Err("zero sized output".to_string());
    }

    let format = src.format;
    let len = format
        .frame_len(dst_width, dst_height)
        .ok_or_else(|| "frame too large".to_string())?;
    check_len(src)?;
    prepare(dst, len)?;

    let (sw, sh) = (src.width as usize, src.height as usize);
    let (dw, dh) = (dst_width as usize, dst_height as usize);
    let pitch = src.pitch();

    if let Some(bpp) = format.packed_bytes_per_pixel() {
        for y in 0..dh {
            let src_row = &src.data[map(y, dh, sh) * pitch..];
            let dst_row = &mut dst[y * dw * bpp..(y + 1) * dw * bpp];
            for (x, out) in dst_row.chunks_exact_mut(bpp).enumerate() {
                let sx = map(x, dw, sw) * bpp;
                out.copy_from_slice(&src_row[sx..sx + bpp]);
            }
        }
    } else if format.is_packed_422() {
        // Resample whole macropixels so chroma stays paired with its luma
        let (smw, dmw) = (sw.div_ceil(2), dw.div_ceil(2));
        for y in 0..dh {
            let src_row = &src.data[map(y, dh, sh) * pitch..];
            let dst_row = &mut dst[y * dmw * 4..(y + 1) * dmw * 4];
            for (mx, out) in dst_row.chunks_exact_mut(4).enumerate() {
                let sm = map(mx, dmw, smw) * 4;
                out.copy_from_slice(&src_row[sm..sm + 4]);
            }
        }
    } else {
        let src_layout = PlanarLayout::new(format, src.width, src.height, pitch);
        let dst_layout = PlanarLayout::new(format, dst_width, dst_height, dw);
        for y in 0..dh {
            let sy = map(y, dh, sh);
            for x in 0..dw {
                dst[y * dw + x] = src.data[sy * pitch + map(x, dw, sw)];
            }
        }
        let (scw, sch) = (sw.div_ceil(2), sh.div_ceil(2));
        let (dcw, dch) = (dw.div_ceil(2), dh.div_ceil(2));
        for cy in 0..dch {
            let scy = map(cy, dch, sch);
            for cx in 0..dcw {
                let scx = map(cx, dcw, scw);
                let (su, sv) = src_layout.chroma_offsets(scx, scy);
                let (du, dv) = dst_layout.chroma_offsets(cx, cy);
                dst[du] = src.data[su];
                dst[dv] = src.data[sv];
            }
        }
    }

    Ok(format.default_stride(dst_width))
}

fn map(dst: usize, dst_len: usize, src_len: usize) -> usize {
    ((dst as u64 * src_len as u64) / dst_len as u64) as usize
}

fn prepare(dst: &mut Vec<u8>, len: usize) -> Result<(), String> {
    dst.clear();
    dst.try_reserve_exact(len)
        .map_err(|e| format!("allocation of {} bytes failed: {}", len, e))?;
    dst.resize(len, 0);
    Ok(())
}

fn check_len(src: &FrameView<'_>) -> Result<(), String> {
    let required = required_len(src);
    if src.data.len() < required {
        return Err(format!(
            "{} frame {}x{} needs {} bytes, got {}",
            src.format,
            src.width,
            src.height,
            required,
            src.data.len()
        ));
    }
    Ok(())
}

fn required_len(src: &FrameView<'_>) -> usize {
    let (w, h) = (src.width as usize, src.height as usize);
    if w == 0 || h == 0 {
        return 0;
    }
    let pitch = src.pitch();
    if let Some(bpp) = src.format.packed_bytes_per_pixel() {
        pitch * (h - 1) + w * bpp
    } else if src.format.is_packed_422() {
        pitch * (h - 1) + w.div_ceil(2) * 4
    } else if src.format.is_planar_420() {
        let layout = PlanarLayout::new(src.format, src.width, src.height, pitch);
        let (u, v) = layout.chroma_offsets(w.div_ceil(2) - 1, h.div_ceil(2) - 1);
        u.max(v) + 1
    } else {
        0
    }
}

/// Byte layout of a 4:2:0 frame
#[derive(Debug, Clone, Copy)]
struct PlanarLayout {
    chroma_pitch: usize,
    u_offset: usize,
    v_offset: usize,
    step: usize,
}

impl PlanarLayout {
    fn new(format: PixelFormat, width: u32, height: u32, pitch: usize) -> Self {
        let cw = (width as usize).div_ceil(2);
        let ch = (height as usize).div_ceil(2);
        let base = pitch * height as usize;
        match format {
            PixelFormat::Nv12 | PixelFormat::Nv21 => {
                let chroma_pitch = pitch.max(cw * 2);
                let (u_offset, v_offset) = if format == PixelFormat::Nv12 {
                    (base, base + 1)
                } else {
                    (base + 1, base)
                };
                Self {
                    chroma_pitch,
                    u_offset,
                    v_offset,
                    step: 2,
                }
            }
            _ => {
                let chroma_pitch = pitch.div_ceil(2).max(cw);
                let plane = chroma_pitch * ch;
                let (u_offset, v_offset) = if format == PixelFormat::Yv12 {
                    (base + plane, base)
                } else {
                    (base, base + plane)
                };
                Self {
                    chroma_pitch,
                    u_offset,
                    v_offset,
                    step: 1,
                }
            }
        }
    }

    fn chroma_offsets(&self, cx: usize, cy: usize) -> (usize, usize) {
        let row = cy * self.chroma_pitch + cx * self.step;
        (self.u_offset + row, self.v_offset + row)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Sample {
    Rgb(u8, u8, u8, u8),
    Yuv(u8, u8, u8),
}

/// Per-pixel reader over any uncompressed source layout
struct Reader<'a> {
    view: &'a FrameView<'a>,
    pitch: usize,
    planar: Option<PlanarLayout>,
}

impl<'a> Reader<'a> {
    fn new(view: &'a FrameView<'a>) -> Result<Self, String> {
        if view.format.is_compressed() {
            return Err(format!("cannot read {} pixels", view.format));
        }
        check_len(view)?;
        let pitch = view.pitch();
        let planar = view
            .format
            .is_planar_420()
            .then(|| PlanarLayout::new(view.format, view.width, view.height, pitch));
        Ok(Self {
            view,
            pitch,
            planar,
        })
    }

    fn sample(&self, x: usize, y: usize) -> Sample {
        let data = self.view.data;
        let row = y * self.pitch;
        match self.view.format {
            PixelFormat::Rgb24 => {
                let p = row + x * 3;
                Sample::Rgb(data[p], data[p + 1], data[p + 2], 255)
            }
            PixelFormat::Bgr24 => {
                let p = row + x * 3;
                Sample::Rgb(data[p + 2], data[p + 1], data[p], 255)
            }
            PixelFormat::Rgba32 => {
                let p = row + x * 4;
                Sample::Rgb(data[p], data[p + 1], data[p + 2], data[p + 3])
            }
            PixelFormat::Bgra32 => {
                let p = row + x * 4;
                Sample::Rgb(data[p + 2], data[p + 1], data[p], data[p + 3])
            }
            PixelFormat::Gray8 => {
                let g = data[row + x];
                Sample::Rgb(g, g, g, 255)
            }
            PixelFormat::Yuyv | PixelFormat::Uyvy | PixelFormat::Yvyu => {
                let p = row + (x / 2) * 4;
                let m = &data[p..p + 4];
                let odd = x % 2 == 1;
                match self.view.format {
                    // Y0 U Y1 V
                    PixelFormat::Yuyv => Sample::Yuv(if odd { m[2] } else { m[0] }, m[1], m[3]),
                    // U Y0 V Y1
                    PixelFormat::Uyvy => Sample::Yuv(if odd { m[3] } else { m[1] }, m[0], m[2]),
                    // Y0 V Y1 U
                    _ => Sample::Yuv(if odd { m[2] } else { m[0] }, m[3], m[1]),
                }
            }
            PixelFormat::Nv12 | PixelFormat::Nv21 | PixelFormat::I420 | PixelFormat::Yv12 => {
                let luma = data[row + x];
                let (u, v) = match &self.planar {
                    Some(layout) => {
                        let (u, v) = layout.chroma_offsets(x / 2, y / 2);
                        (data[u], data[v])
                    }
                    None => (128, 128),
                };
                Sample::Yuv(luma, u, v)
            }
            PixelFormat::Mjpeg => Sample::Rgb(0, 0, 0, 255),
        }
    }
}

/// YUV to RGB conversion (BT.601)
#[inline]
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;
    let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
    let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
    let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
    (r, g, b)
}

/// RGB to luma (BT.601)
#[inline]
fn rgb_to_luma(r: u8, g: u8, b: u8) -> u8 {
    (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32)
        .round()
        .clamp(0.0, 255.0) as u8
}

fn write_sample(sample: Sample, format: PixelFormat, out: &mut [u8]) {
    let (r, g, b, a) = match sample {
        Sample::Rgb(r, g, b, a) => (r, g, b, a),
        Sample::Yuv(y, _, _) if format == PixelFormat::Gray8 => {
            out[0] = y;
            return;
        }
        Sample::Yuv(y, u, v) => {
            let (r, g, b) = yuv_to_rgb(y, u, v);
            (r, g, b, 255)
        }
    };
    match format {
        PixelFormat::Rgb24 => out.copy_from_slice(&[r, g, b]),
        PixelFormat::Bgr24 => out.copy_from_slice(&[b, g, r]),
        PixelFormat::Rgba32 => out.copy_from_slice(&[r, g, b, a]),
        PixelFormat::Bgra32 => out.copy_from_slice(&[b, g, r, a]),
        PixelFormat::Gray8 => out[0] = rgb_to_luma(r, g, b),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_black_to_rgba() {
        // Y=16 is video black, neutral chroma
        let data = [16u8, 128, 16, 128].repeat(2);
        let view = FrameView::new(&data, PixelFormat::Yuyv, 2, 2, 0);
        let mut out = Vec::new();
        let stride = convert(&view, PixelFormat::Rgba32, &mut out).unwrap();
        assert_eq!(stride, 8);
        assert_eq!(out.len(), 16);
        for px in out.chunks_exact(4) {
            assert_eq!(px, &[16, 16, 16, 255]);
        }
    }

    #[test]
    fn test_uyvy_reads_correct_luma() {
        let data = [128u8, 50, 128, 200];
        let view = FrameView::new(&data, PixelFormat::Uyvy, 2, 1, 0);
        let mut out = Vec::new();
        convert(&view, PixelFormat::Gray8, &mut out).unwrap();
        assert_eq!(out, vec![50, 200]);
    }

    #[test]
    fn test_nv12_to_rgb_neutral() {
        let mut data = vec![100u8; 4 * 2];
        data.extend_from_slice(&[128, 128, 128, 128]);
        let view = FrameView::new(&data, PixelFormat::Nv12, 4, 2, 0);
        let mut out = Vec::new();
        convert(&view, PixelFormat::Rgb24, &mut out).unwrap();
        assert!(out.iter().all(|&b| b == 100));
    }

    #[test]
    fn test_bgra_to_rgba_swaps() {
        let data = [1u8, 2, 3, 4];
        let view = FrameView::new(&data, PixelFormat::Bgra32, 1, 1, 0);
        let mut out = Vec::new();
        convert(&view, PixelFormat::Rgba32, &mut out).unwrap();
        assert_eq!(out, vec![3, 2, 1, 4]);
    }

    #[test]
    fn test_padded_stride_respected() {
        // 2x2 RGB24 with 2 bytes of padding per row
        let data = [
            1u8, 1, 1, 2, 2, 2, 0xEE, 0xEE, //
            3, 3, 3, 4, 4, 4, 0xEE, 0xEE,
        ];
        let view = FrameView::new(&data, PixelFormat::Rgb24, 2, 2, 8);
        let mut out = Vec::new();
        convert(&view, PixelFormat::Gray8, &mut out).unwrap();
        assert_eq!(out, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_short_buffer_rejected() {
        let data = [0u8; 10];
        let view = FrameView::new(&data, PixelFormat::Rgba32, 4, 4, 0);
        let mut out = Vec::new();
        assert!(convert(&view, PixelFormat::Rgb24, &mut out).is_err());
        assert!(scale(&view, 2, 2, &mut out).is_err());
    }

    #[test]
    fn test_mjpeg_unsupported() {
        assert!(!can_convert(PixelFormat::Mjpeg, PixelFormat::Rgba32));
        assert!(!can_convert(PixelFormat::Yuyv, PixelFormat::Mjpeg));
        assert!(!can_scale(PixelFormat::Mjpeg));
        assert!(!can_convert(PixelFormat::Rgba32, PixelFormat::Nv12));
        assert!(can_convert(PixelFormat::Nv12, PixelFormat::Nv12));
    }

    #[test]
    fn test_downscale_gray() {
        let data: Vec<u8> = (0..16).collect();
        let view = FrameView::new(&data, PixelFormat::Gray8, 4, 4, 0);
        let mut out = Vec::new();
        let stride = scale(&view, 2, 2, &mut out).unwrap();
        assert_eq!(stride, 2);
        assert_eq!(out, vec![0, 2, 8, 10]);
    }

    #[test]
    fn test_upscale_yuyv_keeps_macropixels() {
        let data = [10u8, 20, 30, 40];
        let view = FrameView::new(&data, PixelFormat::Yuyv, 2, 1, 0);
        let mut out = Vec::new();
        scale(&view, 4, 2, &mut out).unwrap();
        assert_eq!(out.len(), PixelFormat::Yuyv.frame_len(4, 2).unwrap());
        for m in out.chunks_exact(4) {
            assert_eq!(m, &[10, 20, 30, 40]);
        }
    }

    #[test]
    fn test_scale_i420_output_layout() {
        // 2x2 I420: Y plane then one U and one V sample
        let data = [1u8, 2, 3, 4, 50, 60];
        let view = FrameView::new(&data, PixelFormat::I420, 2, 2, 0);
        let mut out = Vec::new();
        scale(&view, 4, 4, &mut out).unwrap();
        assert_eq!(out.len(), 16 + 4 + 4);
        assert!(out[16..20].iter().all(|&u| u == 50));
        assert!(out[20..24].iter().all(|&v| v == 60));
    }

    #[test]
    fn test_scale_nv21_keeps_chroma_order() {
        let data = [9u8, 9, 9, 9, 70, 80];
        let view = FrameView::new(&data, PixelFormat::Nv21, 2, 2, 0);
        let mut out = Vec::new();
        scale(&view, 2, 2, &mut out).unwrap();
        assert_eq!(out, data.to_vec());
    }
}
