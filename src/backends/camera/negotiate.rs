// SPDX-License-Identifier: GPL-3.0-only

//! Capture format negotiation
//!
//! Picks the supported spec closest to what the application asked for.
//! An exact size is preferred even if that means converting pixel formats,
//! since conversion is usually lossless and cheaper than scaling. Failing
//! that the size with the closest aspect ratio wins, then the closest width.

use super::types::{CameraSpec, SpecRequest};

const ASPECT_EPSILON: f64 = 1e-6;

/// Choose the closest supported spec for `request`
///
/// `specs` must already be in rank order (see [`super::types::sort_and_dedup`]).
/// The result is always an element of `specs`, except when the list is empty:
/// then the request itself is returned if it names a format and a size.
/// Ties resolve to the earlier, better ranked entry.
pub fn choose(specs: &[CameraSpec], request: Option<&SpecRequest>) -> Option<CameraSpec> {
    let Some(request) = request else {
        return specs.first().copied();
    };
    if specs.is_empty() {
        return request.to_spec();
    }

    let (width, height) = closest_resolution(specs, request);

    // The list is ranked, so the first entry at this size is the best format
    // unless an exact match turns up later.
    let mut format = None;
    for spec in specs.iter().filter(|s| s.width == width && s.height == height) {
        if format.is_none() {
            format = Some(spec.format);
        }
        if Some(spec.format) == request.format {
            format = Some(spec.format);
            break;
        }
    }
    let format = format?;

    let want_fps = request.framerate.map(|f| f.as_f64()).unwrap_or(0.0);
    let mut best: Option<(f64, &CameraSpec)> = None;
    for spec in specs
        .iter()
        .filter(|s| s.width == width && s.height == height && s.format == format)
    {
        if spec.framerate == request.framerate {
            best = Some((0.0, spec));
            break;
        }
        let diff = (want_fps - spec.fps()).abs();
        if best.is_none_or(|(closest, _)| diff < closest) {
            best = Some((diff, spec));
        }
    }

    best.map(|(_, spec)| *spec)
}

fn closest_resolution(specs: &[CameraSpec], request: &SpecRequest) -> (u32, u32) {
    let Some(size) = request.size.filter(|s| s.width > 0 && s.height > 0) else {
        return (specs[0].width, specs[0].height);
    };

    let want_aspect = size.width as f64 / size.height as f64;
    let mut closest_aspect = f64::NAN;
    let mut closest_aspect_diff = f64::INFINITY;
    let mut closest_width_diff = u32::MAX;
    let mut result = (specs[0].width, specs[0].height);

    for spec in specs {
        let aspect = spec.aspect_ratio();
        let aspect_diff = (want_aspect - aspect).abs();
        let width_diff = spec.width.abs_diff(size.width);

        if (closest_aspect - aspect).abs() < ASPECT_EPSILON {
            // Same aspect as the current pick, keep whichever width is closer
            if width_diff < closest_width_diff {
                closest_width_diff = width_diff;
                result = (spec.width, spec.height);
            }
        } else if aspect_diff < closest_aspect_diff {
            closest_aspect_diff = aspect_diff;
            closest_aspect = aspect;
            closest_width_diff = width_diff;
            result = (spec.width, spec.height);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::{Framerate, PixelFormat, sort_and_dedup};

    fn spec(format: PixelFormat, w: u32, h: u32, fps: Option<u32>) -> CameraSpec {
        let s = CameraSpec::new(format, w, h);
        match fps {
            Some(fps) => s.with_framerate(Framerate::from_int(fps)),
            None => s,
        }
    }

    fn sorted(mut specs: Vec<CameraSpec>) -> Vec<CameraSpec> {
        sort_and_dedup(&mut specs);
        specs
    }

    #[test]
    fn test_empty_list_passes_request_through() {
        let request = SpecRequest::new().format(PixelFormat::Nv12).size(320, 200);
        let chosen = choose(&[], Some(&request)).unwrap();
        assert_eq!(chosen.format, PixelFormat::Nv12);
        assert_eq!((chosen.width, chosen.height), (320, 200));

        assert!(choose(&[], None).is_none());
        assert!(choose(&[], Some(&SpecRequest::new())).is_none());
    }

    #[test]
    fn test_no_request_takes_best_ranked() {
        let specs = sorted(vec![
            spec(PixelFormat::Rgb24, 1920, 1080, Some(30)),
            spec(PixelFormat::Yuyv, 640, 480, Some(30)),
        ]);
        assert_eq!(choose(&specs, None), Some(specs[0]));
        assert_eq!(specs[0].format, PixelFormat::Yuyv);
    }

    #[test]
    fn test_exact_match_on_lower_ranked_format() {
        let fmt_a = PixelFormat::Yuyv;
        let fmt_b = PixelFormat::Rgb24;
        let specs = sorted(vec![
            spec(fmt_a, 1280, 720, Some(30)),
            spec(fmt_a, 640, 480, Some(30)),
            spec(fmt_b, 640, 480, Some(15)),
        ]);
        let request = SpecRequest::new().format(fmt_b).size(640, 480);
        let chosen = choose(&specs, Some(&request)).unwrap();
        assert_eq!(chosen, spec(fmt_b, 640, 480, Some(15)));
    }

    #[test]
    fn test_aspect_ratio_beats_width() {
        let specs = sorted(vec![
            spec(PixelFormat::Yuyv, 1280, 720, None),
            spec(PixelFormat::Yuyv, 800, 600, None),
        ]);
        // 16:9 request; 800x600 is closer in width but 4:3
        let request = SpecRequest::new().size(960, 540);
        let chosen = choose(&specs, Some(&request)).unwrap();
        assert_eq!((chosen.width, chosen.height), (1280, 720));
    }

    #[test]
    fn test_closest_width_within_aspect() {
        let specs = sorted(vec![
            spec(PixelFormat::Yuyv, 1920, 1080, None),
            spec(PixelFormat::Yuyv, 1280, 720, None),
            spec(PixelFormat::Yuyv, 640, 360, None),
        ]);
        let request = SpecRequest::new().size(1100, 619);
        let chosen = choose(&specs, Some(&request)).unwrap();
        assert_eq!((chosen.width, chosen.height), (1280, 720));
    }

    #[test]
    fn test_missing_format_falls_back_to_best_at_size() {
        let specs = sorted(vec![
            spec(PixelFormat::Rgb24, 640, 480, None),
            spec(PixelFormat::Nv12, 640, 480, None),
        ]);
        let request = SpecRequest::new().format(PixelFormat::Gray8).size(640, 480);
        let chosen = choose(&specs, Some(&request)).unwrap();
        assert_eq!(chosen.format, PixelFormat::Nv12);
    }

    #[test]
    fn test_closest_framerate() {
        let specs = sorted(vec![
            spec(PixelFormat::Yuyv, 640, 480, Some(60)),
            spec(PixelFormat::Yuyv, 640, 480, Some(30)),
            spec(PixelFormat::Yuyv, 640, 480, Some(15)),
        ]);
        let request = SpecRequest::new()
            .size(640, 480)
            .framerate(Framerate::from_int(24));
        let chosen = choose(&specs, Some(&request)).unwrap();
        assert_eq!(chosen.framerate, Some(Framerate::from_int(30)));

        let exact = SpecRequest::new()
            .size(640, 480)
            .framerate(Framerate::from_int(15));
        let chosen = choose(&specs, Some(&exact)).unwrap();
        assert_eq!(chosen.framerate, Some(Framerate::from_int(15)));
    }

    #[test]
    fn test_unspecified_framerate_prefers_slowest_known() {
        // No rate means "0 fps", so the smallest rate is the closest
        let specs = sorted(vec![
            spec(PixelFormat::Yuyv, 640, 480, Some(60)),
            spec(PixelFormat::Yuyv, 640, 480, Some(5)),
        ]);
        let request = SpecRequest::new().size(640, 480);
        let chosen = choose(&specs, Some(&request)).unwrap();
        assert_eq!(chosen.framerate, Some(Framerate::from_int(5)));
    }

    #[test]
    fn test_never_returns_foreign_spec() {
        let specs = sorted(vec![
            spec(PixelFormat::Yuyv, 1920, 1080, Some(30)),
            spec(PixelFormat::Yuyv, 1280, 720, Some(60)),
            spec(PixelFormat::Nv12, 1280, 720, Some(30)),
            spec(PixelFormat::Mjpeg, 640, 480, Some(30)),
            spec(PixelFormat::Rgb24, 320, 240, None),
            spec(PixelFormat::Gray8, 160, 120, Some(10)),
        ]);
        let formats = [None, Some(PixelFormat::Nv12), Some(PixelFormat::Bgra32)];
        for w in (16..=2048).step_by(97) {
            for h in (16..=2048).step_by(113) {
                for format in formats {
                    let mut request = SpecRequest::new().size(w, h);
                    request.format = format;
                    let chosen = choose(&specs, Some(&request)).unwrap();
                    assert!(specs.contains(&chosen), "{} not in list", chosen);
                }
            }
        }
    }
}
