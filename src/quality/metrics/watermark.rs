//! Watermark heuristic.
//!
//! Two signals, both relative to the image's own texture so that uniformly
//! detailed photos do not trip them:
//!
//! - a corner much busier than the strips next to it, along its own row band
//!   and its own column band (+1 per corner). A detailed foreground under a
//!   smooth sky fills the whole bottom band, so its corners stay quiet;
//! - many diagonal line segments in the central third, the typical stock
//!   watermark band (+2).
//!
//! Two or more indicators flag a watermark; confidence is `indicators / 4`.

use super::{Pixels, edge_density_in, edge_map, require_size};
use crate::config::QualityConfig;
use crate::error::MetricError;
use image::imageops;
use imageproc::hough::{LineDetectionOptions, detect_lines};
use serde::Serialize;

const MIN_VOTES: u32 = 50;
const VOTE_FACTOR: f64 = 2.5;
const SUPPRESSION_RADIUS: u32 = 8;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatermarkMetrics {
    pub has_watermark: bool,
    pub confidence: f64,
    pub indicators: u32,
}

impl WatermarkMetrics {
    pub fn fallback() -> Self {
        Self {
            has_watermark: true,
            confidence: 1.0,
            indicators: 4,
        }
    }
}

pub fn measure(pixels: &Pixels, config: &QualityConfig) -> Result<WatermarkMetrics, MetricError> {
    let (w, h) = pixels.dimensions();
    require_size("watermark", w, h, 8)?;

    let threshold = config.edge_threshold;
    let density = |x0, y0, x1, y1| edge_density_in(&pixels.gradient, threshold, x0, y0, x1, y1);

    let (qw, qh) = (w / 4, h / 4);
    let corners = [
        (0, 0, qw, qh),
        (w - qw, 0, w, qh),
        (0, h - qh, qw, h),
        (w - qw, h - qh, w, h),
    ];
    let mut indicators = corners
        .iter()
        .filter(|&&(x0, y0, x1, y1)| {
            let d = density(x0, y0, x1, y1);
            let row_band = density(qw, y0, w - qw, y1);
            let column_band = density(x0, qh, x1, h - qh);
            d > config.watermark_corner_density
                && d > row_band.max(column_band) * config.watermark_corner_factor
        })
        .count() as u32;

    if diagonal_lines_in_center(pixels, config) >= config.watermark_min_center_lines {
        indicators += 2;
    }

    Ok(WatermarkMetrics {
        has_watermark: indicators >= 2,
        confidence: (indicators as f64 / 4.0).min(1.0),
        indicators,
    })
}

fn diagonal_lines_in_center(pixels: &Pixels, config: &QualityConfig) -> usize {
    let (w, h) = pixels.dimensions();
    let (cx, cy, cw, ch) = (w / 3, h / 3, w / 3, h / 3);
    if cw == 0 || ch == 0 {
        return 0;
    }

    let center = imageops::crop_imm(&pixels.gradient, cx, cy, cw, ch).to_image();
    let edges = edge_map(&center, config.edge_threshold_loose);
    let density = edges.pixels().filter(|p| p[0] > 0).count() as f64 / (cw as f64 * ch as f64);

    // A random line through texture of this density collects about
    // `density * length` votes; demand well above that.
    let short_side = cw.min(ch) as f64;
    let vote_threshold = ((VOTE_FACTOR * density * short_side) as u32).max(MIN_VOTES);

    detect_lines(
        &edges,
        LineDetectionOptions {
            vote_threshold,
            suppression_radius: SUPPRESSION_RADIUS,
        },
    )
    .into_iter()
    .filter(|line| {
        let a = line.angle_in_degrees;
        (20..=70).contains(&a) || (110..=160).contains(&a)
    })
    .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::metrics::fixtures;
    use image::{DynamicImage, Rgb, RgbImage};

    #[test]
    fn test_uniform_noise_has_no_watermark() {
        let px = Pixels::new(&fixtures::noise(300, 240, 9));
        let m = measure(&px, &QualityConfig::default()).unwrap();
        assert!(!m.has_watermark);
        assert_eq!(m.indicators, 0);
        assert_eq!(m.confidence, 0.0);
    }

    #[test]
    fn test_busy_corners_on_flat_background() {
        // Text-like checkerboard in every corner of a plain grey frame.
        let (w, h) = (400, 320);
        let img = RgbImage::from_fn(w, h, |x, y| {
            let in_corner = (x < w / 4 || x >= w - w / 4) && (y < h / 4 || y >= h - h / 4);
            if in_corner && ((x / 3 + y / 3) % 2 == 0) {
                Rgb([255, 255, 255])
            } else {
                Rgb([120, 120, 120])
            }
        });
        let px = Pixels::new(&DynamicImage::ImageRgb8(img));
        let m = measure(&px, &QualityConfig::default()).unwrap();
        assert_eq!(m.indicators, 4);
        assert!(m.has_watermark);
        assert_eq!(m.confidence, 1.0);
    }

    #[test]
    fn test_detailed_foreground_under_sky_is_not_a_watermark() {
        let px = Pixels::new(&fixtures::sky_over_detail(1200, 800, 3));
        let m = measure(&px, &QualityConfig::default()).unwrap();
        assert_eq!(m.indicators, 0);
        assert!(!m.has_watermark);
    }

    #[test]
    fn test_single_busy_corner_is_not_enough() {
        let (w, h) = (400, 320);
        let img = RgbImage::from_fn(w, h, |x, y| {
            if x >= w - w / 4 && y >= h - h / 4 && (x / 3 + y / 3) % 2 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([120, 120, 120])
            }
        });
        let px = Pixels::new(&DynamicImage::ImageRgb8(img));
        let m = measure(&px, &QualityConfig::default()).unwrap();
        assert_eq!(m.indicators, 1);
        assert!(!m.has_watermark);
    }

    #[test]
    fn test_diagonal_band_through_center() {
        let px = Pixels::new(&fixtures::diagonal_strokes(900, 720));
        let config = QualityConfig::default();
        assert!(diagonal_lines_in_center(&px, &config) >= config.watermark_min_center_lines);

        let m = measure(&px, &config).unwrap();
        assert!(m.indicators >= 2);
        assert!(m.has_watermark);
    }

    #[test]
    fn test_flat_image_has_no_watermark() {
        let px = Pixels::new(&fixtures::solid(200, 200, [40, 40, 40]));
        let m = measure(&px, &QualityConfig::default()).unwrap();
        assert_eq!(m.indicators, 0);
    }
}
