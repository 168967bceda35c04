//! Content interest: quadrant variance plus optional face detection.
//!
//! Only ever a small score component, never a rejection gate.

use crate::error::MetricError;
use image::GrayImage;
use serde::Serialize;

/// Quadrant variance that maps to a full content score.
const VARIANCE_NORM: f64 = 1000.0;

/// Pluggable face detection backend.
///
/// No detector ships with the crate; without one `has_faces` is always false
/// and the score rests on regional variance alone.
pub trait FaceDetector: Send + Sync {
    fn count_faces(&self, gray: &GrayImage) -> usize;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentMetrics {
    pub content_score: f64,
    pub has_faces: bool,
    pub face_count: usize,
}

impl ContentMetrics {
    pub fn fallback() -> Self {
        Self {
            content_score: 0.0,
            has_faces: false,
            face_count: 0,
        }
    }
}

pub fn measure(
    gray: &GrayImage,
    detector: Option<&dyn FaceDetector>,
) -> Result<ContentMetrics, MetricError> {
    let (w, h) = gray.dimensions();
    super::require_size("content", w, h, 2)?;

    let (hw, hh) = (w / 2, h / 2);
    let quadrants = [(0, 0, hw, hh), (hw, 0, w, hh), (0, hh, hw, h), (hw, hh, w, h)];
    let mean_variance = quadrants
        .iter()
        .map(|&(x0, y0, x1, y1)| variance(gray, x0, y0, x1, y1))
        .sum::<f64>()
        / quadrants.len() as f64;
    let content_score = super::finite("content", (mean_variance / VARIANCE_NORM).min(1.0))?;

    let face_count = detector.map(|d| d.count_faces(gray)).unwrap_or(0);

    Ok(ContentMetrics {
        content_score,
        has_faces: face_count > 0,
        face_count,
    })
}

fn variance(gray: &GrayImage, x0: u32, y0: u32, x1: u32, y1: u32) -> f64 {
    let n = ((x1 - x0) as u64 * (y1 - y0) as u64) as f64;
    if n == 0.0 {
        return 0.0;
    }
    let mut sum = 0f64;
    let mut sum_sq = 0f64;
    for y in y0..y1 {
        for x in x0..x1 {
            let v = gray.get_pixel(x, y)[0] as f64;
            sum += v;
            sum_sq += v * v;
        }
    }
    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_flat_image_is_uninteresting() {
        let gray = GrayImage::from_pixel(40, 40, Luma([128]));
        let m = measure(&gray, None).unwrap();
        assert_eq!(m.content_score, 0.0);
        assert!(!m.has_faces);
    }

    #[test]
    fn test_high_variance_caps_at_one() {
        let gray = GrayImage::from_fn(40, 40, |x, y| Luma([if (x + y) % 2 == 0 { 0 } else { 255 }]));
        let m = measure(&gray, None).unwrap();
        assert_eq!(m.content_score, 1.0);
    }

    #[test]
    fn test_moderate_variance_scales() {
        // Bands of 100 and 140 in each quadrant: variance 400.
        let gray = GrayImage::from_fn(40, 40, |x, _| Luma([if x % 2 == 0 { 100 } else { 140 }]));
        let m = measure(&gray, None).unwrap();
        assert!((m.content_score - 0.4).abs() < 1e-9);
    }
}
