//! Pixel analyzers.
//!
//! Every extractor reads the same [`Pixels`] buffer and none reads another
//! extractor's output, so they can run in any order. An extractor that
//! cannot produce a value returns a [`MetricError`]; [`StandardMetrics`]
//! replaces it with that metric's rejection-biased fallback and logs it.

pub mod color;
pub mod content;
pub mod edges;
pub mod exposure;
pub mod sharpness;
pub mod watermark;

use crate::config::QualityConfig;
use crate::error::MetricError;
use image::{DynamicImage, GrayImage, ImageBuffer, Luma, RgbImage};
use imageproc::gradients::sobel_gradients;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

pub use color::ColorMetrics;
pub use content::{ContentMetrics, FaceDetector};
pub use edges::EdgeMetrics;
pub use exposure::ExposureMetrics;
pub use sharpness::{BlurType, SharpnessMetrics};
pub use watermark::WatermarkMetrics;

/// Sobel gradient magnitude per pixel.
pub type GradientImage = ImageBuffer<Luma<u16>, Vec<u16>>;

/// Decoded pixels in the forms the extractors need, computed once.
pub struct Pixels {
    pub rgb: RgbImage,
    pub gray: GrayImage,
    pub gradient: GradientImage,
}

impl Pixels {
    pub fn new(image: &DynamicImage) -> Self {
        let rgb = image.to_rgb8();
        let gray = image.to_luma8();
        let gradient = sobel_gradients(&gray);
        Self { rgb, gray, gradient }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.gray.dimensions()
    }
}

/// All metric results for one image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricBundle {
    pub sharpness: SharpnessMetrics,
    pub color: ColorMetrics,
    pub edges: EdgeMetrics,
    pub exposure: ExposureMetrics,
    pub watermark: WatermarkMetrics,
    pub content: ContentMetrics,
}

/// Runs every extractor over a prepared image.
pub trait MetricSuite {
    fn measure(&self, pixels: &Pixels, config: &QualityConfig) -> MetricBundle;
}

/// The built-in extractors, with an optional face detector for the
/// content-interest metric.
#[derive(Clone, Default)]
pub struct StandardMetrics {
    face_detector: Option<Arc<dyn FaceDetector>>,
}

impl StandardMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_face_detector(mut self, detector: Arc<dyn FaceDetector>) -> Self {
        self.face_detector = Some(detector);
        self
    }
}

impl MetricSuite for StandardMetrics {
    fn measure(&self, pixels: &Pixels, config: &QualityConfig) -> MetricBundle {
        MetricBundle {
            sharpness: or_fallback(
                sharpness::measure(pixels, config),
                SharpnessMetrics::fallback,
            ),
            color: or_fallback(color::measure(&pixels.rgb, config), ColorMetrics::fallback),
            edges: or_fallback(edges::measure(pixels, config), EdgeMetrics::fallback),
            exposure: or_fallback(
                exposure::measure(&pixels.gray, config),
                ExposureMetrics::fallback,
            ),
            watermark: or_fallback(
                watermark::measure(pixels, config),
                WatermarkMetrics::fallback,
            ),
            content: or_fallback(
                content::measure(&pixels.gray, self.face_detector.as_deref()),
                ContentMetrics::fallback,
            ),
        }
    }
}

impl std::fmt::Debug for StandardMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StandardMetrics")
            .field("face_detector", &self.face_detector.is_some())
            .finish()
    }
}

fn or_fallback<T>(result: Result<T, MetricError>, fallback: fn() -> T) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "metric failed; using rejection-biased default");
            fallback()
        }
    }
}

/// Fraction of `gradient` pixels at or above `threshold` inside the window.
pub(crate) fn edge_density_in(
    gradient: &GradientImage,
    threshold: u16,
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
) -> f64 {
    let area = (x1.saturating_sub(x0) as u64) * (y1.saturating_sub(y0) as u64);
    if area == 0 {
        return 0.0;
    }
    let mut count = 0u64;
    for y in y0..y1 {
        for x in x0..x1 {
            if gradient.get_pixel(x, y)[0] >= threshold {
                count += 1;
            }
        }
    }
    count as f64 / area as f64
}

/// Binary edge map: 255 where the gradient reaches `threshold`.
pub(crate) fn edge_map(gradient: &GradientImage, threshold: u16) -> GrayImage {
    let (w, h) = gradient.dimensions();
    GrayImage::from_fn(w, h, |x, y| {
        if gradient.get_pixel(x, y)[0] >= threshold {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

pub(crate) fn finite(metric: &'static str, value: f64) -> Result<f64, MetricError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(MetricError::NonFinite { metric })
    }
}

pub(crate) fn require_size(
    metric: &'static str,
    width: u32,
    height: u32,
    min: u32,
) -> Result<(), MetricError> {
    if width < min || height < min {
        Err(MetricError::TooSmall {
            metric,
            width,
            height,
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Synthetic images shared by the metric and scorer tests.

    use image::{DynamicImage, Rgb, RgbImage};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    pub fn solid(width: u32, height: u32, color: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)))
    }

    /// Independent uniform noise per channel.
    pub fn noise(width: u32, height: u32, seed: u64) -> DynamicImage {
        let mut rng = StdRng::seed_from_u64(seed);
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |_, _| {
            Rgb([rng.random(), rng.random(), rng.random()])
        }))
    }

    /// Smooth colour gradient with shared luminance noise and a little
    /// per-channel noise, a stand-in for a detailed photograph.
    pub fn photo(width: u32, height: u32, seed: u64) -> DynamicImage {
        let mut rng = StdRng::seed_from_u64(seed);
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            let fx = x as f32 / width as f32;
            let fy = y as f32 / height as f32;
            let base = [40.0 + 170.0 * fx, 60.0 + 120.0 * fy, 180.0 - 100.0 * fx];
            let shared: f32 = rng.random_range(-70.0..=70.0);
            let mut px = [0u8; 3];
            for (c, b) in base.iter().enumerate() {
                let own: f32 = rng.random_range(-15.0..=15.0);
                px[c] = (b + shared + own).clamp(0.0, 255.0) as u8;
            }
            Rgb(px)
        }))
    }

    /// Top three quarters a smooth, faintly noisy sky; bottom quarter dense
    /// random detail, like a crowd or street under open sky.
    pub fn sky_over_detail(width: u32, height: u32, seed: u64) -> DynamicImage {
        let mut rng = StdRng::seed_from_u64(seed);
        let horizon = height - height / 4;
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |_, y| {
            if y >= horizon {
                return Rgb([rng.random(), rng.random(), rng.random()]);
            }
            let fy = y as f32 / horizon as f32;
            let base = [90.0 + 80.0 * fy, 140.0 + 60.0 * fy, 210.0 + 25.0 * fy];
            let jitter: f32 = rng.random_range(-3.0..=3.0);
            let mut px = [0u8; 3];
            for (c, b) in base.iter().enumerate() {
                px[c] = (b + jitter).clamp(0.0, 255.0) as u8;
            }
            Rgb(px)
        }))
    }

    /// Dark diagonal strokes repeated across a light frame, the shape of a
    /// stock-photo watermark band.
    pub fn diagonal_strokes(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            if (x + y) % 56 < 6 {
                Rgb([20, 20, 20])
            } else {
                Rgb([200, 200, 200])
            }
        }))
    }

    /// Smooth horizontal ramp with no high-frequency content.
    pub fn ramp(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            let v = (60 + (x * 120) / width.max(1)) as u8;
            let w = (80 + (y * 60) / height.max(1)) as u8;
            Rgb([v, w, 128])
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingDetector(AtomicUsize);

    impl FaceDetector for CountingDetector {
        fn count_faces(&self, _gray: &GrayImage) -> usize {
            self.0.fetch_add(1, Ordering::SeqCst);
            2
        }
    }

    #[test]
    fn test_standard_suite_on_noise() {
        let px = Pixels::new(&fixtures::noise(400, 300, 7));
        let bundle = StandardMetrics::new().measure(&px, &QualityConfig::default());
        assert!(bundle.sharpness.is_sharp);
        assert!(bundle.edges.is_complex);
        assert!(!bundle.color.is_logo_like);
        assert!(!bundle.content.has_faces);
    }

    #[test]
    fn test_face_detector_is_consulted() {
        let detector = Arc::new(CountingDetector(AtomicUsize::new(0)));
        let suite = StandardMetrics::new().with_face_detector(detector.clone());
        let px = Pixels::new(&fixtures::noise(64, 64, 1));
        let bundle = suite.measure(&px, &QualityConfig::default());
        assert!(bundle.content.has_faces);
        assert_eq!(bundle.content.face_count, 2);
        assert_eq!(detector.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_metrics_fall_back_toward_rejection() {
        // 2x2 is below every extractor's minimum window.
        let px = Pixels::new(&fixtures::noise(2, 2, 3));
        let bundle = StandardMetrics::new().measure(&px, &QualityConfig::default());
        assert!(!bundle.sharpness.is_sharp);
        assert_eq!(bundle.sharpness.score, 0.0);
        assert!(!bundle.edges.is_complex);
        assert!(bundle.watermark.has_watermark);
    }

    #[test]
    fn test_edge_density_window() {
        let gradient = GradientImage::from_fn(10, 10, |x, _| Luma([if x < 5 { 300 } else { 0 }]));
        assert_eq!(edge_density_in(&gradient, 200, 0, 0, 10, 10), 0.5);
        assert_eq!(edge_density_in(&gradient, 200, 0, 0, 5, 10), 1.0);
        assert_eq!(edge_density_in(&gradient, 200, 5, 5, 5, 5), 0.0);
    }
}
